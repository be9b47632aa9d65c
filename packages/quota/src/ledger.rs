//! Credit balances and atomic debits.
//!
//! The account service behind a [`CreditLedger`] must debit with a single
//! compare-and-debit step (a conditional `UPDATE ... WHERE balance >= n`
//! in SQL, or a check and subtract under one lock in memory). Two scans
//! racing on the same account can then never both spend the same credits.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

/// Errors from the credit ledger.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// The account does not exist.
    #[error("Unknown account: {account}")]
    UnknownAccount {
        /// The account that was looked up.
        account: String,
    },

    /// The backing store could not be reached.
    #[error("Ledger unavailable: {message}")]
    Unavailable {
        /// Description of the failure.
        message: String,
    },

    /// A thread panicked while holding the in-memory ledger lock.
    #[error("Ledger lock poisoned")]
    Poisoned,
}

/// Result of an atomic debit attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebitOutcome {
    /// Credits were taken.
    Debited {
        /// Balance after the debit.
        remaining: u64,
    },
    /// The balance did not cover the amount; nothing was taken.
    Insufficient {
        /// Balance at the time of the attempt.
        available: u64,
    },
}

/// Account service holding credit balances.
#[async_trait]
pub trait CreditLedger: Send + Sync {
    /// Current balance of `account`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] if the account is unknown or the store fails.
    async fn balance(&self, account: &str) -> Result<u64, LedgerError>;

    /// Debits `amount` if and only if the balance covers it, atomically.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] if the account is unknown or the store fails.
    /// An insufficient balance is not an error; it is reported as
    /// [`DebitOutcome::Insufficient`].
    async fn try_debit(&self, account: &str, amount: u64) -> Result<DebitOutcome, LedgerError>;
}

/// Mutex-guarded in-memory ledger.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    accounts: Mutex<BTreeMap<String, u64>>,
}

impl InMemoryLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a ledger with one funded account.
    #[must_use]
    pub fn with_balance(account: &str, balance: u64) -> Self {
        let mut accounts = BTreeMap::new();
        accounts.insert(account.to_string(), balance);
        Self {
            accounts: Mutex::new(accounts),
        }
    }

    /// Adds credits to `account`, creating it if needed. Returns the new balance.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Poisoned`] if the lock is poisoned.
    pub fn credit(&self, account: &str, amount: u64) -> Result<u64, LedgerError> {
        let mut accounts = self.accounts.lock().map_err(|_| LedgerError::Poisoned)?;
        let balance = accounts.entry(account.to_string()).or_insert(0);
        *balance = balance.saturating_add(amount);
        Ok(*balance)
    }
}

#[async_trait]
impl CreditLedger for InMemoryLedger {
    async fn balance(&self, account: &str) -> Result<u64, LedgerError> {
        let accounts = self.accounts.lock().map_err(|_| LedgerError::Poisoned)?;
        accounts
            .get(account)
            .copied()
            .ok_or_else(|| LedgerError::UnknownAccount {
                account: account.to_string(),
            })
    }

    async fn try_debit(&self, account: &str, amount: u64) -> Result<DebitOutcome, LedgerError> {
        let mut accounts = self.accounts.lock().map_err(|_| LedgerError::Poisoned)?;
        let balance = accounts
            .get_mut(account)
            .ok_or_else(|| LedgerError::UnknownAccount {
                account: account.to_string(),
            })?;

        if *balance < amount {
            return Ok(DebitOutcome::Insufficient {
                available: *balance,
            });
        }

        *balance -= amount;
        log::debug!("Debited {amount} credits from {account}, {} remaining", *balance);
        Ok(DebitOutcome::Debited {
            remaining: *balance,
        })
    }
}
