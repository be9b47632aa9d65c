//! Scan configuration.
//!
//! Defaults are embedded from `config/defaults.toml` at compile time and
//! can be overridden per key with `LOCALRANK_*` environment variables.

use std::time::Duration;

use localrank_sampler::SamplerOptions;
use serde::Deserialize;

const DEFAULTS_TOML: &str = include_str!("../config/defaults.toml");

/// Errors from loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The TOML document could not be parsed.
    #[error("Config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// An environment override could not be parsed.
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue {
        /// Environment variable name.
        key: String,
        /// The rejected value.
        value: String,
    },

    /// A setting is out of range.
    #[error("Invalid config: {message}")]
    Invalid {
        /// Description of the problem.
        message: String,
    },
}

/// Settings for the scan pipeline.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScanConfig {
    /// Rank lookups dispatched concurrently per batch.
    pub batch_size: usize,
    /// Pause between batches, in milliseconds.
    pub batch_delay_ms: u64,
    /// Per-point lookup timeout, in milliseconds.
    pub lookup_timeout_ms: u64,
    /// Depth of the queried result page.
    pub max_rank: u32,
    /// Largest grid side a scan may request.
    pub max_grid_size: u32,
    /// Largest radius a scan may request, in kilometers.
    pub max_radius_km: f64,
}

impl ScanConfig {
    /// Returns the embedded defaults.
    ///
    /// # Panics
    ///
    /// Panics if the embedded TOML is malformed (it is checked by the unit
    /// tests, so this cannot happen in a tested build).
    #[must_use]
    pub fn defaults() -> Self {
        Self::from_toml(DEFAULTS_TOML)
            .unwrap_or_else(|e| panic!("Failed to parse embedded scan defaults: {e}"))
    }

    /// Parses a complete configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the document is malformed or out of range.
    pub fn from_toml(document: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::de::from_str(document)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the defaults and applies `LOCALRANK_*` environment overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if an override cannot be parsed or the result
    /// is out of range.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::defaults().with_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from `lookup`, which maps variable names to values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a value cannot be parsed or the result is
    /// out of range.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        override_with(&lookup, "LOCALRANK_BATCH_SIZE", &mut self.batch_size)?;
        override_with(&lookup, "LOCALRANK_BATCH_DELAY_MS", &mut self.batch_delay_ms)?;
        override_with(&lookup, "LOCALRANK_LOOKUP_TIMEOUT_MS", &mut self.lookup_timeout_ms)?;
        override_with(&lookup, "LOCALRANK_MAX_RANK", &mut self.max_rank)?;
        override_with(&lookup, "LOCALRANK_MAX_GRID_SIZE", &mut self.max_grid_size)?;
        override_with(&lookup, "LOCALRANK_MAX_RADIUS_KM", &mut self.max_radius_km)?;

        self.validate()?;
        Ok(self)
    }

    /// Checks that every setting is usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first bad setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let problem = if self.batch_size == 0 {
            Some("batch_size must be at least 1".to_string())
        } else if self.lookup_timeout_ms == 0 {
            Some("lookup_timeout_ms must be positive".to_string())
        } else if self.max_rank == 0 {
            Some("max_rank must be at least 1".to_string())
        } else if self.max_grid_size < 3 {
            Some(format!(
                "max_grid_size must be at least 3, got {}",
                self.max_grid_size
            ))
        } else if !self.max_radius_km.is_finite() || self.max_radius_km <= 0.0 {
            Some(format!(
                "max_radius_km must be positive, got {}",
                self.max_radius_km
            ))
        } else {
            None
        };

        problem.map_or(Ok(()), |message| Err(ConfigError::Invalid { message }))
    }

    /// Sampler tuning derived from this configuration.
    #[must_use]
    pub const fn sampler_options(&self) -> SamplerOptions {
        SamplerOptions {
            batch_size: self.batch_size,
            batch_delay: Duration::from_millis(self.batch_delay_ms),
            lookup_timeout: Duration::from_millis(self.lookup_timeout_ms),
            max_rank: self.max_rank,
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self::defaults()
    }
}

fn override_with<F, T>(lookup: &F, key: &str, target: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    let Some(raw) = lookup(key) else {
        return Ok(());
    };

    *target = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: raw.clone(),
    })?;
    log::debug!("Config override {key}={raw}");
    Ok(())
}
