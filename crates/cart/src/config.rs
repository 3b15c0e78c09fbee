//! Engine configuration.
//!
//! # Environment Variables
//!
//! - `TASTETROVE_CART_DEBOUNCE_MS` - Quiet period before a remote flush (default: 500)
//! - `TASTETROVE_CART_SIGN_IN` - `replace` or `merge` (default: `replace`)

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

/// Default quiet period before pending writes are flushed.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

/// What happens to an anonymous cart when a user signs in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SignInPolicy {
    /// The remote cart replaces the anonymous one.
    #[default]
    Replace,
    /// Anonymous lines are applied over the remote cart and queued for upload.
    Merge,
}

impl FromStr for SignInPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "replace" => Ok(Self::Replace),
            "merge" => Ok(Self::Merge),
            other => Err(format!("expected `replace` or `merge`, got `{other}`")),
        }
    }
}

/// Cart engine configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Quiet period before pending writes are flushed.
    pub debounce: Duration,
    /// Handling of the anonymous cart on sign-in.
    pub sign_in: SignInPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            sign_in: SignInPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables, defaulting unset ones.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable is set but cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(raw) = lookup("TASTETROVE_CART_DEBOUNCE_MS") {
            let millis = raw.trim().parse::<u64>().map_err(|e| {
                ConfigError::InvalidEnvVar("TASTETROVE_CART_DEBOUNCE_MS".to_string(), e.to_string())
            })?;
            config.debounce = Duration::from_millis(millis);
        }

        if let Some(raw) = lookup("TASTETROVE_CART_SIGN_IN") {
            config.sign_in = raw
                .parse()
                .map_err(|e| ConfigError::InvalidEnvVar("TASTETROVE_CART_SIGN_IN".to_string(), e))?;
        }

        Ok(config)
    }
}
