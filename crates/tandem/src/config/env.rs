//! `TANDEM_*` environment overrides.

use std::collections::HashMap;
use std::time::Duration;

/// Prefix for every variable the engine reads.
pub const DEFAULT_PREFIX: &str = "TANDEM";

/// Looks up `<PREFIX>_<NAME>` variables.
///
/// Tests use [`EnvConfig::from_map`] so they never touch the real
/// environment.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    prefix: String,
    fixed: Option<HashMap<String, String>>,
}

impl Default for EnvConfig {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

impl EnvConfig {
    /// Read from the process environment.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            fixed: None,
        }
    }

    /// Read from `vars` only. Keys are full variable names.
    #[must_use]
    pub fn from_map<I, K, V>(prefix: impl Into<String>, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let fixed = vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        Self {
            prefix: prefix.into(),
            fixed: Some(fixed),
        }
    }

    /// `expect_timeout` becomes `TANDEM_EXPECT_TIMEOUT`.
    #[must_use]
    pub fn var_name(&self, name: &str) -> String {
        let name = name.to_ascii_uppercase();
        match self.prefix.as_str() {
            "" => name,
            prefix => format!("{prefix}_{name}"),
        }
    }

    /// Raw value, if set.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<String> {
        let key = self.var_name(name);
        self.fixed.as_ref().map_or_else(
            || std::env::var(&key).ok(),
            |vars| vars.get(&key).cloned(),
        )
    }

    /// Seconds as a float, e.g. `2.5`.
    ///
    /// Anything that is not a positive finite number is logged and treated
    /// as unset.
    #[must_use]
    pub fn duration_secs(&self, name: &str) -> Option<Duration> {
        let raw = self.get(name)?;
        let parsed = raw.trim().parse::<f64>().ok().map(super::timeout_from_secs);
        if let Some(Ok(duration)) = parsed {
            return Some(duration);
        }
        tracing::warn!(
            variable = %self.var_name(name),
            value = %raw,
            "ignoring invalid duration"
        );
        None
    }
}

/// Variables read by [`EngineConfig::from_env`](super::EngineConfig::from_env).
pub mod vars {
    /// Default expect timeout in seconds.
    pub const EXPECT_TIMEOUT: &str = "EXPECT_TIMEOUT";
    /// Default ready-pattern timeout in seconds.
    pub const READY_TIMEOUT: &str = "READY_TIMEOUT";
    /// Grace period during termination in seconds.
    pub const TERMINATE_GRACE: &str = "TERMINATE_GRACE";
    /// Log filter directive.
    pub const LOG: &str = "LOG";
    /// Log format: `pretty`, `compact` or `json`.
    pub const LOG_FORMAT: &str = "LOG_FORMAT";
}
