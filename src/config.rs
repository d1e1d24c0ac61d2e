use std::env;
use std::fmt;

const DEFAULT_HISTORY_LIMIT: usize = 50;
const DEFAULT_TOP_N: usize = 10;

/// Process settings read once at startup. Exam settings travel with each
/// imported exam instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    pub log_level: String,
    pub history_limit: usize,
    pub top_n: usize,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            top_n: DEFAULT_TOP_N,
        }
    }
}

impl DaemonConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let log_level = lookup("SCOREBOOKD_LOG")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.log_level);
        let history_limit = positive(&lookup, "SCOREBOOKD_HISTORY_LIMIT")?
            .unwrap_or(defaults.history_limit);
        let top_n = positive(&lookup, "SCOREBOOKD_TOP_N")?.unwrap_or(defaults.top_n);

        Ok(Self {
            log_level,
            history_limit,
            top_n,
        })
    }
}

fn positive<F>(lookup: &F, key: &'static str) -> Result<Option<usize>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    match raw.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(Some(n)),
        _ => Err(ConfigError::NotPositive { key, value: raw }),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    NotPositive { key: &'static str, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::NotPositive { key, value } => {
                write!(f, "{} must be a positive integer, got '{}'", key, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = DaemonConfig::from_lookup(lookup_from(&[])).expect("config");
        assert_eq!(cfg, DaemonConfig::default());
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = DaemonConfig::from_lookup(lookup_from(&[
            ("SCOREBOOKD_LOG", "debug"),
            ("SCOREBOOKD_HISTORY_LIMIT", " 3 "),
            ("SCOREBOOKD_TOP_N", "5"),
        ]))
        .expect("config");
        assert_eq!(cfg.log_level, "debug");
        assert_eq!(cfg.history_limit, 3);
        assert_eq!(cfg.top_n, 5);
    }

    #[test]
    fn zero_or_garbage_limits_are_rejected() {
        let err = DaemonConfig::from_lookup(lookup_from(&[("SCOREBOOKD_HISTORY_LIMIT", "0")]))
            .expect_err("zero");
        assert_eq!(
            err.to_string(),
            "SCOREBOOKD_HISTORY_LIMIT must be a positive integer, got '0'"
        );
        assert!(DaemonConfig::from_lookup(lookup_from(&[("SCOREBOOKD_TOP_N", "ten")])).is_err());
    }
}
