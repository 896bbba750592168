//! Configuration types.

use crate::error::ConfigError;

/// Environment variable toggling parallel dispatch.
pub const PARALLELIZE_ENV: &str = "MULTIPROC_PARALLELIZE";
/// Environment variable holding the worker count.
pub const WORKERS_ENV: &str = "MULTIPROC_WORKERS";

/// Dispatch configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchConfig {
    /// Distribute jobs over a worker pool instead of running them inline.
    pub parallelize: bool,
    /// Maximum number of workers. 0 means one per available hardware thread.
    pub worker_count: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            parallelize: true,
            worker_count: 0,
        }
    }
}

impl DispatchConfig {
    /// Run everything inline in the caller's context.
    pub fn sequential() -> Self {
        Self {
            parallelize: false,
            worker_count: 0,
        }
    }

    /// Parallel dispatch on at most `worker_count` workers.
    pub fn parallel(worker_count: usize) -> Self {
        Self {
            parallelize: true,
            worker_count,
        }
    }

    /// Load from `MULTIPROC_PARALLELIZE` and `MULTIPROC_WORKERS`, falling back
    /// to the defaults for unset variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(PARALLELIZE_ENV) {
            config.parallelize = parse_bool(PARALLELIZE_ENV, &raw)?;
        }

        if let Some(raw) = lookup(WORKERS_ENV) {
            let requested = raw.trim().parse::<i64>().map_err(|e| ConfigError::InvalidValue {
                key: WORKERS_ENV.to_string(),
                message: format!("expected an integer, got {raw:?}: {e}"),
            })?;
            // Zero or below selects one worker per hardware thread.
            config.worker_count = usize::try_from(requested.max(0)).unwrap_or(usize::MAX);
        }

        Ok(config)
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected true or false, got {other:?}"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = DispatchConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, DispatchConfig::default());
        assert!(config.parallelize);
        assert_eq!(config.worker_count, 0);
    }

    #[test]
    fn reads_both_values() {
        let config = DispatchConfig::from_lookup(lookup(&[
            (PARALLELIZE_ENV, "off"),
            (WORKERS_ENV, " 3 "),
        ]))
        .unwrap();
        assert_eq!(
            config,
            DispatchConfig {
                parallelize: false,
                worker_count: 3
            }
        );
    }

    #[test]
    fn rejects_bad_bool() {
        let err = DispatchConfig::from_lookup(lookup(&[(PARALLELIZE_ENV, "maybe")])).unwrap_err();
        assert!(err.to_string().contains(PARALLELIZE_ENV));
    }

    #[test]
    fn negative_workers_mean_all_hardware_threads() {
        let config = DispatchConfig::from_lookup(lookup(&[(WORKERS_ENV, "-2")])).unwrap();
        assert_eq!(config.worker_count, 0);
        assert!(config.parallelize);

        let config = DispatchConfig::from_lookup(lookup(&[(WORKERS_ENV, "0")])).unwrap();
        assert_eq!(config.worker_count, 0);
    }

    #[test]
    fn rejects_non_integer_workers() {
        for raw in ["abc", "2.5", ""] {
            let err = DispatchConfig::from_lookup(lookup(&[(WORKERS_ENV, raw)])).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == WORKERS_ENV));
        }
    }

    #[test]
    fn presets() {
        assert!(!DispatchConfig::sequential().parallelize);
        assert_eq!(DispatchConfig::parallel(4).worker_count, 4);
    }
}
