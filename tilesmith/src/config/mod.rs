use std::{env, fs, path::Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    allocator::{FallbackPolicy, PoolConfig},
    backends::host::HostDeviceConfig,
    testbed::TestbedConfig,
};

pub const COMPUTE_CAPABILITY_VAR: &str = "TILESMITH_COMPUTE_CAPABILITY";
pub const POOL_DEVICE_BYTES_VAR: &str = "TILESMITH_POOL_DEVICE_BYTES";
pub const POOL_HOST_BYTES_VAR: &str = "TILESMITH_POOL_HOST_BYTES";
pub const POOL_FALLBACK_VAR: &str = "TILESMITH_POOL_FALLBACK";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("malformed config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid value `{value}` for {variable}")]
    InvalidEnvironment {
        variable: &'static str,
        value: String,
    },
}

/// Everything needed to construct an [`crate::Engine`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub device: HostDeviceConfig,
    pub pool: PoolConfig,
    pub testbed: TestbedConfig,
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    /// Defaults with `TILESMITH_*` overrides applied.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides()
    }

    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        self.with_overrides(|variable| env::var(variable).ok())
    }

    /// Applies overrides looked up through `lookup`, keyed by the `TILESMITH_*` variable names.
    pub fn with_overrides<F>(
        mut self,
        lookup: F,
    ) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        if let Some(capability) = parse_override(&lookup, COMPUTE_CAPABILITY_VAR, |value| value.parse().ok())? {
            self.device.compute_capability = capability;
        }
        if let Some(bytes) = parse_override(&lookup, POOL_DEVICE_BYTES_VAR, |value| value.parse().ok())? {
            self.pool.device_capacity = bytes;
        }
        if let Some(bytes) = parse_override(&lookup, POOL_HOST_BYTES_VAR, |value| value.parse().ok())? {
            self.pool.host_capacity = bytes;
        }
        if let Some(fallback) = parse_override(&lookup, POOL_FALLBACK_VAR, parse_fallback)? {
            self.pool.fallback = fallback;
        }
        Ok(self)
    }
}

fn parse_fallback(value: &str) -> Option<FallbackPolicy> {
    match value.to_ascii_lowercase().as_str() {
        "direct" => Some(FallbackPolicy::Direct),
        "fail" => Some(FallbackPolicy::Fail),
        _ => None,
    }
}

fn parse_override<T, F, P>(
    lookup: &F,
    variable: &'static str,
    parse: P,
) -> Result<Option<T>, ConfigError>
where
    F: Fn(&'static str) -> Option<String>,
    P: Fn(&str) -> Option<T>,
{
    let Some(value) = lookup(variable) else {
        return Ok(None);
    };
    match parse(value.trim()) {
        Some(parsed) => Ok(Some(parsed)),
        None => Err(ConfigError::InvalidEnvironment {
            variable,
            value,
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&'static str, &str)]) -> impl Fn(&'static str) -> Option<String> {
        let map: HashMap<&'static str, String> = pairs.iter().map(|(key, value)| (*key, value.to_string())).collect();
        move |variable| map.get(variable).cloned()
    }

    #[test]
    fn defaults_match_the_documented_values() {
        let config = EngineConfig::default();
        assert_eq!(config.device.compute_capability, 90);
        assert_eq!(config.device.total_memory, 1 << 30);
        assert_eq!(config.pool.device_capacity, 64 << 20);
        assert_eq!(config.pool.host_capacity, 64 << 20);
        assert_eq!(config.pool.fallback, FallbackPolicy::Direct);
    }

    #[test]
    fn overrides_replace_defaults() {
        let config = EngineConfig::default()
            .with_overrides(lookup(&[
                (COMPUTE_CAPABILITY_VAR, "75"),
                (POOL_DEVICE_BYTES_VAR, "4096"),
                (POOL_FALLBACK_VAR, "Fail"),
            ]))
            .unwrap();
        assert_eq!(config.device.compute_capability, 75);
        assert_eq!(config.pool.device_capacity, 4096);
        assert_eq!(config.pool.host_capacity, 64 << 20);
        assert_eq!(config.pool.fallback, FallbackPolicy::Fail);
    }

    #[test]
    fn invalid_override_is_reported() {
        let error = EngineConfig::default().with_overrides(lookup(&[(POOL_HOST_BYTES_VAR, "lots")])).unwrap_err();
        assert!(matches!(
            error,
            ConfigError::InvalidEnvironment {
                variable: POOL_HOST_BYTES_VAR,
                ..
            }
        ));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = EngineConfig::from_json_str(
            r#"{ "device": { "compute_capability": 80 }, "testbed": { "fill_scenarios": ["zero", "max_magnitude"] } }"#,
        )
        .unwrap();
        assert_eq!(config.device.compute_capability, 80);
        assert_eq!(config.device.name, "host");
        assert_eq!(config.testbed.fill_scenarios.len(), 2);
        assert_eq!(config.testbed.beta, 0.5);
    }
}
