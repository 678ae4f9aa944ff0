//! Configuration loading and validation

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{AuthzError, Result};

/// Complete engine configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AuthzConfig {
    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub hierarchy: HierarchyConfig,

    #[serde(default)]
    pub engine: EngineConfig,
}

/// Subject/team/role cache settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Maximum entries per keyed cache
    #[serde(default = "default_capacity")]
    pub capacity: usize,

    /// Entries untouched for this long are treated as misses
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_ms: u64,

    /// Independent LRU shards per cache
    #[serde(default = "default_shards")]
    pub shards: usize,

    /// Upper bound on one backing directory load
    #[serde(default = "default_load_timeout")]
    pub load_timeout_ms: u64,

    /// Background sweep of idle entries; 0 disables the sweeper
    #[serde(default)]
    pub sweep_interval_ms: u64,
}

/// Bounds on the team hierarchy walk
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HierarchyConfig {
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    #[serde(default = "default_max_teams")]
    pub max_teams: usize,

    #[serde(default = "default_walk_timeout")]
    pub walk_timeout_ms: u64,
}

/// How matching rules combine into one decision
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CombiningAlgorithm {
    /// The first matching rule decides
    #[default]
    FirstMatch,
    /// Any matching deny wins, then the first matching allow
    DenyOverrides,
}

/// Policy engine settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub combining: CombiningAlgorithm,

    /// Default tracing filter when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
            idle_timeout_ms: default_idle_timeout(),
            shards: default_shards(),
            load_timeout_ms: default_load_timeout(),
            sweep_interval_ms: 0,
        }
    }
}

impl CacheConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_ms > 0).then(|| Duration::from_millis(self.sweep_interval_ms))
    }
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_teams: default_max_teams(),
            walk_timeout_ms: default_walk_timeout(),
        }
    }
}

impl HierarchyConfig {
    pub fn walk_timeout(&self) -> Duration {
        Duration::from_millis(self.walk_timeout_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            combining: CombiningAlgorithm::default(),
            log_level: default_log_level(),
        }
    }
}

impl AuthzConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw).map_err(|e| AuthzError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| AuthzError::Config(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache.capacity == 0 {
            return Err(AuthzError::Config("cache.capacity must be positive".to_string()));
        }
        if self.cache.shards == 0 {
            return Err(AuthzError::Config("cache.shards must be positive".to_string()));
        }
        if self.cache.idle_timeout_ms == 0 {
            return Err(AuthzError::Config("cache.idle_timeout_ms must be positive".to_string()));
        }
        if self.cache.load_timeout_ms == 0 {
            return Err(AuthzError::Config("cache.load_timeout_ms must be positive".to_string()));
        }
        if self.hierarchy.max_depth == 0 || self.hierarchy.max_teams == 0 {
            return Err(AuthzError::Config(
                "hierarchy.max_depth and hierarchy.max_teams must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

// Default value functions
fn default_capacity() -> usize { 1000 }
fn default_idle_timeout() -> u64 { 60_000 }
fn default_shards() -> usize { 16 }
fn default_load_timeout() -> u64 { 5_000 }
fn default_max_depth() -> usize { 32 }
fn default_max_teams() -> usize { 1024 }
fn default_walk_timeout() -> u64 { 2_000 }
fn default_log_level() -> String { "info".to_string() }

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AuthzConfig::default();
        assert_eq!(config.cache.capacity, 1000);
        assert_eq!(config.cache.idle_timeout(), Duration::from_secs(60));
        assert!(config.cache.sweep_interval().is_none());
        assert_eq!(config.engine.combining, CombiningAlgorithm::FirstMatch);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = AuthzConfig::from_toml_str(
            r#"
            [cache]
            capacity = 50
            sweep_interval_ms = 30000

            [engine]
            combining = "deny_overrides"
            "#,
        )
        .unwrap();

        assert_eq!(config.cache.capacity, 50);
        assert_eq!(config.cache.shards, 16);
        assert_eq!(config.cache.sweep_interval(), Some(Duration::from_secs(30)));
        assert_eq!(config.hierarchy.max_depth, 32);
        assert_eq!(config.engine.combining, CombiningAlgorithm::DenyOverrides);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = AuthzConfig::from_toml_str("[cache]\ncapacity = 0\n").unwrap_err();
        assert!(matches!(err, AuthzError::Config(_)));

        let err = AuthzConfig::from_toml_str("[engine]\ncombining = \"random\"\n").unwrap_err();
        assert!(matches!(err, AuthzError::Config(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[hierarchy]\nmax_depth = 4").unwrap();

        let config = AuthzConfig::from_file(file.path()).unwrap();
        assert_eq!(config.hierarchy.max_depth, 4);

        assert!(AuthzConfig::from_file("/nonexistent/teamgate.toml").is_err());
    }
}
