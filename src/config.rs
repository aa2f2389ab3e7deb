//! On-disk configuration files (§6.3): the replication applier's config and
//! persisted run state, loaded/saved the way the teacher loads
//! `parameter.json`-equivalent state in `database_manager.rs` — a typed
//! `serde_json` struct with a `Default` impl for anything unset on disk.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

fn applier_config_path(dir: &Path) -> PathBuf {
    dir.join("REPLICATION-APPLIER-CONFIG")
}

fn applier_state_path(dir: &Path) -> PathBuf {
    dir.join("REPLICATION-APPLIER-STATE")
}

/// Static configuration for the replication applier: where to poll, and how
/// to behave on startup and on error (§4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplierConfig {
    pub endpoint: String,
    /// Start the applier automatically when the owning database opens.
    #[serde(default)]
    pub auto_start: bool,
    /// Poll interval floor; doubles on idle up to `max_connect_retries`
    /// worth of backoff before settling back down on the next event.
    #[serde(default = "default_idle_min_ms")]
    pub idle_min_wait_ms: u64,
    #[serde(default = "default_idle_max_ms")]
    pub idle_max_wait_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_connect_retries: u32,
}

fn default_idle_min_ms() -> u64 {
    500
}

fn default_idle_max_ms() -> u64 {
    30_000
}

fn default_max_retries() -> u32 {
    10
}

impl Default for ApplierConfig {
    fn default() -> Self {
        ApplierConfig {
            endpoint: String::new(),
            auto_start: false,
            idle_min_wait_ms: default_idle_min_ms(),
            idle_max_wait_ms: default_idle_max_ms(),
            max_connect_retries: default_max_retries(),
        }
    }
}

impl ApplierConfig {
    pub fn load(dir: &Path) -> Result<Self> {
        let path = applier_config_path(dir);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read(path)?;
        Ok(serde_json::from_slice(&data)?)
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        let data = serde_json::to_vec_pretty(self)?;
        std::fs::write(applier_config_path(dir), data)?;
        Ok(())
    }
}

/// Persisted applier run state: last tick applied, and whether the applier
/// was running when the process last stopped (so `autoStart` can resume it).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplierState {
    #[serde(default)]
    pub last_applied_tick: u64,
    #[serde(default)]
    pub running: bool,
    #[serde(default)]
    pub last_error: Option<String>,
}

impl Default for ApplierState {
    fn default() -> Self {
        ApplierState {
            last_applied_tick: 0,
            running: false,
            last_error: None,
        }
    }
}

impl ApplierState {
    pub fn load(dir: &Path) -> Result<Self> {
        let path = applier_state_path(dir);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read(path)?;
        Ok(serde_json::from_slice(&data)?)
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        let data = serde_json::to_vec_pretty(self)?;
        std::fs::write(applier_state_path(dir), data)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_config_loads_as_default() {
        let dir = tempdir().unwrap();
        let cfg = ApplierConfig::load(dir.path()).unwrap();
        assert!(!cfg.auto_start);
        assert_eq!(cfg.idle_min_wait_ms, 500);
    }

    #[test]
    fn config_roundtrips_through_disk() {
        let dir = tempdir().unwrap();
        let cfg = ApplierConfig {
            endpoint: "http://peer:8000".to_string(),
            auto_start: true,
            ..ApplierConfig::default()
        };
        cfg.save(dir.path()).unwrap();
        let loaded = ApplierConfig::load(dir.path()).unwrap();
        assert_eq!(loaded.endpoint, "http://peer:8000");
        assert!(loaded.auto_start);
    }

    #[test]
    fn state_roundtrips_through_disk() {
        let dir = tempdir().unwrap();
        let state = ApplierState {
            last_applied_tick: 42,
            running: true,
            last_error: None,
        };
        state.save(dir.path()).unwrap();
        let loaded = ApplierState::load(dir.path()).unwrap();
        assert_eq!(loaded.last_applied_tick, 42);
        assert!(loaded.running);
    }
}
