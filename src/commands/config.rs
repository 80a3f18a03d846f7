use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, SyncError};
use crate::sync::{ColorMode, Heartbeat, ReconnectPolicy, Smoothing};

pub const DEFAULT_SERVER_URL: &str = "http://localhost:3002";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmoothingConfig {
    pub enabled: bool,
    pub position_half_life_ms: u64,
    pub rotation_half_life_ms: u64,
    /// Colors snap unless this is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_half_life_ms: Option<u64>,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            position_half_life_ms: 120,
            rotation_half_life_ms: 120,
            color_half_life_ms: None,
        }
    }
}

impl SmoothingConfig {
    pub fn to_smoothing(&self) -> Smoothing {
        if !self.enabled {
            return Smoothing::Disabled;
        }
        let color = match self.color_half_life_ms {
            Some(ms) => ColorMode::Linear {
                half_life: Duration::from_millis(ms),
            },
            None => ColorMode::Snap,
        };
        Smoothing::Enabled {
            position_half_life: Duration::from_millis(self.position_half_life_ms),
            rotation_half_life: Duration::from_millis(self.rotation_half_life_ms),
            color,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconnectConfig {
    pub enabled: bool,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
    pub jitter: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        let policy = ReconnectPolicy::default();
        Self {
            enabled: policy.enabled,
            initial_delay_ms: policy.initial_delay.as_millis() as u64,
            max_delay_ms: policy.max_delay.as_millis() as u64,
            multiplier: policy.multiplier,
            jitter: policy.jitter,
        }
    }
}

impl ReconnectConfig {
    pub fn to_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            enabled: self.enabled,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            multiplier: self.multiplier,
            jitter: self.jitter,
        }
    }
}

/// A missing field turns that half of the heartbeat off.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatConfig {
    #[serde(default)]
    pub ping_interval_ms: Option<u64>,
    #[serde(default)]
    pub idle_timeout_ms: Option<u64>,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        let heartbeat = Heartbeat::default();
        Self {
            ping_interval_ms: heartbeat.ping_interval.map(|d| d.as_millis() as u64),
            idle_timeout_ms: heartbeat.idle_timeout.map(|d| d.as_millis() as u64),
        }
    }
}

impl HeartbeatConfig {
    pub fn to_heartbeat(&self) -> Heartbeat {
        Heartbeat {
            ping_interval: self.ping_interval_ms.map(Duration::from_millis),
            idle_timeout: self.idle_timeout_ms.map(Duration::from_millis),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    pub version: u32,
    pub server_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_org: Option<String>,
    #[serde(default)]
    pub smoothing: SmoothingConfig,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            version: 1,
            server_url: DEFAULT_SERVER_URL.to_string(),
            last_org: None,
            smoothing: SmoothingConfig::default(),
            reconnect: ReconnectConfig::default(),
            heartbeat: HeartbeatConfig::default(),
        }
    }
}

pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".scene-sync").join("config.json"))
}

pub fn load_config() -> Option<SyncConfig> {
    load_config_from(&config_path()?)
}

/// `None` when the file is missing or unreadable.
pub fn load_config_from(path: &Path) -> Option<SyncConfig> {
    let content = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&content) {
        Ok(config) => Some(config),
        Err(e) => {
            log::warn!("Ignoring corrupt config at {}: {e}", path.display());
            None
        }
    }
}

pub fn load_or_default() -> SyncConfig {
    load_config().unwrap_or_default()
}

pub fn save_config(config: &SyncConfig) -> Result<()> {
    let path =
        config_path().ok_or_else(|| SyncError::Custom("Cannot find home directory".into()))?;
    save_config_to(&path, config)
}

pub fn save_config_to(path: &Path, config: &SyncConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Records the last organization watched so `watch` can be run bare.
pub fn remember_org(org: &str) -> Result<SyncConfig> {
    let path =
        config_path().ok_or_else(|| SyncError::Custom("Cannot find home directory".into()))?;
    remember_org_at(&path, org)
}

pub fn remember_org_at(path: &Path, org: &str) -> Result<SyncConfig> {
    let mut config = load_config_from(path).unwrap_or_default();
    config.last_org = Some(org.to_string());
    save_config_to(path, &config)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_config(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "scene-sync-config-{name}-{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        dir.join("nested").join("config.json")
    }

    #[test]
    fn test_missing_file_is_none() {
        let path = temp_config("missing");
        assert_eq!(load_config_from(&path), None);
    }

    #[test]
    fn test_save_then_load() {
        let path = temp_config("save");
        let mut config = SyncConfig::default();
        config.server_url = "https://relay.example.com".into();
        config.smoothing.color_half_life_ms = Some(80);

        save_config_to(&path, &config).unwrap();

        assert_eq!(load_config_from(&path), Some(config));
    }

    #[test]
    fn test_minimal_file_fills_defaults() {
        let path = temp_config("minimal");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, r#"{"version":1,"serverUrl":"http://relay:9000"}"#).unwrap();

        let config = load_config_from(&path).unwrap();

        assert_eq!(config.server_url, "http://relay:9000");
        assert_eq!(config.last_org, None);
        assert_eq!(config.smoothing, SmoothingConfig::default());
        assert_eq!(config.reconnect.to_policy(), ReconnectPolicy::default());
        assert_eq!(config.heartbeat.to_heartbeat(), Heartbeat::default());
    }

    #[test]
    fn test_corrupt_file_is_none() {
        let path = temp_config("corrupt");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{not json").unwrap();
        assert_eq!(load_config_from(&path), None);
    }

    #[test]
    fn test_remember_org_keeps_other_fields() {
        let path = temp_config("remember");
        let mut config = SyncConfig::default();
        config.server_url = "http://relay:9000".into();
        save_config_to(&path, &config).unwrap();

        let updated = remember_org_at(&path, "finn").unwrap();

        assert_eq!(updated.last_org.as_deref(), Some("finn"));
        assert_eq!(updated.server_url, "http://relay:9000");
        assert_eq!(load_config_from(&path), Some(updated));
    }

    #[test]
    fn test_smoothing_conversion() {
        let disabled = SmoothingConfig {
            enabled: false,
            ..Default::default()
        };
        assert_eq!(disabled.to_smoothing(), Smoothing::Disabled);

        let linear = SmoothingConfig {
            color_half_life_ms: Some(50),
            ..Default::default()
        };
        assert_eq!(
            linear.to_smoothing(),
            Smoothing::Enabled {
                position_half_life: Duration::from_millis(120),
                rotation_half_life: Duration::from_millis(120),
                color: ColorMode::Linear {
                    half_life: Duration::from_millis(50)
                },
            }
        );
        assert_eq!(SmoothingConfig::default().to_smoothing(), Smoothing::default());
    }

    #[test]
    fn test_camel_case_keys() {
        let json = serde_json::to_value(SyncConfig::default()).unwrap();
        assert_eq!(json["serverUrl"], DEFAULT_SERVER_URL);
        assert_eq!(json["reconnect"]["initialDelayMs"], 500);
        assert_eq!(json["heartbeat"]["idleTimeoutMs"], 45_000);
        assert!(json.get("lastOrg").is_none());
    }
}
