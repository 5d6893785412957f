//! Configuration management for the capture engine
//!
//! Loads and saves the engine's TOML configuration: session queue and
//! preset, initial device settings, and which permissions to negotiate when
//! the session starts.

use crate::device::{DevicePosition, FlashMode, FocusMode, TorchMode};
use crate::errors::EngineError;
use crate::permissions::PermissionKind;
use crate::session::SessionPreset;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    pub session: SessionConfig,
    pub device: DeviceConfig,
    pub permissions: PermissionConfig,
}

/// Session and session queue configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Capture preset applied when the engine is created
    pub preset: SessionPreset,
    /// Name of the serial session queue thread
    pub queue_label: String,
    /// How long shutdown waits for queued session work, in milliseconds
    pub shutdown_timeout_ms: u64,
}

/// Initial device settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub default_position: DevicePosition,
    pub focus: FocusMode,
    pub torch: TorchMode,
    pub flash: FlashMode,
    /// Rotate the preview with the device
    pub rotation_follows_device: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionConfig {
    /// Inputs negotiated by `start_session_with`
    pub requests: Vec<PermissionKind>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig {
                preset: SessionPreset::InputPriority,
                queue_label: "capture-engine.session".to_string(),
                shutdown_timeout_ms: 1000,
            },
            device: DeviceConfig {
                default_position: DevicePosition::Back,
                focus: FocusMode::ContinuousAutoFocus,
                torch: TorchMode::Off,
                flash: FlashMode::Off,
                rotation_follows_device: false,
            },
            permissions: PermissionConfig {
                requests: PermissionKind::ALL.to_vec(),
            },
        }
    }
}

impl EngineConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, EngineError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read config file: {}", e)))?;

        let config: EngineConfig = toml::from_str(&contents)
            .map_err(|e| EngineError::Config(format!("Failed to parse config file: {}", e)))?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), EngineError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                EngineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| EngineError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| EngineError::Config(format!("Failed to write config file: {}", e)))?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Get default config file path
    pub fn default_path() -> PathBuf {
        PathBuf::from("capture-engine.toml")
    }

    /// Load from default location or fall back to defaults
    pub fn load_or_default() -> Self {
        Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.session.shutdown_timeout_ms)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.session.queue_label.trim().is_empty() {
            return Err("Session queue label must not be empty".to_string());
        }
        if self.session.queue_label.contains('\0') {
            return Err("Session queue label must not contain NUL".to_string());
        }
        if self.session.shutdown_timeout_ms == 0 {
            return Err("Shutdown timeout must be greater than zero".to_string());
        }

        let requests = &self.permissions.requests;
        for (i, kind) in requests.iter().enumerate() {
            if requests[..i].contains(kind) {
                return Err(format!("Permission {} requested more than once", kind));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.session.preset, SessionPreset::InputPriority);
        assert_eq!(config.device.default_position, DevicePosition::Back);
        assert_eq!(
            config.permissions.requests,
            vec![PermissionKind::Camera, PermissionKind::Microphone]
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut bad = EngineConfig::default();
        bad.session.queue_label = "  ".to_string();
        assert!(bad.validate().is_err());

        let mut bad = EngineConfig::default();
        bad.session.shutdown_timeout_ms = 0;
        assert!(bad.validate().is_err());

        let mut bad = EngineConfig::default();
        bad.permissions.requests = vec![PermissionKind::Camera, PermissionKind::Camera];
        assert!(bad.validate().is_err());

        let mut camera_only = EngineConfig::default();
        camera_only.permissions.requests = vec![PermissionKind::Camera];
        assert!(camera_only.validate().is_ok());
    }

    #[test]
    fn test_config_toml_format() {
        let toml_string = toml::to_string_pretty(&EngineConfig::default()).unwrap();

        assert!(toml_string.contains("[session]"));
        assert!(toml_string.contains("[device]"));
        assert!(toml_string.contains("[permissions]"));
        assert!(toml_string.contains("preset = \"input_priority\""));
        assert!(toml_string.contains("default_position = \"back\""));
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = EngineConfig::load_from_file("nonexistent_capture_engine.toml");
        assert_eq!(result.unwrap(), EngineConfig::default());
    }
}
