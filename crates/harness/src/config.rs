//! Harness configuration management

use anyhow::{Context, Result, anyhow};
use common::LogFormat;
use protocol::{ConfigurationDescriptor, DeviceDescriptor, InterfaceDescriptor};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    pub harness: HarnessSettings,
    /// Fake devices attached at startup, in order
    #[serde(default)]
    pub devices: Vec<DeviceDescriptor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessSettings {
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
    /// Abort a script at the first failed step
    #[serde(default)]
    pub stop_on_error: bool,
}

impl Default for HarnessSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Full,
            stop_on_error: false,
        }
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            harness: HarnessSettings::default(),
            devices: vec![Self::sample_device()],
        }
    }
}

impl HarnessConfig {
    /// Device written by `--save-config` so users have something to edit
    fn sample_device() -> DeviceDescriptor {
        DeviceDescriptor {
            vendor_id: 0x18d1,
            product_id: 0xf00d,
            product_name: Some("Fake WebUSB device".to_string()),
            configurations: vec![ConfigurationDescriptor::new(
                1,
                vec![
                    InterfaceDescriptor::new(0, [0]),
                    InterfaceDescriptor::new(1, [0, 1]),
                ],
            )],
        }
    }

    /// Load configuration from the specified path
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p,
            None => {
                let candidate = Self::default_path();
                if !candidate.exists() {
                    return Err(anyhow!("No configuration file found, using defaults"));
                }
                candidate
            }
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: HarnessConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config.validate()?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("webusb-harness").join("harness.toml")
        } else {
            PathBuf::from(".config/webusb-harness/harness.toml")
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.harness.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.harness.log_level,
                valid_levels.join(", ")
            ));
        }

        for (index, device) in self.devices.iter().enumerate() {
            device
                .validate()
                .with_context(|| format!("Invalid descriptor for device #{}", index + 1))?;
        }

        Ok(())
    }
}

/// Load a config file, expanding a leading `~`
pub fn load_config(path: &str) -> Result<HarnessConfig> {
    let path_buf = PathBuf::from(shellexpand::tilde(path).as_ref());
    HarnessConfig::load(Some(path_buf))
}
