//! Command-line tool configuration management

use anyhow::{Context, Result, anyhow};
use common::PrinterConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Printer identification and transfer settings
    #[serde(default)]
    pub printer: PrinterConfig,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "LoggingSettings::default_level")]
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

impl LoggingSettings {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl AppConfig {
    /// Load configuration from `path`, or from the first standard location
    /// that exists
    ///
    /// Built-in defaults are used only when no configuration file exists. A
    /// file that exists but cannot be read, parsed or validated is an error.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        match path {
            Some(path) => Self::load_file(&path),
            None => Self::load_first(&Self::search_paths()),
        }
    }

    /// Standard configuration locations, in lookup order
    fn search_paths() -> Vec<PathBuf> {
        vec![
            Self::default_path(),
            PathBuf::from("/etc/usb-printer/config.toml"),
        ]
    }

    fn load_first(candidates: &[PathBuf]) -> Result<Self> {
        match candidates.iter().find(|p| p.exists()) {
            Some(path) => Self::load_file(path),
            None => Ok(Self::default()),
        }
    }

    fn load_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: AppConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.display()))?;

        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        // Create parent directories if they don't exist
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

    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("usb-printer").join("config.toml")
        } else {
            PathBuf::from(".config/usb-printer/config.toml")
        }
    }

    fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            ));
        }

        self.printer
            .validate()
            .map_err(|e| anyhow!("Invalid printer settings: {}", e))
    }
}

/// Load configuration from a path that may start with `~`
pub fn load_config(path: &str) -> Result<AppConfig> {
    let path_buf = PathBuf::from(shellexpand::tilde(path).as_ref());
    AppConfig::load(Some(path_buf))
}

/// Parse a USB vendor or product ID
///
/// `0x`-prefixed IDs are hexadecimal (`0x04b8`, as printed by `lsusb`),
/// anything else is decimal.
pub fn parse_usb_id(id: &str) -> Result<u16, String> {
    match id.strip_prefix("0x").or_else(|| id.strip_prefix("0X")) {
        Some(hex) if !hex.is_empty() && hex.len() <= 4 => u16::from_str_radix(hex, 16)
            .map_err(|_| format!("'{}' is not a valid hex USB ID", id)),
        Some(_) => Err(format!("'{}' is not a 1-4 digit hex USB ID", id)),
        None => id
            .parse()
            .map_err(|_| format!("'{}' is not a valid USB ID (decimal, or hex with 0x)", id)),
    }
}
