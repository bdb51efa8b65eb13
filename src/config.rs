use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{DroidLensError, DroidLensResult};

const CONFIG_FILE: &str = "config.toml";
const CONFIG_ENV: &str = "DROIDLENS_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub tap: TapConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Path to the `adb` executable.
    #[serde(default = "default_adb_path")]
    pub adb_path: String,
    /// Device serial passed as `adb -s`. Falls back to `ANDROID_SERIAL`.
    #[serde(default)]
    pub serial: Option<String>,
    /// Where `uiautomator dump` writes on the device.
    #[serde(default = "default_dump_path")]
    pub dump_path: String,
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            adb_path: default_adb_path(),
            serial: None,
            dump_path: default_dump_path(),
            command_timeout_secs: default_command_timeout(),
        }
    }
}

fn default_adb_path() -> String {
    "adb".to_string()
}

fn default_dump_path() -> String {
    "/sdcard/window_dump.xml".to_string()
}

fn default_command_timeout() -> u64 {
    20
}

/// Checks applied to an element's bounds before a tap is dispatched.
/// The defaults dispatch whatever centre the bounds produce.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TapConfig {
    #[serde(default)]
    pub bounds_check: BoundsCheck,
    #[serde(default)]
    pub offscreen: OffscreenPolicy,
    /// Physical screen size; off-screen handling is skipped when unset.
    #[serde(default)]
    pub screen: Option<ScreenSize>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundsCheck {
    /// Inverted or zero-area bounds are tapped at their arithmetic centre.
    #[default]
    Tolerate,
    Reject,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OffscreenPolicy {
    #[default]
    Dispatch,
    Clamp,
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenSize {
    pub width: u32,
    pub height: u32,
}

fn candidate_paths() -> Vec<PathBuf> {
    let mut out = Vec::new();
    if let Ok(explicit) = std::env::var(CONFIG_ENV) {
        out.push(PathBuf::from(explicit));
    }
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            out.push(parent.join(CONFIG_FILE));
        }
    }
    if let Ok(cwd) = std::env::current_dir() {
        out.push(cwd.join(CONFIG_FILE));
    }
    if let Some(dir) = dirs::config_dir() {
        out.push(dir.join("droidlens").join(CONFIG_FILE));
    }
    out
}

fn resolve_config_path() -> DroidLensResult<PathBuf> {
    for candidate in candidate_paths() {
        if candidate.exists() {
            tracing::debug!(path = %candidate.display(), "config found");
            return Ok(candidate);
        }
    }

    Err(DroidLensError::Config(format!(
        "{CONFIG_FILE} not found (${CONFIG_ENV}, next to executable, working directory, user config dir)"
    )))
}

/// Reads and parses a config file, then applies environment overrides.
pub fn load_config_from(path: &Path) -> DroidLensResult<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let mut config: AppConfig = toml::from_str(&content)?;
    apply_env_overrides(&mut config);
    tracing::info!(path = %path.display(), adb = %config.device.adb_path, "config loaded");
    Ok(config)
}

pub fn load_config() -> DroidLensResult<AppConfig> {
    let path = resolve_config_path()?;
    load_config_from(&path)
}

/// Writes to the resolved config path, or to the user config dir when no
/// config exists yet.
pub fn save_config(config: &AppConfig) -> DroidLensResult<PathBuf> {
    let path = match resolve_config_path() {
        Ok(path) => path,
        Err(_) => dirs::config_dir()
            .map(|dir| dir.join("droidlens").join(CONFIG_FILE))
            .ok_or_else(|| DroidLensError::Config("no user config directory".into()))?,
    };
    save_config_to(config, &path)?;
    Ok(path)
}

pub fn save_config_to(config: &AppConfig, path: &Path) -> DroidLensResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    tracing::info!(path = %path.display(), "config saved");
    Ok(())
}

/// `ANDROID_SERIAL` fills in the serial when the file leaves it unset, the
/// same variable `adb` itself honours.
pub fn apply_env_overrides(config: &mut AppConfig) {
    if config.device.serial.is_none() {
        if let Ok(serial) = std::env::var("ANDROID_SERIAL") {
            if !serial.trim().is_empty() {
                config.device.serial = Some(serial);
            }
        }
    }
}
