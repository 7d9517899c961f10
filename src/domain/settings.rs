use crate::domain::models::DeviceId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_false")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_true")]
    pub show_file_line: bool,
    #[serde(default = "default_false")]
    pub show_thread_ids: bool,
    #[serde(default = "default_true")]
    pub show_target: bool,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "minutely", "never"
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging_enabled: default_false(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_file_line: default_true(),
            show_thread_ids: default_false(),
            show_target: default_true(),
            ansi_colors: default_true(),
            rotation: default_rotation(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "wearable_link".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    // Logging Settings
    #[serde(default)]
    pub log_settings: LogSettings,

    // Scan Settings
    #[serde(default = "default_scan_duration_secs")]
    pub scan_duration_secs: u64,

    // Authentication Settings
    #[serde(default = "default_auth_timeout_ms")]
    pub auth_timeout_ms: u64,
    /// Device family name -> hex encoded 16-byte secret
    #[serde(default)]
    pub secret_keys: HashMap<String, String>,

    // Last connected device, used for automatic reconnect after restart
    #[serde(default)]
    pub last_connected_device: Option<DeviceId>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_settings: LogSettings::default(),
            scan_duration_secs: default_scan_duration_secs(),
            auth_timeout_ms: default_auth_timeout_ms(),
            secret_keys: HashMap::new(),
            last_connected_device: None,
        }
    }
}

fn default_scan_duration_secs() -> u64 {
    10
}
fn default_auth_timeout_ms() -> u64 {
    30_000
}

impl Settings {
    /// Decode the configured secret for a device family, if any.
    pub fn secret_key(&self, family: &str) -> anyhow::Result<Option<[u8; 16]>> {
        let Some(encoded) = self.secret_keys.get(family) else {
            return Ok(None);
        };
        let bytes = hex::decode(encoded.trim())?;
        let key: [u8; 16] = bytes.try_into().map_err(|b: Vec<u8>| {
            anyhow::anyhow!(
                "Secret key for {} must be 16 bytes, got {}",
                family,
                b.len()
            )
        })?;
        Ok(Some(key))
    }
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        Ok(Self::with_path(settings_path))
    }

    /// Load settings from an explicit file, falling back to defaults.
    pub fn with_path(settings_path: PathBuf) -> Self {
        let settings = match Self::load_from_file(&settings_path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::debug!(
                    "Using default settings ({}): {}",
                    settings_path.display(),
                    e
                );
                Settings::default()
            }
        };

        Self {
            settings,
            settings_path,
        }
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("WearableLink");
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.settings_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }

    pub fn remember_device(&mut self, id: DeviceId) -> anyhow::Result<()> {
        if self.settings.last_connected_device != Some(id) {
            self.settings.last_connected_device = Some(id);
            self.save()?;
        }
        Ok(())
    }

    pub fn forget_device(&mut self) -> anyhow::Result<()> {
        if self.settings.last_connected_device.take().is_some() {
            self.save()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let service = SettingsService::with_path(dir.path().join("settings.json"));
        assert_eq!(service.get().scan_duration_secs, 10);
        assert_eq!(service.get().auth_timeout_ms, 30_000);
        assert!(service.get().last_connected_device.is_none());
    }

    #[test]
    fn test_remembered_device_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let id = DeviceId::new(Uuid::new_v4());

        let mut service = SettingsService::with_path(path.clone());
        service.remember_device(id).unwrap();

        let reloaded = SettingsService::with_path(path.clone());
        assert_eq!(reloaded.get().last_connected_device, Some(id));

        let mut reloaded = reloaded;
        reloaded.forget_device().unwrap();
        let cleared = SettingsService::with_path(path);
        assert!(cleared.get().last_connected_device.is_none());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{ "scan_duration_secs": 3 }"#).unwrap();

        let service = SettingsService::with_path(path);
        assert_eq!(service.get().scan_duration_secs, 3);
        assert_eq!(service.get().log_settings.level, "info");
    }

    #[test]
    fn test_secret_key_decoding() {
        let mut settings = Settings::default();
        assert_eq!(settings.secret_key("Mi Band 3").unwrap(), None);

        settings.secret_keys.insert(
            "Mi Band 3".to_string(),
            "000102030405060708090a0b0c0d0e0f".to_string(),
        );
        let key = settings.secret_key("Mi Band 3").unwrap().unwrap();
        assert_eq!(key[15], 0x0f);

        settings
            .secret_keys
            .insert("Mi Band 3".to_string(), "0001".to_string());
        assert!(settings.secret_key("Mi Band 3").is_err());
    }
}
