use anyhow::Context;
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CURRENT_VERSION: u32 = 1;
const SETTINGS_FILENAME: &str = "config.yaml";
const APP_NAME: &str = "pagemark";

/// Engine configuration, loaded once and handed to each session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_version")]
    pub version: u32,

    /// Quiet period before a passive position change is written
    #[serde(default = "default_progress_debounce_ms")]
    pub progress_debounce_ms: u64,

    /// Quiet period before typography changes are written
    #[serde(default = "default_prefs_debounce_ms")]
    pub prefs_debounce_ms: u64,

    /// Upper bound on waiting for a render-settled signal before the saved
    /// percentage is applied anyway
    #[serde(default = "default_restore_delay_ms")]
    pub restore_delay_ms: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    #[serde(default = "default_fallback_encoding")]
    pub fallback_encoding: String,

    /// Keep typography per book instead of one global set
    #[serde(default)]
    pub isolate_book_config: bool,

    #[serde(default = "default_package_fallback_label")]
    pub package_fallback_label: String,

    #[serde(default = "default_page_label")]
    pub page_label: String,

    #[serde(default = "default_front_matter_label")]
    pub front_matter_label: String,
}

fn default_version() -> u32 {
    CURRENT_VERSION
}

fn default_progress_debounce_ms() -> u64 {
    800
}

fn default_prefs_debounce_ms() -> u64 {
    100
}

fn default_restore_delay_ms() -> u64 {
    300
}

fn default_fallback_encoding() -> String {
    "GBK".to_string()
}

fn default_package_fallback_label() -> String {
    "Chapter".to_string()
}

fn default_page_label() -> String {
    "Page".to_string()
}

fn default_front_matter_label() -> String {
    "Front Matter".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            progress_debounce_ms: default_progress_debounce_ms(),
            prefs_debounce_ms: default_prefs_debounce_ms(),
            restore_delay_ms: default_restore_delay_ms(),
            data_dir: None,
            fallback_encoding: default_fallback_encoding(),
            isolate_book_config: false,
            package_fallback_label: default_package_fallback_label(),
            page_label: default_page_label(),
            front_matter_label: default_front_matter_label(),
        }
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|config| config.join(APP_NAME).join(SETTINGS_FILENAME))
}

impl Settings {
    /// Load settings from `path` (or the default location).
    ///
    /// A missing file is created with defaults; an unreadable or invalid
    /// file is logged and defaults are used.
    pub fn load(path: Option<&Path>) -> Self {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match default_config_path() {
                Some(path) => path,
                None => {
                    warn!("Could not determine config directory, using default settings");
                    return Self::default();
                }
            },
        };

        if !path.exists() {
            info!("Settings file not found, creating with defaults at {path:?}");
            let settings = Self::default();
            if let Err(e) = settings.save_to(&path) {
                error!("{e:#}");
            }
            return settings;
        }

        match Self::read_from(&path) {
            Ok(mut settings) => {
                debug!("Loaded settings from {path:?}");
                if settings.version < CURRENT_VERSION {
                    settings.migrate();
                    if let Err(e) = settings.save_to(&path) {
                        error!("{e:#}");
                    }
                }
                settings
            }
            Err(e) => {
                error!("{e:#}");
                Self::default()
            }
        }
    }

    fn read_from(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file {path:?}"))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse settings file {path:?}"))
    }

    fn migrate(&mut self) {
        info!(
            "Migrating settings from v{} to v{}",
            self.version, CURRENT_VERSION
        );
        self.version = CURRENT_VERSION;
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory {parent:?}"))?;
        }
        let content = serde_yaml::to_string(self).context("Failed to serialize settings")?;
        fs::write(path, content).with_context(|| format!("Failed to save settings to {path:?}"))?;
        debug!("Saved settings to {path:?}");
        Ok(())
    }

    /// Directory for the progress store; `None` keeps state in memory.
    pub fn data_dir(&self) -> Option<PathBuf> {
        self.data_dir
            .clone()
            .or_else(|| dirs::data_dir().map(|dir| dir.join(APP_NAME)))
    }

    pub fn progress_debounce(&self) -> Duration {
        Duration::from_millis(self.progress_debounce_ms)
    }

    pub fn prefs_debounce(&self) -> Duration {
        Duration::from_millis(self.prefs_debounce_ms)
    }

    pub fn restore_delay(&self) -> Duration {
        Duration::from_millis(self.restore_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.yaml");
        let settings = Settings::load(Some(&path));
        assert_eq!(settings, Settings::default());
        assert!(path.exists());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "progress_debounce_ms: 50\nfallback_encoding: Big5\n").unwrap();
        let settings = Settings::load(Some(&path));
        assert_eq!(settings.progress_debounce(), Duration::from_millis(50));
        assert_eq!(settings.fallback_encoding, "Big5");
        assert_eq!(settings.page_label, "Page");
        assert_eq!(settings.restore_delay_ms, 300);
    }

    #[test]
    fn invalid_yaml_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "progress_debounce_ms: [not a number\n").unwrap();
        assert_eq!(Settings::load(Some(&path)), Settings::default());
    }

    #[test]
    fn old_version_is_migrated_and_rewritten() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "version: 0\n").unwrap();
        let settings = Settings::load(Some(&path));
        assert_eq!(settings.version, CURRENT_VERSION);
        let rewritten = fs::read_to_string(&path).unwrap();
        assert!(rewritten.contains(&format!("version: {CURRENT_VERSION}")));
    }
}
