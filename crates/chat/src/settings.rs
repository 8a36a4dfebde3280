use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use figment::{
    Figment,
    providers::{Format, Json, Serialized},
};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

use crate::reveal::{DEFAULT_REVEAL_STEP_CHARS, DEFAULT_REVEAL_TICK};

pub const SETTINGS_DIRECTORY_NAME: &str = "rill";
pub const SETTINGS_FILE_NAME: &str = "settings.json";

const DEFAULT_STALL_TIMEOUT_MS: u64 = 30_000;

fn default_reveal_tick_ms() -> u64 {
    DEFAULT_REVEAL_TICK.as_millis() as u64
}

fn default_reveal_step_chars() -> usize {
    DEFAULT_REVEAL_STEP_CHARS
}

fn default_stall_timeout_ms() -> u64 {
    DEFAULT_STALL_TIMEOUT_MS
}

/// Tunables for the reconciliation core: reveal pacing and the stall guard
/// for requests that never produce a first chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSettings {
    #[serde(default = "default_reveal_tick_ms")]
    pub reveal_tick_ms: u64,
    #[serde(default = "default_reveal_step_chars")]
    pub reveal_step_chars: usize,
    #[serde(default = "default_stall_timeout_ms")]
    pub stall_timeout_ms: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            reveal_tick_ms: default_reveal_tick_ms(),
            reveal_step_chars: default_reveal_step_chars(),
            stall_timeout_ms: default_stall_timeout_ms(),
        }
    }
}

impl ClientSettings {
    pub fn reveal_tick(&self) -> Duration {
        Duration::from_millis(self.reveal_tick_ms)
    }

    pub fn reveal_step_chars(&self) -> usize {
        self.reveal_step_chars
    }

    pub fn stall_timeout(&self) -> Duration {
        Duration::from_millis(self.stall_timeout_ms)
    }

    /// Clamps nonsensical zero values back to the defaults.
    pub fn normalized(mut self) -> Self {
        if self.reveal_tick_ms == 0 {
            self.reveal_tick_ms = default_reveal_tick_ms();
        }
        if self.reveal_step_chars == 0 {
            self.reveal_step_chars = default_reveal_step_chars();
        }
        if self.stall_timeout_ms == 0 {
            self.stall_timeout_ms = default_stall_timeout_ms();
        }
        self
    }
}

#[derive(Debug, Snafu)]
pub enum SettingsError {
    #[snafu(display("failed to create settings directory {path:?}"))]
    CreateDir {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to serialize settings"))]
    SerializeConfig {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to write settings file {path:?}"))]
    WriteFile {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to move settings file into place at {path:?}"))]
    CommitFile {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
}

pub struct SettingsStore {
    settings: Arc<ArcSwap<ClientSettings>>,
    config_path: PathBuf,
}

impl SettingsStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(format!(".{SETTINGS_DIRECTORY_NAME}")))
    }

    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join(SETTINGS_FILE_NAME)
    }

    pub fn new(config_path: PathBuf) -> Self {
        let settings = Self::load_from_disk(&config_path);
        Self {
            settings: Arc::new(ArcSwap::from_pointee(settings)),
            config_path,
        }
    }

    pub fn load() -> Self {
        Self::new(Self::default_config_path())
    }

    pub fn settings(&self) -> Arc<ClientSettings> {
        self.settings.load_full()
    }

    pub fn update(&self, settings: ClientSettings) -> Result<(), SettingsError> {
        let normalized = settings.normalized();
        self.persist(&normalized)?;
        self.settings.store(Arc::new(normalized));
        Ok(())
    }

    fn load_from_disk(path: &PathBuf) -> ClientSettings {
        if !path.exists() {
            tracing::info!("settings file not found at {:?}, using defaults", path);
            return ClientSettings::default();
        }

        let figment =
            Figment::from(Serialized::defaults(ClientSettings::default())).merge(Json::file(path));

        match figment.extract::<ClientSettings>() {
            Ok(settings) => settings.normalized(),
            Err(error) => {
                tracing::warn!(
                    "failed to parse settings from {:?}: {}. using defaults",
                    path,
                    error
                );
                ClientSettings::default()
            }
        }
    }

    fn persist(&self, settings: &ClientSettings) -> Result<(), SettingsError> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).context(CreateDirSnafu {
                stage: "create-settings-directory",
                path: parent.to_path_buf(),
            })?;
        }

        let content = serde_json::to_string_pretty(settings).context(SerializeConfigSnafu {
            stage: "serialize-settings-json",
        })?;

        let temp_path = self.config_path.with_extension("json.tmp");
        std::fs::write(&temp_path, content).context(WriteFileSnafu {
            stage: "write-temporary-settings-file",
            path: temp_path.clone(),
        })?;
        std::fs::rename(&temp_path, &self.config_path).context(CommitFileSnafu {
            stage: "commit-settings-file",
            path: self.config_path.clone(),
        })
    }
}
