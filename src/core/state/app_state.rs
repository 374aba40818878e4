// ─── Launcher State ───
// Persisted user settings and the shared context handed to the subsystems.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::auth::TokenStore;
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::launch::WindowSize;

const APP_DIR_NAME: &str = "CraftLauncher";
const SETTINGS_FILE: &str = "settings.json";

/// User-tunable launcher settings, persisted as pretty JSON in the app data
/// directory. Unknown or missing fields fall back to defaults so older
/// settings files keep loading.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherSettings {
    pub game_dir: PathBuf,
    pub ram_gb: u32,
    pub java_path: Option<PathBuf>,
    pub window: WindowSize,
}

impl Default for LauncherSettings {
    fn default() -> Self {
        Self {
            game_dir: default_data_dir().join("minecraft"),
            ram_gb: 4,
            java_path: None,
            window: WindowSize::default(),
        }
    }
}

impl LauncherSettings {
    pub fn load(data_dir: &Path) -> Self {
        let path = data_dir.join(SETTINGS_FILE);
        match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(settings) => settings,
                Err(error) => {
                    warn!("Discarding unreadable settings file: {}", error);
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self, data_dir: &Path) -> LauncherResult<()> {
        std::fs::create_dir_all(data_dir).map_err(|source| LauncherError::Io {
            path: data_dir.to_path_buf(),
            source,
        })?;
        let path = data_dir.join(SETTINGS_FILE);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json).map_err(|source| LauncherError::Io { path, source })?;
        debug!("Settings saved");
        Ok(())
    }
}

/// App data directory for the launcher itself (sessions, settings).
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR_NAME)
}

/// Shared dependencies wired once at startup and passed to the subsystems.
#[derive(Clone)]
pub struct LauncherContext {
    pub data_dir: PathBuf,
    pub http_client: reqwest::Client,
    pub token_store: TokenStore,
    pub settings: Arc<LauncherSettings>,
}

impl LauncherContext {
    pub fn new(data_dir: PathBuf) -> LauncherResult<Self> {
        let http_client = crate::core::http::build_http_client()?;
        let token_store = TokenStore::new(&data_dir);
        let settings = Arc::new(LauncherSettings::load(&data_dir));
        Ok(Self {
            data_dir,
            http_client,
            token_store,
            settings,
        })
    }

    pub fn from_default_dirs() -> LauncherResult<Self> {
        Self::new(default_data_dir())
    }
}
