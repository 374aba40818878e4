// ─── Token Store ───
// Durable single-session persistence for the authentication bundle.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::core::auth::AuthSession;
use crate::core::error::{LauncherError, LauncherResult};

const SESSION_FILE: &str = "auth_session.json";

/// Persists exactly one [`AuthSession`] as pretty JSON in the app data
/// directory. No network I/O; `save` overwrites, `clear` removes.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(SESSION_FILE),
        }
    }

    pub fn load(&self) -> Option<AuthSession> {
        let raw = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(session) => Some(session),
            Err(error) => {
                warn!("Discarding unreadable session file: {}", error);
                None
            }
        }
    }

    pub fn save(&self, session: &AuthSession) -> LauncherResult<()> {
        session.validate()?;

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| LauncherError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let json = serde_json::to_string_pretty(session)?;
        std::fs::write(&self.path, json).map_err(|source| LauncherError::Io {
            path: self.path.clone(),
            source,
        })?;

        debug!("Session saved for {}", session.username);
        Ok(())
    }

    pub fn clear(&self) {
        if self.path.exists() {
            if let Err(error) = std::fs::remove_file(&self.path) {
                warn!("Failed to remove session file: {}", error);
            }
        }
    }
}
