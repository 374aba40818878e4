// ─── Launch Request ───
// Everything a spawner needs to start the game process, assembled from the
// session, settings and version metadata before any process is created.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::auth::{AccountKind, AuthSession};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::version::ParsedVersion;

const DEFAULT_SERVER_PORT: u16 = 25565;
/// Quick-join via `--quickPlayMultiplayer` exists from this version on;
/// older clients take the legacy `--server`/`--port` pair.
const QUICK_PLAY_MIN: ParsedVersion = ParsedVersion::new(1, 20, 0);

/// Credentials passed to the game process.
#[derive(Debug, Clone)]
pub struct LaunchAuthorization {
    pub name: String,
    pub uuid: String,
    pub access_token: String,
    pub client_token: String,
}

impl LaunchAuthorization {
    /// Build launch credentials from a validated session.
    ///
    /// Microsoft sessions fail fast if the token bundle is incomplete.
    /// Offline sessions get a placeholder token and a random UUID, matching
    /// what the game expects when it skips server authentication.
    pub fn from_session(session: &AuthSession) -> LauncherResult<Self> {
        session.validate()?;
        match session.kind {
            AccountKind::Microsoft => Ok(Self {
                name: session.username.clone(),
                uuid: session
                    .uuid
                    .clone()
                    .ok_or_else(|| LauncherError::InvalidSession("missing player UUID".into()))?,
                access_token: session.access_token.clone().ok_or_else(|| {
                    LauncherError::InvalidSession("missing access token".into())
                })?,
                client_token: session.client_token.clone(),
            }),
            AccountKind::Offline => Ok(Self {
                name: session.username.clone(),
                uuid: Uuid::new_v4().simple().to_string(),
                access_token: "offline".to_string(),
                client_token: session.client_token.clone(),
            }),
        }
    }
}

/// Multiplayer server to join right after startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerAddress {
    pub host: String,
    pub port: u16,
}

impl ServerAddress {
    /// Parse `host` or `host:port`; the port defaults to 25565.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        match trimmed.rsplit_once(':') {
            Some((host, port)) => {
                let port = port.parse().ok()?;
                Some(Self {
                    host: host.to_string(),
                    port,
                })
            }
            None => Some(Self {
                host: trimmed.to_string(),
                port: DEFAULT_SERVER_PORT,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WindowSize {
    pub width: u32,
    pub height: u32,
}

impl Default for WindowSize {
    fn default() -> Self {
        Self {
            width: 854,
            height: 480,
        }
    }
}

/// A fully resolved launch: the spawner turns this into a JVM invocation
/// without consulting any other state.
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub authorization: LaunchAuthorization,
    pub version: String,
    pub parsed_version: ParsedVersion,
    pub game_dir: PathBuf,
    pub java_bin: PathBuf,
    pub ram_min_gb: u32,
    pub ram_max_gb: u32,
    pub window: WindowSize,
    pub server: Option<ServerAddress>,
}

impl LaunchRequest {
    pub fn new(
        authorization: LaunchAuthorization,
        version: &str,
        game_dir: PathBuf,
        java_bin: PathBuf,
        ram_gb: u32,
        window: WindowSize,
        server: Option<ServerAddress>,
    ) -> Self {
        // Leave one gigabyte of headroom below the maximum, never under 1.
        let ram_max_gb = ram_gb.max(1);
        let ram_min_gb = ram_max_gb.saturating_sub(1).max(1);
        Self {
            authorization,
            version: version.to_string(),
            parsed_version: ParsedVersion::parse(version),
            game_dir,
            java_bin,
            ram_min_gb,
            ram_max_gb,
            window,
            server,
        }
    }

    pub fn jvm_memory_args(&self) -> Vec<String> {
        vec![
            format!("-Xms{}G", self.ram_min_gb),
            format!("-Xmx{}G", self.ram_max_gb),
        ]
    }

    /// Program arguments handed to the game's main class.
    pub fn game_arguments(&self) -> Vec<String> {
        let mut args = vec![
            "--username".to_string(),
            self.authorization.name.clone(),
            "--uuid".to_string(),
            self.authorization.uuid.clone(),
            "--accessToken".to_string(),
            self.authorization.access_token.clone(),
            "--version".to_string(),
            self.version.clone(),
            "--gameDir".to_string(),
            self.game_dir.to_string_lossy().to_string(),
            "--assetsDir".to_string(),
            self.game_dir.join("assets").to_string_lossy().to_string(),
            "--width".to_string(),
            self.window.width.to_string(),
            "--height".to_string(),
            self.window.height.to_string(),
        ];

        if let Some(server) = &self.server {
            if self.parsed_version.is_at_least(QUICK_PLAY_MIN) {
                args.push("--quickPlayMultiplayer".to_string());
                args.push(format!("{}:{}", server.host, server.port));
            } else {
                args.push("--server".to_string());
                args.push(server.host.clone());
                args.push("--port".to_string());
                args.push(server.port.to_string());
            }
        }

        args
    }
}
