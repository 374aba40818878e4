use std::path::PathBuf;
use thiserror::Error;

/// Central error type for the entire launcher backend.
/// Every module returns `Result<T, LauncherError>`.
#[derive(Debug, Error)]
pub enum LauncherError {
    // ── IO ──────────────────────────────────────────────
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    // ── Network ─────────────────────────────────────────
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("Download failed for {url}: HTTP {status}")]
    DownloadFailed { url: String, status: u16 },

    // ── Integrity ───────────────────────────────────────
    #[error("SHA-1 mismatch for {path:?}: expected {expected}, got {actual}")]
    Sha1Mismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    // ── JSON ────────────────────────────────────────────
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ── Authentication ──────────────────────────────────
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("No Minecraft profile on this account - a Java Edition license is required")]
    NoGameLicense,

    #[error("An authentication is already in progress")]
    AuthInProgress,

    #[error("Authentication window was closed before completion")]
    AuthWindowClosed,

    #[error("Authentication timed out")]
    AuthTimeout,

    #[error("Not logged in - no stored session")]
    NotLoggedIn,

    #[error("Invalid session: {0}")]
    InvalidSession(String),

    // ── Versions / install ──────────────────────────────
    #[error("Version not found in manifest: {0}")]
    VersionNotFound(String),

    #[error("Incomplete download: {0}")]
    IncompleteDownload(String),

    #[error("Download timed out with critical files still missing")]
    DownloadTimeout,

    #[error("Version {0} is not installed locally - offline sessions cannot download, log in with Microsoft first")]
    OfflineVersionMissing(String),

    // ── Java ────────────────────────────────────────────
    #[error("Java {required}+ required, Java {detected} detected")]
    JavaIncompatible { required: u32, detected: u32 },

    #[error("Java execution failed: {0}")]
    JavaExecution(String),

    // ── Launch guards ───────────────────────────────────
    #[error("Launch attempted too soon after the previous one")]
    LaunchCooldown,

    #[error("The game is already running")]
    AlreadyRunning,

    // ── Generic ─────────────────────────────────────────
    #[error("{0}")]
    Other(String),
}

/// Convenience alias used throughout the crate.
pub type LauncherResult<T> = Result<T, LauncherError>;

impl From<std::io::Error> for LauncherError {
    fn from(source: std::io::Error) -> Self {
        LauncherError::Io {
            path: PathBuf::new(),
            source,
        }
    }
}

impl LauncherError {
    /// Whether a failed request may succeed on a later attempt.
    ///
    /// Covers rate limiting (429), temporary unavailability (503) and request
    /// timeouts. Connection-level failures are excluded here; retry policies
    /// that want them (the OAuth chain) opt in explicitly.
    pub fn is_transient(&self) -> bool {
        match self {
            LauncherError::HttpStatus { status, .. }
            | LauncherError::DownloadFailed { status, .. } => *status == 429 || *status == 503,
            LauncherError::Http(source) => source.is_timeout(),
            _ => false,
        }
    }

    /// Whether the error is a connection-level failure (unreachable host,
    /// refused connection).
    pub fn is_connection(&self) -> bool {
        matches!(self, LauncherError::Http(source) if source.is_connect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification_covers_429_and_503_only() {
        let rate_limited = LauncherError::HttpStatus {
            url: "https://example.com".into(),
            status: 429,
        };
        let unavailable = LauncherError::DownloadFailed {
            url: "https://example.com".into(),
            status: 503,
        };
        let forbidden = LauncherError::HttpStatus {
            url: "https://example.com".into(),
            status: 403,
        };

        assert!(rate_limited.is_transient());
        assert!(unavailable.is_transient());
        assert!(!forbidden.is_transient());
        assert!(!LauncherError::NoGameLicense.is_transient());
        assert!(!LauncherError::AuthWindowClosed.is_transient());
    }
}
