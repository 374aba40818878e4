pub mod core;

pub use crate::core::auth::{
    AccountKind, AuthEndpoints, AuthSession, BrowserEvent, ConsentBrowser, MicrosoftAuthenticator,
    TokenStore,
};
pub use crate::core::downloader::{DownloadEvent, DownloadStatus, VersionInstaller};
pub use crate::core::error::{LauncherError, LauncherResult};
pub use crate::core::launch::{
    GameSpawner, LaunchOptions, LaunchOrchestrator, LaunchOutcome, ProcessEvent, ServerAddress,
    SystemGameSpawner, WindowSize,
};
pub use crate::core::state::{LauncherContext, LauncherSettings};
pub use crate::core::version::{ResilientVersionProvider, VersionEntry, VersionProvider};

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// `info` level. Safe to call once at startup.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
