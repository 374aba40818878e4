// ─── Launch Orchestrator ───
// Runs the gate sequence in front of every launch (cooldown, single
// instance, session, install, Java) and supervises the spawned process
// through its startup grace period.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::core::auth::{AccountKind, MicrosoftAuthenticator, TokenStore};
use crate::core::downloader::installer::DownloadEvent;
use crate::core::downloader::{is_version_installed, VersionInstaller};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::java::check_java_compatibility;
use crate::core::launch::request::{
    LaunchAuthorization, LaunchRequest, ServerAddress, WindowSize,
};
use crate::core::version::ParsedVersion;

/// What the game process reports back to the orchestrator.
#[derive(Debug, Clone)]
pub enum ProcessEvent {
    Log(String),
    Closed(Option<i32>),
    Errored(String),
}

/// Receiver side of a spawned game process.
pub struct GameProcessHandle {
    pub events: mpsc::Receiver<ProcessEvent>,
}

/// Creates the actual game process. The system implementation runs a JVM;
/// tests script the event stream instead.
#[async_trait]
pub trait GameSpawner: Send + Sync {
    async fn spawn(&self, request: &LaunchRequest) -> LauncherResult<GameProcessHandle>;
}

/// How a successful launch resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchOutcome {
    /// The process survived the startup grace period.
    Started,
    /// The process exited before the grace period ended. Exit codes are
    /// reported as-is; interpreting them is the caller's business.
    Exited(Option<i32>),
}

/// Timing knobs for the gate sequence. Production uses the defaults; tests
/// shrink them.
#[derive(Debug, Clone, Copy)]
pub struct LaunchTimings {
    /// Minimum gap between launch attempts.
    pub cooldown: Duration,
    /// How long a process must survive to count as started.
    pub grace: Duration,
    /// Delay before the running flag is released after the game ends.
    pub release_delay: Duration,
}

impl Default for LaunchTimings {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_millis(1000),
            grace: Duration::from_secs(3),
            release_delay: Duration::from_secs(5),
        }
    }
}

/// Per-launch parameters chosen by the user.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub version: String,
    pub game_dir: PathBuf,
    pub java_bin: PathBuf,
    pub ram_gb: u32,
    pub window: WindowSize,
    pub server: Option<ServerAddress>,
}

pub struct LaunchOrchestrator {
    store: TokenStore,
    authenticator: Arc<MicrosoftAuthenticator>,
    installer: Arc<VersionInstaller>,
    spawner: Arc<dyn GameSpawner>,
    timings: LaunchTimings,
    last_attempt: Mutex<Option<Instant>>,
    running: Arc<AtomicBool>,
}

impl LaunchOrchestrator {
    pub fn new(
        store: TokenStore,
        authenticator: Arc<MicrosoftAuthenticator>,
        installer: Arc<VersionInstaller>,
        spawner: Arc<dyn GameSpawner>,
    ) -> Self {
        Self {
            store,
            authenticator,
            installer,
            spawner,
            timings: LaunchTimings::default(),
            last_attempt: Mutex::new(None),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_timings(mut self, timings: LaunchTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run the full gate sequence and spawn the game.
    ///
    /// Gate order: cooldown, single instance, stored session, install state
    /// (offline sessions never download), token freshness, Java
    /// compatibility. The spawned process then has a grace period to prove
    /// it started; an exit or error inside it is reported instead.
    pub async fn launch(
        &self,
        options: &LaunchOptions,
        download_events: Option<mpsc::UnboundedSender<DownloadEvent>>,
    ) -> LauncherResult<LaunchOutcome> {
        self.check_cooldown()?;

        if self.running.swap(true, Ordering::SeqCst) {
            return Err(LauncherError::AlreadyRunning);
        }
        let mut running_guard = RunningGuard {
            flag: Arc::clone(&self.running),
            armed: true,
        };

        let mut session = self.store.load().ok_or(LauncherError::NotLoggedIn)?;

        match session.kind {
            AccountKind::Offline => {
                // Offline sessions never touch the network; the version has
                // to be on disk already.
                if !is_version_installed(&options.game_dir, &options.version) {
                    return Err(LauncherError::OfflineVersionMissing(options.version.clone()));
                }
            }
            AccountKind::Microsoft => {
                let access_token = self.authenticator.ensure_valid_token().await?;
                self.installer
                    .ensure_version_available(&options.version, &options.game_dir, download_events)
                    .await?;
                // A refresh may have rewritten the stored session.
                session = self.store.load().ok_or(LauncherError::NotLoggedIn)?;
                session.access_token = Some(access_token);
            }
        }

        let parsed_version = ParsedVersion::parse(&options.version);
        check_java_compatibility(&options.java_bin, &parsed_version)?;

        if session.ensure_client_token() {
            self.store.save(&session)?;
        }

        let request = LaunchRequest::new(
            LaunchAuthorization::from_session(&session)?,
            &options.version,
            options.game_dir.clone(),
            options.java_bin.clone(),
            options.ram_gb,
            options.window,
            options.server.clone(),
        );

        info!(
            "Launching {} for {} ({}G max)",
            request.version, request.authorization.name, request.ram_max_gb
        );
        let handle = self.spawner.spawn(&request).await?;

        let outcome = self.supervise_startup(handle).await?;
        running_guard.armed = false;
        Ok(outcome)
    }

    fn check_cooldown(&self) -> LauncherResult<()> {
        let mut last_attempt = self.last_attempt.lock().expect("cooldown lock poisoned");
        if let Some(at) = *last_attempt {
            if at.elapsed() < self.timings.cooldown {
                return Err(LauncherError::LaunchCooldown);
            }
        }
        *last_attempt = Some(Instant::now());
        Ok(())
    }

    /// Watch the freshly spawned process for the grace period. Whatever path
    /// resolves first hands the running flag to a background release task.
    async fn supervise_startup(
        &self,
        mut handle: GameProcessHandle,
    ) -> LauncherResult<LaunchOutcome> {
        let grace = tokio::time::sleep(self.timings.grace);
        tokio::pin!(grace);

        loop {
            tokio::select! {
                _ = &mut grace => {
                    debug!("Game survived the startup grace period");
                    self.watch_until_exit(handle);
                    return Ok(LaunchOutcome::Started);
                }
                event = handle.events.recv() => match event {
                    Some(ProcessEvent::Log(line)) => debug!("game: {}", line),
                    Some(ProcessEvent::Errored(message)) => {
                        return Err(LauncherError::JavaExecution(message));
                    }
                    Some(ProcessEvent::Closed(code)) => {
                        info!("Game exited during startup with code {:?}", code);
                        self.release_later();
                        return Ok(LaunchOutcome::Exited(code));
                    }
                    // Event stream gone without an exit report; treat it as
                    // an exit with no code.
                    None => {
                        self.release_later();
                        return Ok(LaunchOutcome::Exited(None));
                    }
                }
            }
        }
    }

    /// Background supervision after a successful start: drain events until
    /// the process ends, then release the running flag.
    fn watch_until_exit(&self, mut handle: GameProcessHandle) {
        let running = Arc::clone(&self.running);
        let release_delay = self.timings.release_delay;
        tokio::spawn(async move {
            while let Some(event) = handle.events.recv().await {
                match event {
                    ProcessEvent::Log(line) => debug!("game: {}", line),
                    ProcessEvent::Errored(message) => {
                        warn!("Game process error: {}", message);
                        break;
                    }
                    ProcessEvent::Closed(code) => {
                        info!("Game exited with code {:?}", code);
                        break;
                    }
                }
            }
            tokio::time::sleep(release_delay).await;
            running.store(false, Ordering::SeqCst);
        });
    }

    fn release_later(&self) {
        let running = Arc::clone(&self.running);
        let release_delay = self.timings.release_delay;
        tokio::spawn(async move {
            tokio::time::sleep(release_delay).await;
            running.store(false, Ordering::SeqCst);
        });
    }
}

/// Clears the running flag if a launch errors out between the single
/// instance gate and the handoff to background supervision.
struct RunningGuard {
    flag: Arc<AtomicBool>,
    armed: bool,
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        if self.armed {
            self.flag.store(false, Ordering::SeqCst);
        }
    }
}
