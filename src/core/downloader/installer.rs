// ─── Version Installer ───
// Makes a Minecraft version playable locally: version JSON, client jar,
// OS-filtered libraries, natives and assets. Installation is idempotent and
// keyed on the presence of `versions/<v>/<v>.json`; when that file exists the
// installer returns without any network traffic.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::core::downloader::client::{DownloadEntry, Downloader};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::http::check_status;
use crate::core::version::version_file::LibDownloadArtifact;
use crate::core::version::{VersionJson, VersionProvider};

const DOWNLOAD_CONCURRENCY: usize = 2;
const ASSET_OBJECTS_URL: &str = "https://resources.download.minecraft.net";
/// Installs that run longer than this are cut off; if the version JSON made
/// it to disk by then the install is treated as repairable on next launch.
const SOFT_TIMEOUT: Duration = Duration::from_secs(90 * 60);
/// Progress events are emitted at most once per 5% step per asset type.
const PROGRESS_STEP_PERCENT: u64 = 5;

// ─── Paths ───

pub fn version_dir(game_dir: &Path, version: &str) -> PathBuf {
    game_dir.join("versions").join(version)
}

pub fn version_json_path(game_dir: &Path, version: &str) -> PathBuf {
    version_dir(game_dir, version).join(format!("{version}.json"))
}

pub fn version_jar_path(game_dir: &Path, version: &str) -> PathBuf {
    version_dir(game_dir, version).join(format!("{version}.jar"))
}

/// The install marker the rest of the launcher keys on.
pub fn is_version_installed(game_dir: &Path, version: &str) -> bool {
    version_json_path(game_dir, version).is_file()
}

// ─── Download Task State ───

/// Lifecycle of one install run. Transitions only move forward:
/// `Pending → InProgress → {Completed | Failed | TimedOut}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    TimedOut,
}

impl DownloadStatus {
    fn rank(self) -> u8 {
        match self {
            DownloadStatus::Pending => 0,
            DownloadStatus::InProgress => 1,
            DownloadStatus::Completed | DownloadStatus::Failed | DownloadStatus::TimedOut => 2,
        }
    }
}

/// Mutable state of one install run. Owned by the installer for the duration
/// of `ensure_version_available`; the final snapshot is returned in the
/// report.
#[derive(Debug)]
pub struct DownloadTask {
    pub version: String,
    pub game_directory: PathBuf,
    status: DownloadStatus,
    pub progress_by_type: HashMap<String, (u64, u64)>,
    pub non_critical_errors: u32,
}

impl DownloadTask {
    fn new(version: &str, game_dir: &Path) -> Self {
        Self {
            version: version.to_string(),
            game_directory: game_dir.to_path_buf(),
            status: DownloadStatus::Pending,
            progress_by_type: HashMap::new(),
            non_critical_errors: 0,
        }
    }

    pub fn status(&self) -> DownloadStatus {
        self.status
    }

    /// Advance the status. Backward transitions are ignored so a late
    /// progress update can never resurrect a finished task.
    pub fn advance(&mut self, next: DownloadStatus) {
        if next.rank() > self.status.rank() {
            self.status = next;
        }
    }

    fn record_progress(&mut self, kind: &str, completed: u64, total: u64) {
        self.progress_by_type
            .insert(kind.to_string(), (completed, total));
    }
}

/// Outcome of `ensure_version_available`.
#[derive(Debug)]
pub struct InstallReport {
    pub version: String,
    pub status: DownloadStatus,
    pub library_files: u64,
    pub non_critical_errors: u32,
    pub already_installed: bool,
}

// ─── Progress Events ───

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DownloadEvent {
    Started {
        version: String,
    },
    Progress {
        kind: String,
        completed: u64,
        total: u64,
        percent: u64,
    },
    NonCriticalError {
        message: String,
        count: u32,
    },
    Completed {
        version: String,
        non_critical_errors: u32,
    },
    Failed {
        version: String,
        message: String,
    },
    TimedOut {
        version: String,
        soft_success: bool,
    },
}

fn emit(events: Option<&mpsc::UnboundedSender<DownloadEvent>>, event: DownloadEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event);
    }
}

/// Deduplicates progress events: one per asset-type change, then one per 5%
/// step within that type. Keeps event volume sane for asset downloads with
/// thousands of tiny files.
#[derive(Debug, Default)]
pub struct ProgressThrottle {
    last_kind: Option<String>,
    last_step: HashMap<String, u64>,
}

impl ProgressThrottle {
    pub fn should_emit(&mut self, kind: &str, completed: u64, total: u64) -> bool {
        let percent = if total == 0 {
            100
        } else {
            completed * 100 / total
        };
        let step = percent / PROGRESS_STEP_PERCENT;

        let kind_changed = self.last_kind.as_deref() != Some(kind);
        let step_advanced = match self.last_step.get(kind) {
            Some(previous) => step > *previous,
            None => true,
        };

        if kind_changed || step_advanced {
            self.last_kind = Some(kind.to_string());
            self.last_step.insert(kind.to_string(), step);
            true
        } else {
            false
        }
    }
}

// ─── Error Classification ───

/// How a single failed asset affects the install as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Abort the install: nothing else will succeed either.
    Fatal,
    /// Count it and keep going; the game tolerates a few missing assets.
    NonCritical,
}

/// Network-unreachable and authentication failures abort the run; everything
/// else (a 404 on one asset, a checksum mismatch on one library) is counted
/// and tolerated up to critical-artifact verification.
pub fn classify_download_error(error: &LauncherError) -> ErrorSeverity {
    if error.is_connection() {
        return ErrorSeverity::Fatal;
    }
    match error {
        LauncherError::DownloadFailed { status, .. }
        | LauncherError::HttpStatus { status, .. }
            if *status == 401 || *status == 403 =>
        {
            ErrorSeverity::Fatal
        }
        _ => ErrorSeverity::NonCritical,
    }
}

// ─── Asset Index Model ───

#[derive(Debug, Deserialize)]
struct AssetIndexFile {
    objects: HashMap<String, AssetObject>,
}

#[derive(Debug, Deserialize)]
struct AssetObject {
    hash: String,
}

// ─── Installer ───

pub struct VersionInstaller {
    client: reqwest::Client,
    provider: Arc<dyn VersionProvider>,
    downloader: Downloader,
    asset_base_url: String,
    soft_timeout: Duration,
}

impl VersionInstaller {
    pub fn new(client: reqwest::Client, provider: Arc<dyn VersionProvider>) -> Self {
        Self {
            downloader: Downloader::new(client.clone()),
            client,
            provider,
            asset_base_url: ASSET_OBJECTS_URL.to_string(),
            soft_timeout: SOFT_TIMEOUT,
        }
    }

    /// Override the asset objects host (mirrors, tests).
    pub fn with_asset_base_url(mut self, base_url: &str) -> Self {
        self.asset_base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_soft_timeout(mut self, timeout: Duration) -> Self {
        self.soft_timeout = timeout;
        self
    }

    /// Install `version` into `game_dir` unless it is already present.
    ///
    /// Present means `versions/<v>/<v>.json` exists; in that case this
    /// returns immediately without touching the network. Otherwise the full
    /// plan (version JSON, client jar, libraries, natives, asset index and
    /// objects) is downloaded with bounded concurrency, non-critical failures
    /// are tolerated, and critical artifacts are verified at the end.
    pub async fn ensure_version_available(
        &self,
        version: &str,
        game_dir: &Path,
        events: Option<mpsc::UnboundedSender<DownloadEvent>>,
    ) -> LauncherResult<InstallReport> {
        if is_version_installed(game_dir, version) {
            info!("Version {} already installed, skipping download", version);
            return Ok(InstallReport {
                version: version.to_string(),
                status: DownloadStatus::Completed,
                library_files: count_files(&game_dir.join("libraries")),
                non_critical_errors: 0,
                already_installed: true,
            });
        }

        let mut task = DownloadTask::new(version, game_dir);
        task.advance(DownloadStatus::InProgress);
        emit(
            events.as_ref(),
            DownloadEvent::Started {
                version: version.to_string(),
            },
        );

        let outcome = tokio::time::timeout(
            self.soft_timeout,
            self.run_install(version, game_dir, &mut task, events.as_ref()),
        )
        .await;

        match outcome {
            Ok(Ok(library_files)) => {
                task.advance(DownloadStatus::Completed);
                emit(
                    events.as_ref(),
                    DownloadEvent::Completed {
                        version: version.to_string(),
                        non_critical_errors: task.non_critical_errors,
                    },
                );
                info!(
                    "Version {} installed ({} non-critical errors)",
                    version, task.non_critical_errors
                );
                Ok(InstallReport {
                    version: version.to_string(),
                    status: task.status(),
                    library_files,
                    non_critical_errors: task.non_critical_errors,
                    already_installed: false,
                })
            }
            Ok(Err(error)) => {
                task.advance(DownloadStatus::Failed);
                emit(
                    events.as_ref(),
                    DownloadEvent::Failed {
                        version: version.to_string(),
                        message: error.to_string(),
                    },
                );
                Err(error)
            }
            Err(_elapsed) => {
                task.advance(DownloadStatus::TimedOut);
                // The version JSON is written early; if it made it to disk
                // the install is recoverable and the launch path can repair
                // the rest, so report a soft success.
                let soft_success = is_version_installed(game_dir, version);
                emit(
                    events.as_ref(),
                    DownloadEvent::TimedOut {
                        version: version.to_string(),
                        soft_success,
                    },
                );
                if soft_success {
                    warn!("Install of {} timed out after version JSON landed", version);
                    Ok(InstallReport {
                        version: version.to_string(),
                        status: task.status(),
                        library_files: count_files(&game_dir.join("libraries")),
                        non_critical_errors: task.non_critical_errors,
                        already_installed: false,
                    })
                } else {
                    Err(LauncherError::DownloadTimeout)
                }
            }
        }
    }

    async fn run_install(
        &self,
        version: &str,
        game_dir: &Path,
        task: &mut DownloadTask,
        events: Option<&mpsc::UnboundedSender<DownloadEvent>>,
    ) -> LauncherResult<u64> {
        create_layout(game_dir)?;

        let entry = self
            .provider
            .find_version(version)
            .await?
            .ok_or_else(|| LauncherError::VersionNotFound(version.to_string()))?;
        let json_url = entry
            .url
            .ok_or_else(|| LauncherError::VersionNotFound(version.to_string()))?;

        let (version_json, raw_json) = VersionJson::fetch(&self.client, &json_url).await?;
        write_text(&version_json_path(game_dir, version), &raw_json)?;

        let mut throttle = ProgressThrottle::default();

        // Client jar first; it is a critical artifact.
        if let Some(client_artifact) = version_json
            .downloads
            .as_ref()
            .and_then(|downloads| downloads.client.clone())
        {
            let jar_entries = vec![DownloadEntry {
                url: client_artifact.url,
                dest: version_jar_path(game_dir, version),
                sha1: Some(client_artifact.sha1),
            }];
            self.drive_batch("client", jar_entries, task, &mut throttle, events)
                .await?;
        }

        let library_entries = plan_libraries(&version_json, game_dir);
        self.drive_batch("libraries", library_entries, task, &mut throttle, events)
            .await?;

        let asset_entries = self.plan_assets(&version_json, game_dir).await?;
        self.drive_batch("assets", asset_entries, task, &mut throttle, events)
            .await?;

        verify_critical_artifacts(game_dir, version, task.non_critical_errors)
    }

    /// Drive one group of downloads with bounded concurrency, classifying
    /// each failure as it arrives. Fatal failures abort the whole group.
    async fn drive_batch(
        &self,
        kind: &str,
        entries: Vec<DownloadEntry>,
        task: &mut DownloadTask,
        throttle: &mut ProgressThrottle,
        events: Option<&mpsc::UnboundedSender<DownloadEvent>>,
    ) -> LauncherResult<()> {
        let total = entries.len() as u64;
        task.record_progress(kind, 0, total);
        if total == 0 {
            return Ok(());
        }

        let downloader = &self.downloader;
        let mut stream = futures_util::stream::iter(entries.into_iter().map(|entry| async move {
            let result = downloader
                .download_file(&entry.url, &entry.dest, entry.sha1.as_deref())
                .await;
            (entry, result)
        }))
        .buffer_unordered(DOWNLOAD_CONCURRENCY);

        let mut completed = 0u64;
        while let Some((entry, result)) = stream.next().await {
            completed += 1;
            if let Err(error) = result {
                match classify_download_error(&error) {
                    ErrorSeverity::Fatal => {
                        warn!("Fatal download error for {}: {}", entry.url, error);
                        return Err(error);
                    }
                    ErrorSeverity::NonCritical => {
                        task.non_critical_errors += 1;
                        warn!(
                            "Non-critical download error ({} so far) for {}: {}",
                            task.non_critical_errors, entry.url, error
                        );
                        emit(
                            events,
                            DownloadEvent::NonCriticalError {
                                message: error.to_string(),
                                count: task.non_critical_errors,
                            },
                        );
                    }
                }
            }

            task.record_progress(kind, completed, total);
            if throttle.should_emit(kind, completed, total) {
                emit(
                    events,
                    DownloadEvent::Progress {
                        kind: kind.to_string(),
                        completed,
                        total,
                        percent: completed * 100 / total,
                    },
                );
            }
        }

        Ok(())
    }

    /// Fetch the asset index, persist it, and plan object downloads for
    /// anything not already on disk. Objects are stored by hash prefix.
    async fn plan_assets(
        &self,
        version_json: &VersionJson,
        game_dir: &Path,
    ) -> LauncherResult<Vec<DownloadEntry>> {
        let index_info = match &version_json.asset_index {
            Some(info) => info,
            None => return Ok(Vec::new()),
        };

        let response = check_status(self.client.get(&index_info.url).send().await?)?;
        let raw_index = response.text().await?;
        write_text(
            &game_dir
                .join("assets")
                .join("indexes")
                .join(format!("{}.json", index_info.id)),
            &raw_index,
        )?;

        let index: AssetIndexFile = serde_json::from_str(&raw_index)?;
        let objects_dir = game_dir.join("assets").join("objects");

        let mut entries = Vec::new();
        for object in index.objects.into_values() {
            let prefix = &object.hash[..2];
            let dest = objects_dir.join(prefix).join(&object.hash);
            if dest.is_file() {
                continue;
            }
            entries.push(DownloadEntry {
                url: format!("{}/{}/{}", self.asset_base_url, prefix, object.hash),
                dest,
                sha1: Some(object.hash),
            });
        }
        Ok(entries)
    }
}

/// Build download entries for OS-allowed library artifacts and the native
/// classifier jars the current platform needs.
fn plan_libraries(version_json: &VersionJson, game_dir: &Path) -> Vec<DownloadEntry> {
    let libraries_dir = game_dir.join("libraries");
    let mut entries = Vec::new();

    for library in &version_json.libraries {
        if !library.is_allowed_for_current_os() {
            continue;
        }
        let downloads = match &library.downloads {
            Some(downloads) => downloads,
            None => continue,
        };

        if let Some(artifact) = &downloads.artifact {
            entries.push(DownloadEntry {
                url: artifact.url.clone(),
                dest: libraries_dir.join(&artifact.path),
                sha1: Some(artifact.sha1.clone()),
            });
        }

        if let (Some(classifier), Some(classifiers)) = (
            library.native_classifier_for_current_os(),
            &downloads.classifiers,
        ) {
            if let Some(value) = classifiers.get(&classifier) {
                if let Ok(native) =
                    serde_json::from_value::<LibDownloadArtifact>(value.clone())
                {
                    entries.push(DownloadEntry {
                        url: native.url,
                        dest: libraries_dir.join(&native.path),
                        sha1: Some(native.sha1),
                    });
                }
            }
        }
    }

    entries
}

/// Confirm the artifacts a launch cannot proceed without: the version JSON,
/// the client jar, and at least one library on disk. Non-critical errors are
/// tolerated as long as these exist. Returns the library file count.
pub fn verify_critical_artifacts(
    game_dir: &Path,
    version: &str,
    non_critical_errors: u32,
) -> LauncherResult<u64> {
    if !version_json_path(game_dir, version).is_file() {
        return Err(LauncherError::IncompleteDownload(format!(
            "version JSON missing for {version}"
        )));
    }
    if !version_jar_path(game_dir, version).is_file() {
        return Err(LauncherError::IncompleteDownload(format!(
            "client jar missing for {version}"
        )));
    }
    let library_files = count_files(&game_dir.join("libraries"));
    if library_files == 0 {
        return Err(LauncherError::IncompleteDownload(
            "no libraries were downloaded".to_string(),
        ));
    }
    if non_critical_errors > 0 {
        warn!(
            "Install verified with {} non-critical errors",
            non_critical_errors
        );
    }
    Ok(library_files)
}

fn create_layout(game_dir: &Path) -> LauncherResult<()> {
    for dir in ["versions", "libraries", "assets"] {
        let path = game_dir.join(dir);
        std::fs::create_dir_all(&path).map_err(|e| LauncherError::Io { path, source: e })?;
    }
    Ok(())
}

fn write_text(path: &Path, contents: &str) -> LauncherResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| LauncherError::Io {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    std::fs::write(path, contents).map_err(|e| LauncherError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Recursive file count; used for library verification and reporting.
fn count_files(dir: &Path) -> u64 {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return 0,
    };
    let mut count = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            count += count_files(&path);
        } else {
            count += 1;
        }
    }
    count
}
