// ─── Game Process ───
// Turns a launch request into a JVM invocation and forwards the process
// lifecycle as events.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::core::downloader::{version_jar_path, version_json_path};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::java::windowless_java_binary;
use crate::core::launch::orchestrator::{GameProcessHandle, GameSpawner, ProcessEvent};
use crate::core::launch::request::LaunchRequest;
use crate::core::version::VersionJson;

const DEFAULT_MAIN_CLASS: &str = "net.minecraft.client.main.Main";
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Spawns the real JVM. Classpath comes from the installed version jar plus
/// everything under `libraries/`; the main class from the version JSON.
pub struct SystemGameSpawner;

#[async_trait]
impl GameSpawner for SystemGameSpawner {
    async fn spawn(&self, request: &LaunchRequest) -> LauncherResult<GameProcessHandle> {
        let main_class = read_main_class(&request.game_dir, &request.version)?;
        let classpath = build_classpath(&request.game_dir, &request.version);
        let java_bin = windowless_java_binary(&request.java_bin);

        let mut command = Command::new(&java_bin);
        command
            .args(request.jvm_memory_args())
            .arg("-cp")
            .arg(&classpath)
            .arg(&main_class)
            .args(request.game_arguments())
            .current_dir(&request.game_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(false);

        #[cfg(windows)]
        {
            // CREATE_NO_WINDOW, paired with the javaw substitution.
            command.creation_flags(0x0800_0000);
        }

        info!(
            "Spawning {} with main class {}",
            java_bin.display(),
            main_class
        );
        let mut child = command.spawn().map_err(|e| {
            LauncherError::JavaExecution(format!("failed to start {}: {e}", java_bin.display()))
        })?;

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        if let Some(stdout) = child.stdout.take() {
            forward_lines(stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(stderr, tx.clone());
        }

        tokio::spawn(async move {
            let event = match child.wait().await {
                Ok(status) => ProcessEvent::Closed(status.code()),
                Err(error) => ProcessEvent::Errored(error.to_string()),
            };
            let _ = tx.send(event).await;
        });

        Ok(GameProcessHandle { events: rx })
    }
}

fn forward_lines<R>(reader: R, tx: mpsc::Sender<ProcessEvent>)
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(ProcessEvent::Log(line)).await.is_err() {
                break;
            }
        }
    });
}

fn read_main_class(game_dir: &Path, version: &str) -> LauncherResult<String> {
    let path = version_json_path(game_dir, version);
    let raw = std::fs::read_to_string(&path).map_err(|source| LauncherError::Io {
        path: path.clone(),
        source,
    })?;
    let version_json: VersionJson = serde_json::from_str(&raw)?;
    Ok(version_json
        .main_class
        .unwrap_or_else(|| DEFAULT_MAIN_CLASS.to_string()))
}

/// Version jar first, then every jar under `libraries/`. Separator is `;`
/// on Windows, `:` elsewhere.
fn build_classpath(game_dir: &Path, version: &str) -> String {
    let separator = if cfg!(windows) { ";" } else { ":" };
    let mut entries = vec![version_jar_path(game_dir, version)];
    collect_jars(&game_dir.join("libraries"), &mut entries);

    entries
        .iter()
        .map(|path| path.to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join(separator)
}

fn collect_jars(dir: &Path, out: &mut Vec<PathBuf>) {
    let mut jars = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(current) = stack.pop() {
        let entries = match std::fs::read_dir(&current) {
            Ok(entries) => entries,
            Err(_) => continue,
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("jar"))
            {
                debug!("Classpath entry: {:?}", path);
                jars.push(path);
            }
        }
    }
    jars.sort();
    out.extend(jars);
}
