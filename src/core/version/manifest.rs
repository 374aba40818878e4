// ─── Version Manifest ───
// Fetches the Mojang version manifest and resolves version entries. Live
// access sits behind the `VersionProvider` trait together with a static
// fallback provider, so callers (and tests) never branch on degraded mode.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::core::error::LauncherResult;
use crate::core::http::{check_status, with_retry, RetryPolicy};

const VERSION_MANIFEST_URL: &str =
    "https://launchermeta.mojang.com/mc/game/version_manifest.json";
const MANIFEST_CACHE_DURATION: Duration = Duration::from_secs(5 * 60);
/// The manifest is larger than the API payloads the shared client is tuned
/// for, so it gets a longer per-request timeout.
const MANIFEST_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
/// Release listing shown to the UI is capped to the most recent entries.
const RELEASE_LIST_LIMIT: usize = 30;

/// Top-level Mojang version manifest.
#[derive(Debug, Deserialize)]
pub struct VersionManifest {
    pub versions: Vec<VersionEntry>,
}

/// A single entry in the manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub version_type: String,
    #[serde(rename = "releaseTime", default)]
    pub release_time: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl VersionEntry {
    fn release(id: &str, release_time: &str) -> Self {
        Self {
            id: id.into(),
            version_type: "release".into(),
            release_time: Some(release_time.into()),
            url: None,
        }
    }
}

/// Source of available game versions. Implemented by the live manifest
/// fetch and by the static fallback list.
#[async_trait]
pub trait VersionProvider: Send + Sync {
    async fn available_versions(&self) -> LauncherResult<Vec<VersionEntry>>;

    async fn find_version(&self, id: &str) -> LauncherResult<Option<VersionEntry>> {
        Ok(self
            .available_versions()
            .await?
            .into_iter()
            .find(|entry| entry.id == id))
    }
}

// ── Live provider ───────────────────────────────────────

/// Fetches the Mojang manifest with retry and keeps it in memory for five
/// minutes.
pub struct MojangVersionProvider {
    client: reqwest::Client,
    manifest_url: String,
    cache: Mutex<Option<(Instant, Vec<VersionEntry>)>>,
}

impl MojangVersionProvider {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_url(client, VERSION_MANIFEST_URL)
    }

    pub fn with_url(client: reqwest::Client, manifest_url: &str) -> Self {
        Self {
            client,
            manifest_url: manifest_url.into(),
            cache: Mutex::new(None),
        }
    }

    async fn fetch_manifest(&self) -> LauncherResult<VersionManifest> {
        info!("Fetching Minecraft version manifest...");
        let policy = RetryPolicy::linear(3, Duration::from_secs(2));

        with_retry("version manifest", policy, || async move {
            let response = self
                .client
                .get(&self.manifest_url)
                .timeout(MANIFEST_REQUEST_TIMEOUT)
                .send()
                .await?;
            let manifest: VersionManifest = check_status(response)?.json().await?;
            Ok(manifest)
        })
        .await
    }
}

#[async_trait]
impl VersionProvider for MojangVersionProvider {
    async fn available_versions(&self) -> LauncherResult<Vec<VersionEntry>> {
        let mut cache = self.cache.lock().await;
        if let Some((fetched_at, entries)) = cache.as_ref() {
            if fetched_at.elapsed() < MANIFEST_CACHE_DURATION {
                return Ok(entries.clone());
            }
        }

        let manifest = self.fetch_manifest().await?;
        let releases: Vec<VersionEntry> = manifest
            .versions
            .into_iter()
            .filter(|entry| entry.version_type == "release")
            .take(RELEASE_LIST_LIMIT)
            .collect();

        info!("Loaded {} release versions from manifest", releases.len());
        *cache = Some((Instant::now(), releases.clone()));
        Ok(releases)
    }
}

// ── Static fallback provider ────────────────────────────

/// Degraded-mode version source used when the live manifest is unreachable.
/// The list only has to cover versions users realistically pick offline.
pub struct StaticVersionProvider;

#[async_trait]
impl VersionProvider for StaticVersionProvider {
    async fn available_versions(&self) -> LauncherResult<Vec<VersionEntry>> {
        Ok(vec![
            VersionEntry::release("1.21.4", "2024-09-10T08:00:00Z"),
            VersionEntry::release("1.21.3", "2024-08-06T08:00:00Z"),
            VersionEntry::release("1.21.1", "2024-07-10T08:00:00Z"),
            VersionEntry::release("1.21", "2024-06-13T08:00:00Z"),
            VersionEntry::release("1.20.6", "2024-05-30T08:00:00Z"),
            VersionEntry::release("1.20.4", "2023-12-07T08:00:00Z"),
            VersionEntry::release("1.20.1", "2023-06-13T08:00:00Z"),
            VersionEntry::release("1.20", "2023-06-06T08:00:00Z"),
            VersionEntry::release("1.19.4", "2023-03-14T08:00:00Z"),
            VersionEntry::release("1.19.2", "2022-08-05T08:00:00Z"),
            VersionEntry::release("1.18.2", "2022-02-28T08:00:00Z"),
            VersionEntry::release("1.17.1", "2021-07-27T08:00:00Z"),
            VersionEntry::release("1.16.5", "2021-01-15T08:00:00Z"),
            VersionEntry::release("1.12.2", "2017-09-18T08:00:00Z"),
            VersionEntry::release("1.8.9", "2015-12-08T08:00:00Z"),
        ])
    }
}

// ── Degraded-mode composition ───────────────────────────

/// Tries the live provider first and falls back to the static list. The
/// fallback is explicit here so the resolver itself stays branch-free.
pub struct ResilientVersionProvider<P: VersionProvider, F: VersionProvider> {
    primary: P,
    fallback: F,
}

impl<P: VersionProvider, F: VersionProvider> ResilientVersionProvider<P, F> {
    pub fn new(primary: P, fallback: F) -> Self {
        Self { primary, fallback }
    }
}

impl ResilientVersionProvider<MojangVersionProvider, StaticVersionProvider> {
    pub fn live(client: reqwest::Client) -> Self {
        Self::new(MojangVersionProvider::new(client), StaticVersionProvider)
    }
}

#[async_trait]
impl<P: VersionProvider, F: VersionProvider> VersionProvider for ResilientVersionProvider<P, F> {
    async fn available_versions(&self) -> LauncherResult<Vec<VersionEntry>> {
        match self.primary.available_versions().await {
            Ok(entries) => Ok(entries),
            Err(error) => {
                warn!("Live manifest unavailable ({}), using fallback list", error);
                self.fallback.available_versions().await
            }
        }
    }
}
