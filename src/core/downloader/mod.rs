pub mod client;
pub mod installer;

pub use client::{DownloadEntry, Downloader};
pub use installer::{
    is_version_installed, version_jar_path, version_json_path, DownloadEvent, DownloadStatus,
    InstallReport, VersionInstaller,
};
