// ─── Core ───
// Launcher backend, split by concern:
//
// - `error`      central error type and result alias
// - `http`       shared client construction and the retry driver
// - `auth`       session model, token store, Microsoft OAuth chain
// - `version`    manifest providers, version parsing, version JSON model
// - `downloader` SHA-1 validated downloads and the version installer
// - `java`       Java requirement mapping and binary probing
// - `launch`     gate orchestration, request assembly, JVM spawning
// - `state`      persisted settings and the shared context

pub mod auth;
pub mod downloader;
pub mod error;
pub mod http;
pub mod java;
pub mod launch;
pub mod state;
pub mod version;
