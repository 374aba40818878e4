// ─── Version File ───
// Parses a Mojang version JSON and evaluates OS rules for libraries. The
// installer consumes this to build its bulk download plan.

use serde::Deserialize;

use crate::core::error::LauncherResult;
use crate::core::http::check_status;

/// A parsed Mojang version JSON, reduced to what the installer and the
/// process spawner consume.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionJson {
    pub id: Option<String>,
    pub main_class: Option<String>,
    #[serde(default)]
    pub libraries: Vec<LibraryEntry>,
    pub downloads: Option<VersionDownloads>,
    #[serde(default)]
    pub asset_index: Option<AssetIndexInfo>,
    #[serde(default)]
    pub java_version: Option<JavaVersionInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JavaVersionInfo {
    pub major_version: u32,
}

#[derive(Debug, Deserialize)]
pub struct VersionDownloads {
    pub client: Option<DownloadArtifact>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DownloadArtifact {
    pub sha1: String,
    pub size: u64,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetIndexInfo {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub sha1: Option<String>,
}

// ─── Library Entry with Rules ───

#[derive(Debug, Deserialize)]
pub struct LibraryEntry {
    pub name: String,
    #[serde(default)]
    pub downloads: Option<LibraryDownloads>,
    #[serde(default)]
    pub rules: Option<Vec<LibraryRule>>,
    #[serde(default)]
    pub natives: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct LibraryDownloads {
    pub artifact: Option<LibDownloadArtifact>,
    #[serde(default)]
    pub classifiers: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
pub struct LibDownloadArtifact {
    pub path: String,
    pub sha1: String,
    #[serde(default)]
    pub size: u64,
    pub url: String,
}

// ─── OS Rule Evaluation ───

#[derive(Debug, Deserialize)]
pub struct LibraryRule {
    pub action: RuleAction,
    #[serde(default)]
    pub os: Option<OsRule>,
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Allow,
    Disallow,
}

#[derive(Debug, Deserialize)]
pub struct OsRule {
    #[serde(default)]
    pub name: Option<String>,
}

impl LibraryEntry {
    /// Evaluate whether this library should be included for the current OS.
    ///
    /// Mojang rule semantics:
    /// - If no rules → allowed.
    /// - Process rules top-to-bottom. Start with "disallowed".
    /// - Each rule sets allow/disallow when the OS matches (or no OS given).
    pub fn is_allowed_for_current_os(&self) -> bool {
        let rules = match &self.rules {
            Some(rules) => rules,
            None => return true,
        };

        let current_os = current_os_name();
        let mut allowed = false;

        for rule in rules {
            let os_matches = match &rule.os {
                None => true,
                Some(os) => match &os.name {
                    None => true,
                    Some(name) => name == current_os,
                },
            };

            if os_matches {
                allowed = rule.action == RuleAction::Allow;
            }
        }

        allowed
    }

    /// Native classifier key for the current OS, with `${arch}` resolved.
    pub fn native_classifier_for_current_os(&self) -> Option<String> {
        let natives = self.natives.as_ref()?;
        let os = current_os_name();
        natives.as_object()?.get(os)?.as_str().map(|classifier| {
            let arch = if cfg!(target_arch = "x86_64") {
                "64"
            } else {
                "32"
            };
            classifier.replace("${arch}", arch)
        })
    }
}

/// Get the Mojang OS name for the current platform.
pub fn current_os_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "windows"
    } else if cfg!(target_os = "macos") {
        "osx"
    } else {
        "linux"
    }
}

impl VersionJson {
    /// Fetch and parse a version JSON, returning both the model and the raw
    /// text (the raw text is what gets written to `versions/<v>/<v>.json`).
    pub async fn fetch(client: &reqwest::Client, url: &str) -> LauncherResult<(Self, String)> {
        let response = check_status(client.get(url).send().await?)?;
        let raw = response.text().await?;
        let version_json: VersionJson = serde_json::from_str(&raw)?;
        Ok((version_json, raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_rules_means_allowed() {
        let lib = LibraryEntry {
            name: "test:lib:1.0".into(),
            downloads: None,
            rules: None,
            natives: None,
        };
        assert!(lib.is_allowed_for_current_os());
    }

    #[test]
    fn disallow_current_os() {
        let lib = LibraryEntry {
            name: "test:lib:1.0".into(),
            downloads: None,
            rules: Some(vec![
                LibraryRule {
                    action: RuleAction::Allow,
                    os: None,
                },
                LibraryRule {
                    action: RuleAction::Disallow,
                    os: Some(OsRule {
                        name: Some(current_os_name().to_string()),
                    }),
                },
            ]),
            natives: None,
        };
        assert!(!lib.is_allowed_for_current_os());
    }

    #[test]
    fn allow_only_other_os() {
        let other = if cfg!(target_os = "windows") {
            "linux"
        } else {
            "windows"
        };
        let lib = LibraryEntry {
            name: "test:lib:1.0".into(),
            downloads: None,
            rules: Some(vec![LibraryRule {
                action: RuleAction::Allow,
                os: Some(OsRule {
                    name: Some(other.into()),
                }),
            }]),
            natives: None,
        };
        assert!(!lib.is_allowed_for_current_os());
    }

    #[test]
    fn deserialize_minimal_version_json() {
        let parsed: VersionJson = serde_json::from_value(serde_json::json!({
            "id": "1.21.4",
            "mainClass": "net.minecraft.client.main.Main",
            "downloads": {
                "client": { "sha1": "abc", "size": 1, "url": "https://meta/client.jar" }
            },
            "assetIndex": { "id": "17", "url": "https://meta/17.json" },
            "javaVersion": { "majorVersion": 21 },
            "libraries": [
                { "name": "a:b:1.0", "downloads": { "artifact": {
                    "path": "a/b/1.0/b-1.0.jar", "sha1": "def", "size": 2, "url": "https://libs/b.jar"
                }}}
            ]
        }))
        .unwrap();

        assert_eq!(parsed.id.as_deref(), Some("1.21.4"));
        assert_eq!(parsed.java_version.unwrap().major_version, 21);
        assert_eq!(parsed.libraries.len(), 1);
        assert!(parsed.downloads.unwrap().client.is_some());
    }
}
