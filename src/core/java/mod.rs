// ─── Java Compatibility ───
// Maps a Minecraft version to the Java major it needs and probes installed
// Java binaries. Detection prefers the JDK `release` file next to the binary
// and falls back to running `java -version`.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::version::ParsedVersion;

/// Java major required to run a Minecraft version.
///
/// 1.20+ needs Java 21, 1.18+ needs Java 17, everything older runs on 8.
pub fn required_java_major(version: &ParsedVersion) -> u32 {
    if version.major > 1 || version.minor >= 20 {
        21
    } else if version.minor >= 18 {
        17
    } else {
        8
    }
}

/// Parse a Java version string into its major number.
///
/// Legacy strings use the `1.major` scheme: "1.8.0_312" is Java 8. Modern
/// strings lead with the major: "17.0.3" is 17, "21" is 21.
pub fn parse_java_version_str(version: &str) -> Option<u32> {
    let mut parts = version.trim().split(['.', '_', '-', '+']);
    let first: u32 = parts.next()?.parse().ok()?;
    if first == 1 {
        parts.next()?.parse().ok()
    } else {
        Some(first)
    }
}

/// Detect the major version of the Java installation at `java_bin`.
///
/// Reads `JAVA_VERSION=` from the JDK `release` file two levels up from the
/// binary (`<root>/bin/java`), then falls back to executing the binary.
/// `None` means the install could not be probed at all.
pub fn detect_java_major(java_bin: &Path) -> Option<u32> {
    if let Some(major) = read_release_file(java_bin) {
        return Some(major);
    }
    probe_java_binary(java_bin)
}

fn read_release_file(java_bin: &Path) -> Option<u32> {
    let release_path = java_bin.parent()?.parent()?.join("release");
    let contents = std::fs::read_to_string(release_path).ok()?;

    for line in contents.lines() {
        if let Some(value) = line.strip_prefix("JAVA_VERSION=") {
            let version = value.trim().trim_matches('"');
            return parse_java_version_str(version);
        }
    }
    None
}

fn probe_java_binary(java_bin: &Path) -> Option<u32> {
    let output = Command::new(java_bin).arg("-version").output().ok()?;

    // `java -version` writes to stderr; some distributions use stdout.
    let combined = format!(
        "{}\n{}",
        String::from_utf8_lossy(&output.stderr),
        String::from_utf8_lossy(&output.stdout)
    );
    debug!(
        "Probing {:?}: {}",
        java_bin,
        combined.lines().next().unwrap_or("")
    );

    let quoted = combined.lines().find_map(|line| {
        let start = line.find('"')?;
        let end = line[start + 1..].find('"')?;
        Some(line[start + 1..start + 1 + end].to_string())
    })?;
    parse_java_version_str(&quoted)
}

/// Gate a launch on Java compatibility.
///
/// An undetectable Java is allowed through (the JVM itself will complain if
/// it truly cannot run the game); a detected-but-older Java is rejected.
pub fn check_java_compatibility(java_bin: &Path, version: &ParsedVersion) -> LauncherResult<()> {
    let required = required_java_major(version);
    match detect_java_major(java_bin) {
        Some(detected) if detected < required => {
            Err(LauncherError::JavaIncompatible { required, detected })
        }
        Some(detected) => {
            debug!("Java {} satisfies requirement {}", detected, required);
            Ok(())
        }
        None => {
            debug!("Could not detect Java version at {:?}, proceeding", java_bin);
            Ok(())
        }
    }
}

/// Swap a `java` binary path for its windowless `javaw` sibling on Windows.
/// Paths that already point elsewhere are returned untouched.
pub fn windowless_java_binary(java_bin: &Path) -> PathBuf {
    if !cfg!(windows) {
        return java_bin.to_path_buf();
    }
    match java_bin.file_name().and_then(|name| name.to_str()) {
        Some("java.exe") => java_bin.with_file_name("javaw.exe"),
        Some("java") => java_bin.with_file_name("javaw"),
        _ => java_bin.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn java_requirement_per_minecraft_version() {
        assert_eq!(required_java_major(&ParsedVersion::parse("1.8.9")), 8);
        assert_eq!(required_java_major(&ParsedVersion::parse("1.16.5")), 8);
        assert_eq!(required_java_major(&ParsedVersion::parse("1.17.1")), 8);
        assert_eq!(required_java_major(&ParsedVersion::parse("1.18.2")), 17);
        assert_eq!(required_java_major(&ParsedVersion::parse("1.19.4")), 17);
        assert_eq!(required_java_major(&ParsedVersion::parse("1.20")), 21);
        assert_eq!(required_java_major(&ParsedVersion::parse("1.21.4")), 21);
        assert_eq!(required_java_major(&ParsedVersion::parse("2.0")), 21);
    }

    #[test]
    fn requirement_is_monotonic_in_game_version() {
        let ordered = ["1.8.9", "1.12.2", "1.16.5", "1.18.2", "1.20.1", "1.21.4"];
        let majors: Vec<u32> = ordered
            .iter()
            .map(|id| required_java_major(&ParsedVersion::parse(id)))
            .collect();
        assert!(majors.windows(2).all(|pair| pair[0] <= pair[1]));
        assert!(majors.iter().all(|m| [8, 17, 21].contains(m)));
    }

    #[test]
    fn parses_legacy_and_modern_version_strings() {
        assert_eq!(parse_java_version_str("1.8.0_312"), Some(8));
        assert_eq!(parse_java_version_str("17.0.3"), Some(17));
        assert_eq!(parse_java_version_str("21"), Some(21));
        assert_eq!(parse_java_version_str("21.0.2+13"), Some(21));
        assert_eq!(parse_java_version_str("garbage"), None);
    }

    #[test]
    fn reads_major_from_jdk_release_file() {
        let dir = tempfile::tempdir().unwrap();
        let bin_dir = dir.path().join("bin");
        std::fs::create_dir_all(&bin_dir).unwrap();
        let java_bin = bin_dir.join("java");
        std::fs::write(&java_bin, "").unwrap();
        std::fs::write(
            dir.path().join("release"),
            "IMPLEMENTOR=\"Eclipse Adoptium\"\nJAVA_VERSION=\"17.0.10\"\n",
        )
        .unwrap();

        assert_eq!(read_release_file(&java_bin), Some(17));
        assert_eq!(detect_java_major(&java_bin), Some(17));
    }

    #[test]
    fn incompatible_java_is_rejected_and_unknown_passes() {
        let dir = tempfile::tempdir().unwrap();
        let bin_dir = dir.path().join("bin");
        std::fs::create_dir_all(&bin_dir).unwrap();
        let java_bin = bin_dir.join("java");
        std::fs::write(&java_bin, "").unwrap();
        std::fs::write(dir.path().join("release"), "JAVA_VERSION=\"1.8.0_392\"\n").unwrap();

        let result = check_java_compatibility(&java_bin, &ParsedVersion::parse("1.21.4"));
        assert!(matches!(
            result,
            Err(LauncherError::JavaIncompatible {
                required: 21,
                detected: 8
            })
        ));

        // Same binary is fine for an old version.
        check_java_compatibility(&java_bin, &ParsedVersion::parse("1.12.2")).unwrap();

        // A binary that cannot be probed at all is allowed through.
        let unknown = dir.path().join("bin").join("not-java");
        check_java_compatibility(&unknown, &ParsedVersion::parse("1.21.4")).unwrap();
    }

    #[test]
    fn windowless_swap_only_touches_java_binaries() {
        let swapped = windowless_java_binary(Path::new("C:/jdk/bin/java.exe"));
        if cfg!(windows) {
            assert!(swapped.ends_with("javaw.exe"));
        } else {
            assert!(swapped.ends_with("java.exe"));
        }
        let other = windowless_java_binary(Path::new("/usr/bin/env"));
        assert!(other.ends_with("env"));
    }
}
