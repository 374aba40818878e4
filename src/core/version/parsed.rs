// ─── Parsed Version ───
// Single value type for Minecraft version comparison. Every place that used
// to re-parse version strings (launcher, installer, Java gate) goes through
// this instead.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Up to three numeric components of a Minecraft version id. Ordering is
/// numeric per component, so "1.10" > "1.9" and "1.9" > "1.8.9".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParsedVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ParsedVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Extract the first `major.minor[.patch]` group from a version id.
    /// Suffixes ("1.8.9-forge") are ignored; unparseable input is 0.0.0.
    pub fn parse(raw: &str) -> Self {
        let mut components = [0u32; 3];
        let mut index = 0;
        let mut current: Option<u32> = None;
        let mut started = false;

        for ch in raw.chars() {
            if let Some(digit) = ch.to_digit(10) {
                started = true;
                current = Some(current.unwrap_or(0).saturating_mul(10) + digit);
            } else if started {
                if let Some(value) = current.take() {
                    components[index] = value;
                    index += 1;
                }
                if ch != '.' || index == 3 {
                    break;
                }
            }
        }
        if let Some(value) = current {
            if index < 3 {
                components[index] = value;
            }
        }

        Self {
            major: components[0],
            minor: components[1],
            patch: components[2],
        }
    }

    pub fn is_at_least(&self, other: ParsedVersion) -> bool {
        *self >= other
    }
}

impl fmt::Display for ParsedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}
