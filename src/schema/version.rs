//! Maps a detected systemd version to the best-fit schema generation.
use std::collections::BTreeSet;

/// Generation assumed when nothing better is known.
pub const DEFAULT_SCHEMA_VERSION: u32 = 257;

/// Leading integer of a version string.
///
/// Optional whitespace and a `v`/`V` prefix are skipped; anything after the
/// digit run is ignored.
///
/// # Examples
///
/// ```
/// use networkd_manager::schema::parse_version;
///
/// assert_eq!(parse_version("257-rc2"), Some(257));
/// assert_eq!(parse_version(" v256"), Some(256));
/// assert_eq!(parse_version("unknown"), None);
/// ```
#[must_use]
pub fn parse_version(detected: &str) -> Option<u32> {
    let trimmed = detected.trim_start();
    let rest = trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed);
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    rest.get(..end).and_then(|digits| digits.parse().ok())
}

/// Pick the generation for `detected` from `available`, defaulting to
/// [`DEFAULT_SCHEMA_VERSION`].
#[must_use]
pub fn resolve_version(detected: &str, available: &BTreeSet<u32>) -> u32 {
    resolve_version_with_default(detected, available, DEFAULT_SCHEMA_VERSION)
}

/// Pick the generation for `detected` from `available`.
///
/// Unparsable input means `default`. With no generations available the
/// result is `default`; below the oldest it is the oldest; above the newest
/// it is the newest; otherwise the greatest generation not newer than the
/// detected version.
#[must_use]
pub fn resolve_version_with_default(detected: &str, available: &BTreeSet<u32>, default: u32) -> u32 {
    let target = parse_version(detected).unwrap_or(default);
    let (Some(&oldest), Some(&newest)) = (available.first(), available.last()) else {
        return default;
    };
    if target <= oldest {
        return oldest;
    }
    if target >= newest {
        return newest;
    }
    available.range(..=target).next_back().copied().unwrap_or(oldest)
}

/// Extract the version number from `networkctl --version` output, e.g.
/// `systemd 257 (257.1-1-arch)`.
#[must_use]
pub fn parse_networkctl_version(output: &str) -> Option<u32> {
    output
        .lines()
        .filter_map(|line| line.trim().strip_prefix("systemd "))
        .find_map(parse_version)
}
