//! Parser and renderer for systemd unit-style INI text.
//!
//! Rendering refuses anything the parser would read back differently, so a
//! rendered file always parses into the sections it was written from.
use std::path::Path;

use crate::error::ParseError;

/// A raw section from a systemd unit-style INI file.
///
/// Section names are case-sensitive and may repeat within one file; entries
/// keep their source order and may repeat keys.
///
/// # Examples
///
/// ```
/// use networkd_manager::config::ini::RawSection;
///
/// let section = RawSection {
///     name: "Network".to_string(),
///     entries: vec![
///         ("DNS".to_string(), "1.1.1.1".to_string()),
///         ("DNS".to_string(), "9.9.9.9".to_string()),
///     ],
/// };
/// assert_eq!(section.values("DNS"), ["1.1.1.1", "9.9.9.9"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSection {
    /// The section name without brackets (e.g. `"Network"`).
    pub name: String,
    /// Key-value entries in source order.
    pub entries: Vec<(String, String)>,
}

impl RawSection {
    /// Create an empty section.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    /// All values recorded for `key`, in source order.
    #[must_use]
    pub fn values(&self, key: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Distinct keys in order of first appearance, each with its values.
    #[must_use]
    pub fn grouped(&self) -> Vec<(&str, Vec<&str>)> {
        let mut groups: Vec<(&str, Vec<&str>)> = Vec::new();
        for (key, value) in &self.entries {
            match groups.iter_mut().find(|(k, _)| *k == key.as_str()) {
                Some((_, values)) => values.push(value.as_str()),
                None => groups.push((key.as_str(), vec![value.as_str()])),
            }
        }
        groups
    }
}

/// Parse an INI file from disk into raw sections.
///
/// # Errors
///
/// Returns [`ParseError::Io`] if the file cannot be read, or any structural
/// error reported by [`parse_sections_from_str`].
pub fn parse_sections(path: &Path) -> Result<Vec<RawSection>, ParseError> {
    let content = std::fs::read_to_string(path).map_err(|source| ParseError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_sections_from_str(&content)
}

/// Parse systemd unit-style INI content.
///
/// Format:
/// ```ini
/// [Match]
/// Name = eth0
///
/// # comment
/// [Network]
/// DNS = 1.1.1.1
/// DNS = 9.9.9.9
/// ```
///
/// Lines starting with `#` or `;` are comments. A line ending in `\` is
/// joined with the following line. Values are kept verbatim (trimmed);
/// inline `#` is part of the value.
///
/// # Examples
///
/// ```
/// use networkd_manager::config::ini::parse_sections_from_str;
///
/// let sections = parse_sections_from_str("[Address]\nAddress=10.0.0.1/24\n[Address]\nAddress=10.0.1.1/24\n").unwrap();
/// assert_eq!(sections.len(), 2);
/// assert_eq!(sections[1].entries[0].1, "10.0.1.1/24");
/// ```
///
/// # Errors
///
/// Returns an error if:
/// - A header is unterminated or empty
/// - A key-value line has no `=`
/// - An entry appears outside of a section header
pub fn parse_sections_from_str(content: &str) -> Result<Vec<RawSection>, ParseError> {
    let mut sections = Vec::new();
    let mut current: Option<RawSection> = None;

    for (line, text) in logical_lines(content) {
        let trimmed = text.trim();

        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
            continue;
        }

        if trimmed.starts_with('[') {
            let name = parse_header(trimmed, line)?;
            if let Some(section) = current.take() {
                sections.push(section);
            }
            current = Some(RawSection::new(name));
        } else if let Some(ref mut section) = current {
            let (key, value) =
                trimmed
                    .split_once('=')
                    .ok_or_else(|| ParseError::MissingSeparator {
                        line,
                        text: trimmed.to_string(),
                    })?;
            section
                .entries
                .push((key.trim().to_string(), value.trim().to_string()));
        } else {
            return Err(ParseError::EntryOutsideSection {
                line,
                text: trimmed.to_string(),
            });
        }
    }

    if let Some(section) = current {
        sections.push(section);
    }

    Ok(sections)
}

/// Render raw sections as INI text: one `[Name]` block per section, blocks
/// separated by a blank line, `Key = Value` per entry.
///
/// # Errors
///
/// Returns [`ParseError::Unrenderable`] for a section name or key that is
/// empty, padded, or contains control characters or brackets; a key that
/// contains `=` or starts a comment; or a value containing a line break or
/// ending in a backslash.
pub fn render_sections(sections: &[RawSection]) -> Result<String, ParseError> {
    let mut out = String::new();
    for (i, section) in sections.iter().enumerate() {
        check_name(&section.name, &section.name)?;
        if i > 0 {
            out.push('\n');
        }
        out.push('[');
        out.push_str(&section.name);
        out.push_str("]\n");
        for (key, value) in &section.entries {
            check_name(&section.name, key)?;
            if key.contains('=') || key.starts_with('#') || key.starts_with(';') {
                return Err(unrenderable(&section.name, key, "not a valid key"));
            }
            check_value(&section.name, value)?;
            out.push_str(key);
            out.push_str(" = ");
            out.push_str(value);
            out.push('\n');
        }
    }
    Ok(out)
}

fn unrenderable(section: &str, text: &str, reason: &'static str) -> ParseError {
    ParseError::Unrenderable {
        section: section.to_string(),
        text: text.to_string(),
        reason,
    }
}

/// Section names and keys: non-empty, unpadded, single-line, bracket-free.
fn check_name(section: &str, name: &str) -> Result<(), ParseError> {
    if name.is_empty() || name.trim() != name {
        return Err(unrenderable(section, name, "empty or padded name"));
    }
    if name.chars().any(|c| c.is_control() || c == '[' || c == ']') {
        return Err(unrenderable(section, name, "control character or bracket in name"));
    }
    Ok(())
}

fn check_value(section: &str, value: &str) -> Result<(), ParseError> {
    if value.contains(['\n', '\r']) {
        return Err(unrenderable(section, value, "line break in value"));
    }
    if value.trim_end().ends_with('\\') {
        return Err(unrenderable(section, value, "trailing backslash continues the line"));
    }
    Ok(())
}

/// Parse a `[Name]` header line.
fn parse_header(line: &str, line_num: usize) -> Result<String, ParseError> {
    let inner = line
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .ok_or_else(|| ParseError::UnterminatedHeader {
            line: line_num,
            text: line.to_string(),
        })?;
    let name = inner.trim();
    if name.is_empty() {
        return Err(ParseError::EmptyHeader { line: line_num });
    }
    Ok(name.to_string())
}

/// Join backslash-continued lines, yielding each logical line with the
/// 1-based number of its first physical line.
fn logical_lines(content: &str) -> Vec<(usize, String)> {
    let mut out = Vec::new();
    let mut pending: Option<(usize, String)> = None;

    for (idx, raw) in content.lines().enumerate() {
        let (start, mut text) = match pending.take() {
            Some((start, mut acc)) => {
                acc.push(' ');
                acc.push_str(raw.trim_start());
                (start, acc)
            }
            None => (idx + 1, raw.to_string()),
        };
        let is_comment = {
            let t = text.trim_start();
            t.starts_with('#') || t.starts_with(';')
        };
        if !is_comment && text.trim_end().ends_with('\\') {
            let keep = text.trim_end().len() - 1;
            text.truncate(keep);
            pending = Some((start, text.trim_end().to_string()));
        } else {
            out.push((start, text));
        }
    }
    if let Some(last) = pending {
        out.push(last);
    }
    out
}
