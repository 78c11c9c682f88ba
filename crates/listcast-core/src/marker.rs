//! Marker-line parsing.
//!
//! The pipeline reports structured results by printing lines of the form
//! `::KEY::value` on stdout. Everything else on stdout is plain log text.

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Marker carrying the path of the rendered video.
pub const OUTPUT_KEY: &str = "OUTPUT";
/// Marker carrying the public URL of the uploaded video.
pub const EXTERNAL_URL_KEY: &str = "S3_URL";

static MARKER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^::([A-Za-z0-9_]+)::(.*)$").unwrap());

/// Parse a single line into `(key, value)`.
///
/// The value is the rest of the line with surrounding whitespace trimmed.
/// Lines with an empty value are not markers.
pub fn parse_marker(line: &str) -> Option<(&str, &str)> {
    let line = line.trim_end_matches(['\r', '\n']);
    let caps = MARKER_REGEX.captures(line)?;
    let key = caps.get(1)?.as_str();
    let value = caps.get(2)?.as_str().trim();
    if value.is_empty() {
        return None;
    }
    Some((key, value))
}

/// Markers seen so far; later values for a key replace earlier ones.
#[derive(Debug, Clone, Default)]
pub struct Markers {
    values: HashMap<String, String>,
}

impl Markers {
    /// Record `line` if it is a marker. Returns whether it was one.
    pub fn observe(&mut self, line: &str) -> bool {
        match parse_marker(line) {
            Some((key, value)) => {
                self.values.insert(key.to_string(), value.to_string());
                true
            }
            None => false,
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
