use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::debug;

/// Opening marker of a user-script header block.
pub const HEADER_OPEN: &str = "==UserScript==";
/// Closing marker of a user-script header block.
pub const HEADER_CLOSE: &str = "==/UserScript==";

/// Tag grammar: everything after the last `@` up to the first run of
/// whitespace is the tag name, the trimmed remainder is the value.
fn tag_regex() -> &'static Regex {
    static TAG: OnceLock<Regex> = OnceLock::new();
    TAG.get_or_init(|| Regex::new(r"^.*@(\S+)\s*(.*)$").expect("tag regex is valid"))
}

/// Parsed user-script header.
///
/// The four metadata fields default to the empty string when the header
/// does not mention them. `includes` keeps the declaration order of the
/// `@include` tags, which is observable in match results.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    pub version: String,
    pub author: String,
    pub description: String,
    pub includes: Vec<String>,
}

/// Extract the metadata header from raw script source.
///
/// Returns `None` when either header marker is absent - the text is not a
/// user script and must not be installed. Once both markers are found
/// parsing cannot fail: lines that do not match the tag grammar and tags
/// that are not recognized are skipped silently, so headers written for
/// newer engines still install.
pub fn parse_header(raw: &str) -> Option<Header> {
    let open = raw.find(HEADER_OPEN)?;
    let close = raw.find(HEADER_CLOSE)?;
    // markers in either order delimit the block
    let (lo, hi) = if open <= close { (open, close) } else { (close, open) };

    let mut header = Header::default();
    for line in raw[lo..hi].lines() {
        let Some(captures) = tag_regex().captures(line) else {
            continue;
        };
        let tag = &captures[1];
        let value = captures[2].trim();
        debug!("Header tag: {} = {}", tag, value);
        match tag {
            "name" => header.name = value.to_string(),
            "version" => header.version = value.to_string(),
            "author" => header.author = value.to_string(),
            "description" => header.description = value.to_string(),
            "include" => header.includes.push(value.to_string()),
            _ => {}
        }
    }

    Some(header)
}
