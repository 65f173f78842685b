//! Cleaning game text before it is spoken
//!
//! Game strings carry inline markup: `<br>` line breaks and tags such as
//! `<col=ff0000>`. Line breaks become spaces, other tags are dropped.

use once_cell::sync::Lazy;
use regex::Regex;

/// `<br>`, `<br/>` or `<br />`, any case
static LINE_BREAK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<br\s*/?>").expect("valid line break pattern"));

/// `<` followed by a tag name or `/`, up to the next `>`
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[A-Za-z/][^<>]*>").expect("valid tag pattern"));

/// Replace line-break tags with spaces and trim.
///
/// This is the normalization used to key duplicate suppression.
pub fn normalize_line_breaks(text: &str) -> String {
    LINE_BREAK.replace_all(text, " ").trim().to_string()
}

/// Make text speakable: line breaks become spaces, other tags are removed,
/// whitespace runs collapse to one space.
pub fn sanitize(text: &str) -> String {
    let spaced = LINE_BREAK.replace_all(text, " ");
    let stripped = TAG.replace_all(&spaced, "");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}
