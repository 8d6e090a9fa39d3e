//! Backtick neutralization (§4.2).
//!
//! Ported from `output_filter.py::filter_backticks`: replace every run of
//! three consecutive backticks with three backticks separated by zero-width
//! spaces, so buffered job output can never prematurely close the fenced
//! code block it's rendered inside.

/// Zero-width space, U+200B.
const ZWS: char = '\u{200b}';

/// Escapes triple-backtick runs so they can't close a surrounding fence.
pub fn filter_backticks(s: &str) -> String {
    s.replace("```", &format!("`{ZWS}`{ZWS}`"))
}
