//! The ANSI-aware dual-column "neofetch" transform (§4.2, step 2-8).
//!
//! Ported from `output_filter.py::fastfetch_filter` /
//! `neofetch.py::fastfetch_filter` (the two copies in the retrieved source
//! are identical revisions of the same function). Bright-foreground SGR
//! rewriting (90-97) follows spec.md's explicit range rather than the
//! original's `range(1, 9)` loop, which misses code 90 and touches the
//! nonexistent code 98 — spec.md is not silent here, so it wins over the
//! original.

use once_cell::sync::Lazy;
use regex::Regex;

use super::backtick::filter_backticks;

const SEP: &str = "===snip===";

static LEADING_SCREEN_MODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\x1B\[\?\d+[hl]+").unwrap());
static TRAILING_SCREEN_MODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\x1B\[\?\d+[hl]+$").unwrap());
static CURSOR_HOME_TAIL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\x1B\[19A\x1B\[9999999D.*$").unwrap());
static NON_COLOR_CSI: Lazy<Regex> = Lazy::new(|| Regex::new(r"\x1B\[[0-9;]*[A-HJKST]").unwrap());
static SGR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\x1B\[[0-9;]*m").unwrap());
static LEADING_SGR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*\x1B\[[0-9;]*m").unwrap());
static OSC8_LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\x1B\]8;;.*?\x1B\\/").unwrap());

/// Visible width of a line, ignoring SGR color sequences.
fn visible_width(line: &str) -> usize {
    SGR.replace_all(line, "").chars().count()
}

fn clean_logo(logo: &str) -> String {
    let s = LEADING_SCREEN_MODE.replace(logo, "");
    let s = CURSOR_HOME_TAIL.replace(&s, "");
    let s = NON_COLOR_CSI.replace_all(&s, "");
    s.trim_end().to_owned()
}

fn clean_info(info: &str) -> String {
    let s = LEADING_SCREEN_MODE.replace(info, "");
    let s = TRAILING_SCREEN_MODE.replace(&s, "");
    let s = s.trim_end().to_owned();
    NON_COLOR_CSI.replace_all(&s, "").into_owned()
}

/// Rewrites bright foreground SGR codes (90-97) into bold + normal
/// foreground (30-37), per spec.md §4.2 step 5.
fn rewrite_bright_fg(line: &str) -> String {
    let mut out = line.to_owned();
    for i in 0..=7 {
        let bright = format!("\x1b[9{i}m");
        let replacement = format!("\x1b[1m\x1b[3{i}m");
        out = out.replace(&bright, &replacement);
    }
    out
}

fn cleanup_line(line: &str) -> String {
    let mut s = line.to_owned();
    s = s.replace("\x1b[?25l", "");
    s = s.replace("\x1b[?25h", "");
    s = s.replace("\x1b[?7l", "");
    s = s.replace("\x1b[m", "\x1b[0m");
    s = s.replace("\x1b[0m\x1b[0m", "\x1b[0m");
    s = rewrite_bright_fg(&s);
    s = OSC8_LINK.replace_all(&s, "/").into_owned();
    s = s.replace("\x1b]8;;\x1b\\", "");
    s = filter_backticks(&s);
    while s.ends_with(' ') {
        s.pop();
    }
    if let Some(stripped) = s.strip_suffix("\x1b[0m") {
        s = stripped.to_owned();
    }
    s
}

/// Joins a `LOGO <SEP> INFO` composite (or a logo-only string, if `SEP` is
/// absent) into Discord-friendly dual-column output.
pub fn fastfetch_filter(s: &str) -> String {
    let (logo_raw, info_raw) = match s.split_once(SEP) {
        Some((logo, info)) => (logo, info),
        None => (s, ""),
    };

    let logo = clean_logo(logo_raw);
    let info = if info_raw.is_empty() {
        String::new()
    } else {
        clean_info(info_raw)
    };

    if info.is_empty() {
        return logo;
    }

    let logo_lines: Vec<&str> = logo.lines().collect();
    let info_lines: Vec<&str> = info.lines().collect();
    let max_logo_width = logo_lines.iter().map(|l| visible_width(l)).max().unwrap_or(0);

    let n = logo_lines.len().max(info_lines.len());
    let mut last_color = String::new();
    let mut combined = Vec::with_capacity(n);

    for i in 0..n {
        let logo_part = logo_lines.get(i).copied().unwrap_or("");
        let info_part = info_lines.get(i).copied().unwrap_or("");

        let color_codes: Vec<&str> = SGR.find_iter(logo_part).map(|m| m.as_str()).collect();
        if !color_codes.is_empty() && (color_codes[0] != "\x1b[0m" || color_codes.len() != 1) {
            last_color = color_codes.concat();
        }

        let logo_part = if LEADING_SGR.is_match(logo_part) {
            logo_part.to_owned()
        } else {
            format!("{last_color}{logo_part}")
        };

        let padding = max_logo_width.saturating_sub(visible_width(&logo_part)) + 4;
        let combined_line = format!("{logo_part}{}{info_part}", " ".repeat(padding));
        combined.push(cleanup_line(&combined_line));
    }

    combined.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logo_only_when_no_separator() {
        let input = "plain logo\nsecond line";
        assert_eq!(fastfetch_filter(input), "plain logo\nsecond line");
    }

    #[test]
    fn strips_screen_mode_toggles() {
        let input = "\x1b[?25llogo line===snip===info line";
        let out = fastfetch_filter(input);
        assert!(!out.contains("\x1b[?25l"));
        assert!(out.contains("logo line"));
        assert!(out.contains("info line"));
    }

    #[test]
    fn rewrites_bright_foreground() {
        let input = "\x1b[91mred===snip===info";
        let out = fastfetch_filter(input);
        assert!(out.contains("\x1b[1m\x1b[31m"));
        assert!(!out.contains("\x1b[91m"));
    }

    #[test]
    fn collapses_triple_backticks() {
        let input = "a```b===snip===c";
        let out = fastfetch_filter(input);
        assert!(!out.contains("```"));
    }

    #[test]
    fn combines_two_columns_side_by_side() {
        let input = "AAAA\nBB===snip===1\n2";
        let out = fastfetch_filter(input);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("AAAA"));
        assert!(lines[0].trim_end().ends_with('1'));
    }
}
