//! Static regex-set veto over submitted script text (§4.1).
//!
//! This denylist is by no means a perfect defense against malicious
//! commands. It is meant to stop low-effort system-trashing commands, and
//! is a direct port of `examples/original_source/discord-bot/gridbot/cmd_denylist.py`.

use fancy_regex::Regex;
use once_cell::sync::Lazy;

// The fork-bomb pattern needs a backreference (`\1`) to match the function
// name against its body, which the `regex` crate deliberately can't express;
// `fancy-regex` supports it at the cost of backtracking, which is fine here
// since scripts are short and this runs once per submission.
static DENY_PATTERNS: Lazy<[Regex; 3]> = Lazy::new(|| {
    [
        Regex::new(r"rm -[rf][rf] /\*?$").unwrap(),
        Regex::new(r"--no-preserve-root").unwrap(),
        // the famous one-liner fork bomb, renamed and whitespace-tolerant
        Regex::new(r"(.+?)\s*\(\)\s*\{\s*\1\s*\|\s*\1\s*&\s*\}\s*;\s*\1").unwrap(),
    ]
});

/// Returns `false` if `script` matches any shipped deny pattern.
pub fn permit(script: &str) -> bool {
    !DENY_PATTERNS
        .iter()
        .any(|pat| pat.is_match(script).unwrap_or(false))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn good_commands() {
        for c in ["ls -l", "uptime", "whoami", "curl https://wttr.in"] {
            assert!(permit(c), "{c:?} should be permitted");
        }
    }

    #[test]
    fn no_rm_root() {
        assert!(!permit("rm -rf /"));
        assert!(!permit("rm -fr /"));
        assert!(!permit("rm -rf /*"));
    }

    #[test]
    fn almost_rm_root() {
        assert!(permit("rm -rf /tmp/deletemii"));
    }

    #[test]
    fn no_permit_root() {
        assert!(!permit("echo --no-preserve-root"));
        assert!(!permit("rm -rf --no-preserve-root /"));
        assert!(!permit("rm --no-preserve-root -fr /"));
    }

    #[test]
    fn no_fork_bomb() {
        assert!(!permit(":(){ :|:& };:"));
        assert!(!permit("bomb(){ bomb|bomb& };bomb"));
        assert!(!permit("bomb () { bomb | bomb & }; bomb"));
        assert!(!permit("echo ':(){ :|:& };:' > /tmp/pwn && sh /tmp/pwn"));
    }

    #[test]
    fn not_a_bomb() {
        assert!(permit("bloop()"));
        assert!(permit("bloop() { }"));
        assert!(permit("bloop () { sleep 5 }"));
        assert!(permit("bloop () { sleep 5; echo bloop }; bloop"));
    }
}
