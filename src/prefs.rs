//! Per-user preferences: locus override and terminal size (§3, SPEC_FULL.md §C.1).
//!
//! The original keeps these as ad hoc globals scattered across command
//! handlers (`grid_cmd.py`'s `user_locus`/`user_term` dicts); this crate
//! gathers them into one record per user so the command layer has a single
//! place to read and write them.

use std::collections::HashMap;

/// A user's requested terminal spec for `!term`-aware job output: the
/// `TERM` name plus geometry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermSize {
    pub name: String,
    pub columns: usize,
    pub lines: usize,
}

/// One user's sticky preferences.
#[derive(Debug, Clone, Default)]
pub struct UserPrefs {
    /// Node name override for this user's next submission; dereferenced
    /// against the current node table at submit time, not stored as a
    /// `Node` reference, since nodes can come and go.
    pub locus: Option<String>,
    pub term: Option<TermSize>,
}

/// All users' preferences, keyed by a platform user id.
#[derive(Debug, Default)]
pub struct PrefsTable {
    by_user: HashMap<String, UserPrefs>,
}

impl PrefsTable {
    pub fn new() -> Self {
        PrefsTable::default()
    }

    pub fn get(&self, user: &str) -> UserPrefs {
        self.by_user.get(user).cloned().unwrap_or_default()
    }

    pub fn set_locus(&mut self, user: &str, locus: Option<String>) {
        self.by_user.entry(user.to_owned()).or_default().locus = locus;
    }

    pub fn set_term(&mut self, user: &str, term: Option<TermSize>) {
        self.by_user.entry(user.to_owned()).or_default().term = term;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_no_preferences() {
        let table = PrefsTable::new();
        let prefs = table.get("alice");
        assert!(prefs.locus.is_none());
        assert!(prefs.term.is_none());
    }

    #[test]
    fn set_and_get_round_trip() {
        let mut table = PrefsTable::new();
        table.set_locus("alice", Some("hal".to_owned()));
        table.set_term(
            "alice",
            Some(TermSize {
                name: "xterm".to_owned(),
                columns: 80,
                lines: 24,
            }),
        );

        let prefs = table.get("alice");
        assert_eq!(prefs.locus.as_deref(), Some("hal"));
        assert_eq!(
            prefs.term,
            Some(TermSize {
                name: "xterm".to_owned(),
                columns: 80,
                lines: 24
            })
        );

        // unrelated user unaffected
        assert!(table.get("bob").locus.is_none());
    }

    #[test]
    fn clearing_locus_sets_it_back_to_none() {
        let mut table = PrefsTable::new();
        table.set_locus("alice", Some("hal".to_owned()));
        table.set_locus("alice", None);
        assert!(table.get("alice").locus.is_none());
    }
}
