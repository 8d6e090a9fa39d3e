//! Error taxonomy mirroring §7: user error, remote-transient, protocol
//! violation, and fatal. Call sites convert into `anyhow::Error` at the
//! process boundary (`main`, task bodies), the same pattern the teacher
//! uses (`wire::decoder::Error`/`wire::encoder::Error` as structured inner
//! errors that fold into `anyhow::Result` at `src/bin/ebeans/main.rs`).

use thiserror::Error;

/// A categorized grid error. The category determines how a call site
/// should react (§7 Propagation policy): user errors become a single chat
/// reply, remote-transient errors get logged and surfaced as an edit,
/// protocol violations are logged and dropped, and fatal errors are
/// announced before the broker loop retries.
#[derive(Debug, Error)]
pub enum GridError {
    /// Malformed command, unknown node name, denylisted script.
    #[error("{0}")]
    User(String),

    /// Broker disconnect, publish failure, chat HTTP error.
    #[error("transient failure: {0}")]
    RemoteTransient(#[source] anyhow::Error),

    /// Malformed JSON, unknown event, spurious job ID.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// Unhandled exception in the broker loop.
    #[error("fatal: {0}")]
    Fatal(#[source] anyhow::Error),
}

impl GridError {
    pub fn is_user_facing(&self) -> bool {
        matches!(self, GridError::User(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_errors_are_user_facing() {
        let err = GridError::User("no such node".to_owned());
        assert!(err.is_user_facing());
    }

    #[test]
    fn other_categories_are_not_user_facing() {
        assert!(!GridError::Protocol("bad json".to_owned()).is_user_facing());
        assert!(!GridError::Fatal(anyhow::anyhow!("boom")).is_user_facing());
        assert!(!GridError::RemoteTransient(anyhow::anyhow!("disconnected")).is_user_facing());
    }
}
