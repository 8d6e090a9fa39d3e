//! POSIX `waitpid` status decoding.
//!
//! Grounded on `examples/original_source/discord-bot/gridbot/entity.py`'s
//! `disposition()`, which interprets a raw integer status the same way the
//! `os.WIFEXITED`/`os.WIFSIGNALED`/`os.WCOREDUMP` family of macros do. We
//! reimplement those macros directly (bit-exact, per the glibc encoding)
//! rather than depend on a libc wait-status helper, since the status
//! arrives over the wire as a decimal string rather than from a local
//! `waitpid` call.

/// A decoded POSIX wait status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The process exited with status 0.
    Success,
    /// The process exited with a non-zero status.
    Exited(i32),
    /// The process was terminated by a signal, optionally dumping core.
    Signaled { signal: i32, core_dumped: bool },
    /// The raw status didn't match a recognised pattern.
    Unknown(i32),
}

impl Disposition {
    /// Decode a raw `waitpid`-style status, mirroring `os.WIFEXITED` /
    /// `os.WIFSIGNALED` / `os.WCOREDUMP` bit-for-bit.
    pub fn decode(status: i32) -> Self {
        if status == 0 {
            return Disposition::Success;
        }

        let low = status & 0x7f;
        if low == 0 {
            // WIFEXITED: low byte is zero, exit code is the next byte.
            Disposition::Exited((status >> 8) & 0xff)
        } else if low != 0x7f {
            // WIFSIGNALED: low 7 bits hold the signal, bit 0x80 is the
            // core-dump flag.
            let signal = low & 0x7f;
            let core_dumped = status & 0x80 != 0;
            Disposition::Signaled {
                signal,
                core_dumped,
            }
        } else {
            // WIFSTOPPED/WIFCONTINUED or anything else we don't expect.
            Disposition::Unknown(status)
        }
    }

    /// Render the human-readable phrase shown in a job's terminal status,
    /// matching `disposition()` in the original.
    pub fn phrase(&self) -> String {
        match self {
            Disposition::Success => "Command completed successfully".to_owned(),
            Disposition::Exited(code) => format!("Command completed with status {code}"),
            Disposition::Signaled {
                signal,
                core_dumped,
            } => {
                let dump_message = if *core_dumped { " and dumped core" } else { "" };
                format!("Command terminated with signal {signal}{dump_message}")
            },
            Disposition::Unknown(status) => {
                format!("Command exited with waitpid status {status}")
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success() {
        assert_eq!(
            Disposition::decode(0).phrase(),
            "Command completed successfully"
        );
    }

    #[test]
    fn exited_nonzero() {
        // exit code 42 encodes as (42 << 8)
        assert_eq!(Disposition::decode(42 << 8), Disposition::Exited(42));
        assert_eq!(
            Disposition::decode(42 << 8).phrase(),
            "Command completed with status 42"
        );
    }

    #[test]
    fn signaled_no_core() {
        // SIGKILL = 9
        assert_eq!(
            Disposition::decode(9),
            Disposition::Signaled {
                signal: 9,
                core_dumped: false
            }
        );
        assert_eq!(
            Disposition::decode(9).phrase(),
            "Command terminated with signal 9"
        );
    }

    #[test]
    fn signaled_with_core() {
        // SIGSEGV = 11, core dump bit set
        let status = 11 | 0x80;
        assert_eq!(
            Disposition::decode(status),
            Disposition::Signaled {
                signal: 11,
                core_dumped: true
            }
        );
        assert_eq!(
            Disposition::decode(status).phrase(),
            "Command terminated with signal 11 and dumped core"
        );
    }

    #[test]
    fn unknown_stopped() {
        // low 7 bits == 0x7f indicates WIFSTOPPED
        let status = 0x7f | (5 << 8);
        assert_eq!(Disposition::decode(status), Disposition::Unknown(status));
    }
}
