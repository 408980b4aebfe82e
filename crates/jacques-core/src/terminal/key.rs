//! Terminal-key shapes.
//!
//! `terminal_key` is a discriminated string used only for dedup tie-breaks
//! and PID extraction during enrichment — never treated as an identity
//! (spec §3 invariant ii). Two forms exist: a process-discovered session
//! carries its PID directly; a PID-less session minted by the factory
//! carries an opaque ulid until the Process Monitor upgrades it.

use ulid::Ulid;

const DISCOVERED_PREFIX: &str = "DISCOVERED:PID:";
const AUTO_PREFIX: &str = "AUTO:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalKey {
    Discovered { pid: u32 },
    Auto,
}

impl TerminalKey {
    pub fn discovered(pid: u32) -> String {
        format!("{}{}", DISCOVERED_PREFIX, pid)
    }

    pub fn new_auto() -> String {
        format!("{}{}", AUTO_PREFIX, Ulid::new())
    }

    /// Upgrades a PID-less key to a discovered one once the Process Monitor
    /// matches it to a running process (spec §4.5).
    pub fn upgrade(pid: u32) -> String {
        Self::discovered(pid)
    }

    pub fn pid_from(key: &str) -> Option<u32> {
        key.strip_prefix(DISCOVERED_PREFIX)?.parse().ok()
    }

    pub fn is_auto(key: &str) -> bool {
        key.starts_with(AUTO_PREFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovered_key_round_trips_pid() {
        let key = TerminalKey::discovered(12345);
        assert_eq!(key, "DISCOVERED:PID:12345");
        assert_eq!(TerminalKey::pid_from(&key), Some(12345));
    }

    #[test]
    fn auto_key_has_no_pid_until_upgraded() {
        let key = TerminalKey::new_auto();
        assert!(TerminalKey::is_auto(&key));
        assert_eq!(TerminalKey::pid_from(&key), None);

        let upgraded = TerminalKey::upgrade(999);
        assert_eq!(TerminalKey::pid_from(&upgraded), Some(999));
        assert!(!TerminalKey::is_auto(&upgraded));
    }
}
