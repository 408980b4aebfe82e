use sysinfo::{Pid, ProcessRefreshKind, System, UpdateKind};

const BYPASS_FLAG: &str = "--dangerously-skip-permissions";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaudeProcess {
    pub pid: u32,
    pub cwd: Option<String>,
    pub is_bypass: bool,
}

/// Checks liveness directly via `kill(pid, 0)`, which asks the kernel
/// whether the process exists without sending a real signal.
#[cfg(unix)]
pub fn is_process_running(pid: u32) -> bool {
    // SAFETY: signal 0 performs no action beyond the existence/permission
    // check; pid is a plain integer, no memory is touched.
    let result = unsafe { libc::kill(pid as i32, 0) };
    result == 0
}

#[cfg(not(unix))]
pub fn is_process_running(pid: u32) -> bool {
    let mut sys = System::new();
    sys.refresh_processes_specifics(ProcessRefreshKind::new());
    sys.process(Pid::from_u32(pid)).is_some()
}

/// Whether the process at `pid` was launched with the bypass-permissions
/// flag. Used to suppress notifications that would otherwise prompt for a
/// permission the session has already opted out of (spec §4.2, §4.5).
pub fn is_process_bypass(pid: u32) -> bool {
    let mut sys = System::new();
    sys.refresh_processes_specifics(ProcessRefreshKind::new().with_cmd(UpdateKind::Always));

    sys.process(Pid::from_u32(pid))
        .map(|process| process.cmd().iter().any(|arg| arg == BYPASS_FLAG))
        .unwrap_or(false)
}

/// Enumerates live Claude Code processes by executable basename. Never
/// throws: permission failures or unreadable entries are simply excluded.
pub fn get_claude_processes() -> Vec<ClaudeProcess> {
    let mut sys = System::new();
    sys.refresh_processes_specifics(
        ProcessRefreshKind::new()
            .with_cmd(UpdateKind::Always)
            .with_cwd(UpdateKind::Always),
    );

    sys.processes()
        .iter()
        .filter_map(|(pid, process)| {
            if !is_claude_executable(process.name()) {
                return None;
            }
            Some(ClaudeProcess {
                pid: pid.as_u32(),
                cwd: process
                    .cwd()
                    .map(|path| path.to_string_lossy().to_string()),
                is_bypass: process.cmd().iter().any(|arg| arg == BYPASS_FLAG),
            })
        })
        .collect()
}

fn is_claude_executable(name: &str) -> bool {
    let lowered = name.to_lowercase();
    lowered == "claude" || lowered == "claude.exe"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_process_is_considered_running() {
        let pid = std::process::id();
        assert!(is_process_running(pid));
    }

    #[test]
    fn a_pid_unlikely_to_exist_is_not_running() {
        assert!(!is_process_running(u32::MAX - 1));
    }

    #[test]
    fn is_claude_executable_matches_basename_case_insensitively() {
        assert!(is_claude_executable("Claude"));
        assert!(is_claude_executable("claude.exe"));
        assert!(!is_claude_executable("node"));
    }
}
