//! tmux client/pane introspection, used to fill a session's
//! [`jacques_protocol::TerminalDescriptor`] when the assistant is running
//! inside a multiplexer.

use std::collections::{BTreeSet, HashMap};
use std::io;
use std::process::Command;

const FIELD_DELIMITER: &str = "__JQ_DELIM__";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TmuxClient {
    pub client_tty: String,
    pub session_name: String,
    pub pane_current_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TmuxPane {
    pub session_name: String,
    pub window_index: String,
    pub pane_current_path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TmuxSnapshot {
    pub clients: Vec<TmuxClient>,
    pub panes: Vec<TmuxPane>,
}

pub trait TmuxAdapter: Send + Sync {
    fn snapshot(&self) -> Result<TmuxSnapshot, String>;
}

#[derive(Debug, Clone, Default)]
pub struct CommandTmuxAdapter;

impl TmuxAdapter for CommandTmuxAdapter {
    fn snapshot(&self) -> Result<TmuxSnapshot, String> {
        let clients_output = run_tmux([
            "list-clients",
            "-F",
            "#{client_tty}__JQ_DELIM__#{session_name}__JQ_DELIM__#{pane_current_path}",
        ])?;
        let panes_output = run_tmux([
            "list-panes",
            "-a",
            "-F",
            "#{session_name}__JQ_DELIM__#{window_index}__JQ_DELIM__#{pane_current_path}",
        ])?;

        Ok(TmuxSnapshot {
            clients: parse_clients(&clients_output),
            panes: parse_panes(&panes_output),
        })
    }
}

/// Finds the tmux session/window/pane serving a given working directory, if
/// any client is currently attached to a pane at that path.
pub fn locate_by_cwd(snapshot: &TmuxSnapshot, cwd: &str) -> Option<(String, String)> {
    snapshot
        .panes
        .iter()
        .find(|pane| pane.pane_current_path == cwd)
        .map(|pane| (pane.session_name.clone(), pane.window_index.clone()))
}

fn run_tmux<const N: usize>(args: [&str; N]) -> Result<String, String> {
    for binary in tmux_binary_candidates() {
        match Command::new(binary).args(args).output() {
            Ok(output) if output.status.success() => {
                return Ok(String::from_utf8_lossy(&output.stdout).to_string());
            }
            Ok(_) => continue,
            Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
            Err(_) => continue,
        }
    }
    Ok(String::new())
}

fn tmux_binary_candidates() -> &'static [&'static str] {
    &[
        "tmux",
        "/opt/homebrew/bin/tmux",
        "/usr/local/bin/tmux",
        "/opt/local/bin/tmux",
        "/usr/bin/tmux",
    ]
}

fn split_fields<'a>(line: &'a str, expected: usize) -> Option<Vec<&'a str>> {
    let delimiter = if line.contains(FIELD_DELIMITER) {
        FIELD_DELIMITER
    } else {
        "\t"
    };
    let fields: Vec<&str> = line.split(delimiter).collect();
    if fields.len() < expected {
        return None;
    }
    Some(fields)
}

fn parse_clients(output: &str) -> Vec<TmuxClient> {
    let mut clients: Vec<TmuxClient> = output
        .lines()
        .filter_map(|line| {
            let fields = split_fields(line, 2)?;
            let client_tty = fields[0];
            let session_name = fields[1];
            if client_tty.is_empty() || session_name.is_empty() {
                return None;
            }
            let pane_current_path = fields.get(2).filter(|p| !p.is_empty()).map(|s| s.to_string());
            Some(TmuxClient {
                client_tty: client_tty.to_string(),
                session_name: session_name.to_string(),
                pane_current_path,
            })
        })
        .collect();
    clients.sort_by(|a, b| a.client_tty.cmp(&b.client_tty));
    clients
}

fn parse_panes(output: &str) -> Vec<TmuxPane> {
    let mut seen: HashMap<(String, String), BTreeSet<String>> = HashMap::new();
    let mut panes = Vec::new();
    for line in output.lines() {
        let Some(fields) = split_fields(line, 3) else {
            continue;
        };
        let (session_name, window_index, pane_path) = (fields[0], fields[1], fields[2]);
        if pane_path.is_empty() {
            continue;
        }
        let key = (session_name.to_string(), window_index.to_string());
        let inserted = seen.entry(key).or_default().insert(pane_path.to_string());
        if inserted {
            panes.push(TmuxPane {
                session_name: session_name.to_string(),
                window_index: window_index.to_string(),
                pane_current_path: pane_path.to_string(),
            });
        }
    }
    panes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_clients_with_custom_delimiter() {
        let output = "/dev/ttys001__JQ_DELIM__main__JQ_DELIM__/home/me/project\n";
        let clients = parse_clients(output);
        assert_eq!(clients.len(), 1);
        assert_eq!(clients[0].session_name, "main");
        assert_eq!(
            clients[0].pane_current_path.as_deref(),
            Some("/home/me/project")
        );
    }

    #[test]
    fn locates_pane_by_cwd() {
        let snapshot = TmuxSnapshot {
            clients: vec![],
            panes: vec![TmuxPane {
                session_name: "work".to_string(),
                window_index: "1".to_string(),
                pane_current_path: "/repo".to_string(),
            }],
        };
        let found = locate_by_cwd(&snapshot, "/repo");
        assert_eq!(found, Some(("work".to_string(), "1".to_string())));
    }

    #[test]
    fn empty_output_yields_no_panes() {
        assert!(parse_panes("").is_empty());
    }
}
