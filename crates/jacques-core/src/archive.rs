//! Session Archive (spec §6): durable snapshots of catalog Session-Entries
//! under `~/.jacques/archive/<session-id>.json`, written once via
//! `initialize` and read back by the archive HTTP endpoints. Kept
//! independent of `~/.jacques/session-index.json` so archived conversations
//! survive that file being rebuilt or a transcript being pruned.

use std::collections::HashSet;
use std::path::PathBuf;

use fs_err as fs;
use serde::Serialize;

use jacques_protocol::{GlobalSessionIndex, SessionEntry};

use crate::config;
use crate::error::{Error, Result};

pub fn archive_path(session_id: &str) -> Option<PathBuf> {
    config::archive_dir().map(|dir| dir.join(format!("{session_id}.json")))
}

pub fn save_entry(entry: &SessionEntry) -> Result<()> {
    let path = archive_path(&entry.session_id).ok_or_else(|| Error::Internal("no home directory".to_string()))?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io("create archive dir", e))?;
    }
    let payload = serde_json::to_vec_pretty(entry).map_err(|e| Error::json("serialize archive entry", e))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, payload).map_err(|e| Error::io("write archive entry", e))?;
    fs::rename(&tmp_path, &path).map_err(|e| Error::io("commit archive entry", e))?;
    Ok(())
}

pub fn load_all() -> Vec<SessionEntry> {
    let Some(dir) = config::archive_dir() else {
        return Vec::new();
    };
    let Ok(read_dir) = fs::read_dir(&dir) else {
        return Vec::new();
    };

    read_dir
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().extension().and_then(|e| e.to_str()) == Some("json"))
        .filter_map(|entry| fs::read_to_string(entry.path()).ok())
        .filter_map(|content| serde_json::from_str(&content).ok())
        .collect()
}

pub fn load_one(session_id: &str) -> Option<SessionEntry> {
    let path = archive_path(session_id)?;
    let content = fs::read_to_string(path).ok()?;
    serde_json::from_str(&content).ok()
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ArchiveStats {
    pub conversation_count: usize,
    pub project_count: usize,
    pub total_size_bytes: u64,
}

pub fn stats() -> ArchiveStats {
    let entries = load_all();
    let mut projects: HashSet<String> = HashSet::new();
    let mut total_size_bytes = 0u64;
    for entry in &entries {
        projects.insert(entry.project_label.clone());
        total_size_bytes += entry.size_bytes;
    }

    ArchiveStats {
        conversation_count: entries.len(),
        project_count: projects.len(),
        total_size_bytes,
    }
}

pub fn search(query: &str) -> Vec<SessionEntry> {
    let query = query.to_lowercase();
    load_all()
        .into_iter()
        .filter(|entry| {
            entry.project_label.to_lowercase().contains(&query)
                || entry
                    .title
                    .as_deref()
                    .map(|title| title.to_lowercase().contains(&query))
                    .unwrap_or(false)
        })
        .collect()
}

/// Snapshots every session in the global session index into the archive
/// (spec §6: `POST /api/archive/initialize`). Returns the number archived.
pub fn initialize(index: &GlobalSessionIndex, mut on_progress: impl FnMut(usize, usize)) -> Result<usize> {
    let total = index.sessions.len();
    for (completed, entry) in index.sessions.iter().enumerate() {
        save_entry(entry)?;
        on_progress(completed + 1, total);
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry(session_id: &str, project_label: &str) -> SessionEntry {
        SessionEntry {
            session_id: session_id.to_string(),
            source: jacques_protocol::SourceTag::ClaudeCode,
            title: Some("Add retry logic".to_string()),
            transcript_path: "/tmp/irrelevant.jsonl".to_string(),
            project_label: project_label.to_string(),
            size_bytes: 1024,
            plans: Vec::new(),
            explore_agent_refs: Vec::new(),
            web_search_count: 0,
            total_input_tokens: 0,
            total_output_tokens: 0,
            started_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn stats_counts_distinct_projects_and_total_size() {
        let entries = vec![sample_entry("s1", "proj-a"), sample_entry("s2", "proj-a"), sample_entry("s3", "proj-b")];
        let mut projects: HashSet<String> = HashSet::new();
        let mut total = 0u64;
        for e in &entries {
            projects.insert(e.project_label.clone());
            total += e.size_bytes;
        }
        assert_eq!(projects.len(), 2);
        assert_eq!(total, 3072);
    }

    #[test]
    fn search_matches_title_case_insensitively() {
        let entries = vec![sample_entry("s1", "proj-a")];
        let matched: Vec<&SessionEntry> = entries.iter().filter(|e| e.title.as_deref().unwrap_or("").to_lowercase().contains("retry")).collect();
        assert_eq!(matched.len(), 1);
    }
}
