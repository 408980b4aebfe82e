//! Global session index (spec §4.7, §3): walks every project under the
//! assistant's transcripts root and writes `~/.jacques/session-index.json`,
//! preferring each project's catalog over a direct transcript parse when
//! the catalog is still fresh.

use std::path::{Path, PathBuf};

use fs_err as fs;

use jacques_protocol::{GlobalSessionIndex, PlanRef, SessionEntry, SourceTag};

use crate::config;
use crate::error::{Error, Result};
use crate::transcript::{detect_mode_and_plans, get_entry_statistics, parse_transcript};

use super::indexer::{load_project_index, TranscriptFile};

#[derive(Debug, Clone, Default)]
pub struct IndexProgress {
    pub total: usize,
    pub completed: usize,
    pub current: Option<String>,
}

pub fn assistant_projects_root() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".claude").join("projects"))
}

/// Directory names under the projects root encode a cwd by replacing path
/// separators with `-`, the same convention the assistant itself uses when
/// it creates the directory; decoding is therefore a straight inverse.
pub fn decode_project_path(encoded_dir_name: &str) -> String {
    if encoded_dir_name.starts_with('-') {
        format!("/{}", &encoded_dir_name[1..].replace('-', "/"))
    } else {
        encoded_dir_name.replace('-', "/")
    }
}

/// Inverse of [`decode_project_path`], for HTTP routes that take a project
/// path as a URL segment.
pub fn encode_project_path(project_path: &str) -> String {
    if let Some(rest) = project_path.strip_prefix('/') {
        format!("-{}", rest.replace('/', "-"))
    } else {
        project_path.replace('/', "-")
    }
}

/// Every project path with at least one session in the global session
/// index, decoded back to a filesystem path. Used by cross-project catalog
/// lookups (sub-agent search, archive listing) that don't want to rescan
/// the assistant's entire transcripts root just to enumerate projects.
pub fn known_project_paths() -> Vec<String> {
    let Some(index_path) = config::session_index_path() else {
        return Vec::new();
    };
    let Ok(bytes) = fs::read(&index_path) else {
        return Vec::new();
    };
    let Ok(index): std::result::Result<GlobalSessionIndex, _> = serde_json::from_slice(&bytes) else {
        return Vec::new();
    };

    let mut paths: Vec<String> = index
        .sessions
        .iter()
        .filter_map(|entry| {
            Path::new(&entry.transcript_path)
                .parent()
                .and_then(|dir| dir.file_name())
                .map(|name| decode_project_path(&name.to_string_lossy()))
        })
        .collect();
    paths.sort();
    paths.dedup();
    paths
}

pub fn discover_transcripts(project_dir: &Path) -> Vec<TranscriptFile> {
    let Ok(read_dir) = fs::read_dir(project_dir) else {
        return Vec::new();
    };

    read_dir
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().extension().and_then(|e| e.to_str()) == Some("jsonl"))
        .filter_map(|entry| {
            let path = entry.path();
            let session_id = path.file_stem()?.to_str()?.to_string();
            let modified_at_ms = entry
                .metadata()
                .ok()
                .and_then(|meta| meta.modified().ok())
                .and_then(|time| time.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|dur| dur.as_millis() as i64)
                .unwrap_or(0);
            Some(TranscriptFile {
                session_id,
                path,
                modified_at_ms,
            })
        })
        .collect()
}

pub fn build_session_index(
    now_ms: i64,
    mut on_progress: impl FnMut(&IndexProgress),
) -> Result<GlobalSessionIndex> {
    let root = assistant_projects_root()
        .ok_or_else(|| Error::Internal("no home directory".to_string()))?;

    let project_dirs: Vec<PathBuf> = fs::read_dir(&root)
        .map(|read_dir| {
            read_dir
                .filter_map(|entry| entry.ok())
                .map(|entry| entry.path())
                .filter(|path| path.is_dir())
                .collect()
        })
        .unwrap_or_default();

    let transcripts_by_project: Vec<(PathBuf, String, Vec<TranscriptFile>)> = project_dirs
        .into_iter()
        .map(|dir| {
            let name = dir.file_name().and_then(|n| n.to_str()).unwrap_or("").to_string();
            let project_path = decode_project_path(&name);
            let transcripts = discover_transcripts(&dir);
            (dir, project_path, transcripts)
        })
        .collect();

    let total: usize = transcripts_by_project.iter().map(|(_, _, t)| t.len()).sum();
    let mut progress = IndexProgress {
        total,
        ..IndexProgress::default()
    };

    let mut sessions = Vec::new();

    for (_dir, project_path, transcripts) in &transcripts_by_project {
        let catalog = load_project_index(Path::new(project_path));

        for transcript in transcripts {
            progress.current = Some(transcript.session_id.clone());

            let manifest = catalog
                .sessions
                .iter()
                .find(|m| m.id == transcript.session_id);
            let fresh = manifest
                .map(|m| transcript.modified_at_ms <= m.saved_at)
                .unwrap_or(false);

            let entry = if fresh {
                let manifest = manifest.unwrap();
                let plans: Vec<PlanRef> = catalog
                    .plans
                    .iter()
                    .filter(|p| manifest.plan_ids.contains(&p.id))
                    .map(|p| PlanRef {
                        title: p.title.clone(),
                        source: jacques_protocol::PlanSource::Write,
                        message_index: 0,
                        file_path: Some(p.filename.clone()),
                        catalog_id: Some(p.id.clone()),
                    })
                    .collect();

                SessionEntry {
                    session_id: transcript.session_id.clone(),
                    source: SourceTag::ClaudeCode,
                    title: manifest.title.clone(),
                    transcript_path: transcript.path.to_string_lossy().to_string(),
                    project_label: project_label(project_path),
                    size_bytes: file_size(&transcript.path),
                    plans,
                    explore_agent_refs: Vec::new(),
                    web_search_count: 0,
                    total_input_tokens: 0,
                    total_output_tokens: 0,
                    started_at: manifest.started_at,
                    updated_at: manifest.updated_at,
                }
            } else {
                build_entry_from_transcript(transcript, project_path)
            };

            sessions.push(entry);
            progress.completed += 1;
            on_progress(&progress);
        }
    }

    let index = GlobalSessionIndex {
        sessions,
        last_scanned: now_ms,
    };

    let path = config::session_index_path().ok_or_else(|| Error::Internal("no home directory".to_string()))?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io("create .jacques dir", e))?;
    }
    let payload = serde_json::to_vec_pretty(&index).map_err(|e| Error::json("serialize session index", e))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, payload).map_err(|e| Error::io("write session index", e))?;
    fs::rename(&tmp_path, &path).map_err(|e| Error::io("commit session index", e))?;

    Ok(index)
}

fn build_entry_from_transcript(transcript: &TranscriptFile, project_path: &str) -> SessionEntry {
    let (entries, _stats) = parse_transcript(&transcript.path).unwrap_or_default();
    let plans = detect_mode_and_plans(&entries);
    let stats = get_entry_statistics(&entries);
    let web_search_count = *stats.counts_by_kind.get("web_search").unwrap_or(&0);

    SessionEntry {
        session_id: transcript.session_id.clone(),
        source: SourceTag::ClaudeCode,
        title: plans.first().map(|p| p.title.clone()),
        transcript_path: transcript.path.to_string_lossy().to_string(),
        project_label: project_label(project_path),
        size_bytes: file_size(&transcript.path),
        plans,
        explore_agent_refs: Vec::new(),
        web_search_count,
        total_input_tokens: stats.total_input_tokens,
        total_output_tokens: if stats.total_output_tokens > 0 {
            stats.total_output_tokens
        } else {
            stats.estimated_total_output_tokens
        },
        started_at: None,
        updated_at: None,
    }
}

fn project_label(project_path: &str) -> String {
    Path::new(project_path)
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| "Unknown Project".to_string())
}

fn file_size(path: &Path) -> u64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_absolute_encoded_path() {
        assert_eq!(decode_project_path("-Users-me-repo"), "/Users/me/repo");
    }

    #[test]
    fn encode_decode_round_trips_for_absolute_paths() {
        let encoded = encode_project_path("/Users/me/repo");
        assert_eq!(encoded, "-Users-me-repo");
        assert_eq!(decode_project_path(&encoded), "/Users/me/repo");
    }

    #[test]
    fn parse_transcript_default_on_missing_file_does_not_panic() {
        let entries = parse_transcript(Path::new("/nonexistent/path.jsonl")).unwrap_or_default();
        assert!(entries.0.is_empty());
    }
}
