//! Per-project catalog extraction (spec §4.7): walks a project's
//! transcripts, derives plans/sub-agents/session manifests, and merges the
//! result into `<project>/.jacques/index.json` with plan deduplication by
//! `(title, content-hash)`.

use std::path::{Path, PathBuf};

use fs_err as fs;
use sha2::{Digest, Sha256};

use jacques_protocol::{
    CatalogPlan, ContextNoteRef, Mode, ProjectIndex, SessionManifestSummary, SubAgentRef, SubAgentType,
};

use crate::error::{Error, Result};
use crate::transcript::{detect_mode_and_plans, estimate_tokens, get_entry_statistics, parse_transcript, TranscriptEntry};

/// One transcript file discovered under the assistant's projects root for
/// a given project.
#[derive(Debug, Clone)]
pub struct TranscriptFile {
    pub session_id: String,
    pub path: PathBuf,
    pub modified_at_ms: i64,
}

#[derive(Debug, Clone, Default)]
pub struct ExtractProgress {
    pub total: usize,
    pub completed: usize,
    pub current: Option<String>,
    pub skipped: usize,
    pub errors: usize,
}

pub fn jacques_dir(project_path: &Path) -> PathBuf {
    project_path.join(".jacques")
}

pub fn index_path(project_path: &Path) -> PathBuf {
    jacques_dir(project_path).join("index.json")
}

pub fn load_project_index(project_path: &Path) -> ProjectIndex {
    fs::read_to_string(index_path(project_path))
        .ok()
        .and_then(|content| serde_json::from_str(&content).ok())
        .unwrap_or_default()
}

pub fn save_project_index(project_path: &Path, index: &ProjectIndex) -> Result<()> {
    let dir = jacques_dir(project_path);
    fs::create_dir_all(&dir).map_err(|e| Error::io("create .jacques dir", e))?;
    let path = index_path(project_path);
    let payload = serde_json::to_vec_pretty(index).map_err(|e| Error::json("serialize index", e))?;
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, payload).map_err(|e| Error::io("write index", e))?;
    fs::rename(&tmp_path, &path).map_err(|e| Error::io("commit index", e))?;
    Ok(())
}

/// Extracts (or refreshes) one project's catalog. `on_progress` is invoked
/// once per transcript visited, whether or not it was re-extracted.
pub fn extract_project_catalog(
    project_path: &Path,
    transcripts: &[TranscriptFile],
    force: bool,
    now_ms: i64,
    mut on_progress: impl FnMut(&ExtractProgress),
) -> Result<ProjectIndex> {
    let mut index = load_project_index(project_path);
    let mut progress = ExtractProgress {
        total: transcripts.len(),
        ..ExtractProgress::default()
    };

    for transcript in transcripts {
        progress.current = Some(transcript.session_id.clone());

        let existing_manifest = index
            .sessions
            .iter()
            .find(|s| s.id == transcript.session_id)
            .cloned();

        let needs_extract = force
            || existing_manifest
                .as_ref()
                .map(|m| transcript.modified_at_ms > m.saved_at)
                .unwrap_or(true);

        if !needs_extract {
            progress.skipped += 1;
            progress.completed += 1;
            on_progress(&progress);
            continue;
        }

        match extract_one(&transcript.path) {
            Ok((entries, stats_total_tools, stats_total_messages)) => {
                let plans = detect_mode_and_plans(&entries);
                let mut plan_ids = Vec::new();

                for plan in &plans {
                    let text = plan_text_for(&entries, plan.message_index);
                    let hash = content_hash(&text);
                    let id = merge_plan(&mut index, &plan.title, &hash, &transcript.session_id, now_ms);
                    plan_ids.push(id);
                }

                let sub_agents = extract_sub_agents(&entries, &transcript.session_id);
                for agent in sub_agents {
                    if !index.sub_agents.iter().any(|a| a.id == agent.id) {
                        index.sub_agents.push(agent);
                    }
                }

                for note in extract_context_notes(&entries, project_path) {
                    if !index.context.iter().any(|c| c.id == note.id) {
                        index.context.push(note);
                    }
                }

                let (started_at, updated_at) = entry_time_bounds(&entries);
                let manifest = SessionManifestSummary {
                    id: transcript.session_id.clone(),
                    title: plans.first().map(|p| p.title.clone()),
                    started_at,
                    updated_at,
                    tool_call_count: stats_total_tools,
                    message_count: stats_total_messages,
                    mode: Mode::Default,
                    plan_ids,
                    saved_at: now_ms,
                };

                index.sessions.retain(|s| s.id != transcript.session_id);
                index.sessions.push(manifest);
            }
            Err(_) => progress.errors += 1,
        }

        progress.completed += 1;
        on_progress(&progress);
    }

    index.updated_at = now_ms;
    save_project_index(project_path, &index)?;
    Ok(index)
}

fn extract_one(path: &Path) -> Result<(Vec<TranscriptEntry>, usize, usize)> {
    let (entries, _stats) = parse_transcript(path)?;
    let stats = get_entry_statistics(&entries);
    let tool_calls = *stats.counts_by_kind.get("tool_call").unwrap_or(&0);
    Ok((entries, tool_calls, stats.total_entries))
}

fn entry_time_bounds(entries: &[TranscriptEntry]) -> (Option<i64>, Option<i64>) {
    let timestamps: Vec<i64> = entries
        .iter()
        .filter_map(|e| e.meta().timestamp.as_deref())
        .filter_map(|ts| chrono::DateTime::parse_from_rfc3339(ts).ok())
        .map(|dt| dt.timestamp_millis())
        .collect();

    (timestamps.iter().min().copied(), timestamps.iter().max().copied())
}

fn plan_text_for(entries: &[TranscriptEntry], message_index: usize) -> String {
    entries
        .get(message_index)
        .and_then(|e| e.searchable_text())
        .unwrap_or("")
        .to_string()
}

fn canonicalize_plan_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn content_hash(text: &str) -> String {
    let canonical = canonicalize_plan_text(text);
    let digest = Sha256::digest(canonical.as_bytes());
    format!("{:x}", digest)
}

/// Merges a detected plan into the project index, deduplicating by
/// `(title, content_hash)`. Returns the plan's catalog id.
fn merge_plan(index: &mut ProjectIndex, title: &str, hash: &str, session_id: &str, now_ms: i64) -> String {
    if let Some(existing) = index
        .plans
        .iter_mut()
        .find(|p| p.title == title && p.content_hash == hash)
    {
        if !existing.session_ids.iter().any(|s| s == session_id) {
            existing.session_ids.push(session_id.to_string());
        }
        existing.updated_at = now_ms;
        return existing.id.clone();
    }

    let filename = unique_filename(index, title);
    let id = format!("plan-{}", &hash[..12.min(hash.len())]);
    index.plans.push(CatalogPlan {
        id: id.clone(),
        title: title.to_string(),
        filename,
        content_hash: hash.to_string(),
        session_ids: vec![session_id.to_string()],
        created_at: now_ms,
        updated_at: now_ms,
    });
    id
}

fn unique_filename(index: &ProjectIndex, title: &str) -> String {
    let slug = slugify(title);
    let existing_with_title: Vec<&CatalogPlan> = index.plans.iter().filter(|p| p.title == title).collect();
    if existing_with_title.is_empty() {
        return format!("{}.md", slug);
    }
    format!("{}-{}.md", slug, existing_with_title.len() + 1)
}

fn slugify(title: &str) -> String {
    let slug: String = title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect();
    let collapsed = slug.split('-').filter(|s| !s.is_empty()).collect::<Vec<_>>().join("-");
    if collapsed.is_empty() {
        "plan".to_string()
    } else {
        collapsed
    }
}

/// Keyword buckets checked in order against a sub-agent's progress message;
/// first match wins, same tie-break convention as heading-pattern plan
/// detection. Anything matching neither bucket is `general`.
const SEARCH_KEYWORDS: &[&str] = &["web search", "websearch", "search the web", "search for"];
const EXPLORATION_KEYWORDS: &[&str] = &["explore", "investigat", "read ", "grep", "glob", "scan the"];

fn classify_sub_agent_type(message: Option<&str>) -> SubAgentType {
    let Some(message) = message else {
        return SubAgentType::General;
    };
    let lowered = message.to_lowercase();

    if SEARCH_KEYWORDS.iter().any(|kw| lowered.contains(kw)) {
        SubAgentType::Search
    } else if EXPLORATION_KEYWORDS.iter().any(|kw| lowered.contains(kw)) {
        SubAgentType::Exploration
    } else {
        SubAgentType::General
    }
}

/// Tool names treated as reading context into the session (spec §4.7:
/// "extract ... context notes"), as distinct from `Write`-sourced plan files.
fn is_context_read_tool(name: &str) -> bool {
    matches!(name.to_lowercase().as_str(), "read" | "notebookread")
}

fn extract_context_notes(entries: &[TranscriptEntry], project_path: &Path) -> Vec<ContextNoteRef> {
    entries
        .iter()
        .filter_map(|entry| {
            let TranscriptEntry::ToolCall(call) = entry else {
                return None;
            };
            if !is_context_read_tool(&call.tool_name) {
                return None;
            }
            let file_path = call.file_path.as_deref()?;
            let relative_path = Path::new(file_path)
                .strip_prefix(project_path)
                .map(|p| p.to_string_lossy().to_string())
                .unwrap_or_else(|_| file_path.to_string());
            let size_bytes = fs::metadata(file_path).map(|m| m.len()).unwrap_or(0);
            let hash = content_hash(file_path);

            Some(ContextNoteRef {
                id: format!("ctx-{}", &hash[..12.min(hash.len())]),
                name: Path::new(file_path)
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or(file_path)
                    .to_string(),
                relative_path,
                size_bytes,
                source: call.tool_name.to_lowercase(),
            })
        })
        .collect()
}

pub fn extract_sub_agents(entries: &[TranscriptEntry], session_id: &str) -> Vec<SubAgentRef> {
    entries
        .iter()
        .enumerate()
        .filter_map(|(index, entry)| {
            let TranscriptEntry::AgentProgress(progress) = entry else {
                return None;
            };
            let agent_id = progress.agent_id.clone()?;
            let message = progress.message.as_deref();
            let timestamp = progress
                .meta
                .timestamp
                .as_deref()
                .and_then(|ts| chrono::DateTime::parse_from_rfc3339(ts).ok())
                .map(|dt| dt.timestamp_millis())
                .unwrap_or(0);

            Some(SubAgentRef {
                id: agent_id,
                session_id: session_id.to_string(),
                agent_type: classify_sub_agent_type(message),
                title: message.map(str::to_string).unwrap_or_else(|| format!("sub-agent-{}", index)),
                token_cost: message.map(estimate_tokens).unwrap_or(0),
                result_count: None,
                timestamp,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_stable_across_whitespace_differences() {
        let a = content_hash("Implement the following plan:\n  step one\n  step two");
        let b = content_hash("Implement the following plan: step one step two");
        assert_eq!(a, b);
    }

    #[test]
    fn merge_plan_dedupes_identical_plans_across_sessions() {
        let mut index = ProjectIndex::default();
        let hash = content_hash("do the thing");
        let id1 = merge_plan(&mut index, "My Plan", &hash, "s1", 100);
        let id2 = merge_plan(&mut index, "My Plan", &hash, "s2", 200);

        assert_eq!(id1, id2);
        assert_eq!(index.plans.len(), 1);
        assert_eq!(index.plans[0].session_ids, vec!["s1", "s2"]);
        assert_eq!(index.plans[0].updated_at, 200);
    }

    #[test]
    fn classifies_sub_agent_type_from_progress_message() {
        assert_eq!(classify_sub_agent_type(Some("Running a web search for recent releases")), SubAgentType::Search);
        assert_eq!(classify_sub_agent_type(Some("Exploring the src/ directory for callers")), SubAgentType::Exploration);
        assert_eq!(classify_sub_agent_type(Some("Summarizing findings")), SubAgentType::General);
        assert_eq!(classify_sub_agent_type(None), SubAgentType::General);
    }

    #[test]
    fn extract_sub_agents_derives_token_cost_and_timestamp_from_the_entry() {
        use crate::transcript::entry::{AgentProgressEntry, EntryMeta};

        let entries = vec![TranscriptEntry::AgentProgress(AgentProgressEntry {
            meta: EntryMeta {
                timestamp: Some("2026-01-01T00:00:00Z".to_string()),
                uuid: None,
                parent_uuid: None,
            },
            agent_id: Some("agent-1".to_string()),
            message: Some("Exploring the codebase for usages".to_string()),
        })];

        let sub_agents = extract_sub_agents(&entries, "session-1");
        assert_eq!(sub_agents.len(), 1);
        assert_eq!(sub_agents[0].agent_type, SubAgentType::Exploration);
        assert!(sub_agents[0].token_cost > 0);
        assert_eq!(sub_agents[0].timestamp, 1767225600000);
    }

    #[test]
    fn extract_context_notes_picks_up_read_tool_calls_only() {
        use crate::transcript::entry::{EntryMeta, ToolCallEntry};

        let entries = vec![
            TranscriptEntry::ToolCall(ToolCallEntry {
                meta: EntryMeta::default(),
                tool_name: "Read".to_string(),
                input: None,
                file_path: Some("/repo/src/lib.rs".to_string()),
            }),
            TranscriptEntry::ToolCall(ToolCallEntry {
                meta: EntryMeta::default(),
                tool_name: "Bash".to_string(),
                input: None,
                file_path: None,
            }),
        ];

        let notes = extract_context_notes(&entries, Path::new("/repo"));
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].name, "lib.rs");
        assert_eq!(notes[0].relative_path, "src/lib.rs");
        assert_eq!(notes[0].source, "read");
    }

    #[test]
    fn merge_plan_versions_filename_on_title_collision_with_different_text() {
        let mut index = ProjectIndex::default();
        merge_plan(&mut index, "My Plan", &content_hash("version a"), "s1", 100);
        merge_plan(&mut index, "My Plan", &content_hash("version b"), "s2", 100);

        assert_eq!(index.plans.len(), 2);
        assert_eq!(index.plans[0].filename, "my-plan.md");
        assert_eq!(index.plans[1].filename, "my-plan-2.md");
    }
}
