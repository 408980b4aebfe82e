//! Heading-pattern plan detection (spec §4.1 / §4.3).
//!
//! A plan is recognized two ways: an *embedded* heading inside a user or
//! assistant message, or a *write*-source file dropped under
//! `.jacques/plans/` matching `*plan*.md`. Detection is intentionally
//! conservative — fixed, case-insensitive phrases, first match wins ties —
//! rather than a heuristic classifier, so results are reproducible across
//! re-parses of the same transcript.

use std::path::Path;

use jacques_protocol::{PlanRef, PlanSource};

use super::entry::TranscriptEntry;

/// Checked in order; the first pattern found in a message wins.
const HEADING_PATTERNS: &[&str] = &[
    "implement the following plan",
    "here is the plan",
    "follow this plan",
];

/// The text a plan at `message_index` (as produced by [`detect_mode_and_plans`])
/// would show in a detail view. `None` if the index is out of range or the
/// entry carries no searchable text (spec §6: `GET /api/sessions/:id/plans/:messageIndex`).
pub fn plan_text_at(entries: &[TranscriptEntry], message_index: usize) -> Option<String> {
    entries.get(message_index)?.searchable_text().map(str::to_string)
}

pub fn detect_mode_and_plans(entries: &[TranscriptEntry]) -> Vec<PlanRef> {
    let mut plans = Vec::new();

    for (index, entry) in entries.iter().enumerate() {
        match entry {
            TranscriptEntry::ToolCall(call) => {
                if let Some(plan) = detect_write_plan(call, index) {
                    plans.push(plan);
                }
            }
            TranscriptEntry::AgentProgress(progress) => {
                if let Some(text) = progress.message.as_deref() {
                    if let Some(plan) = detect_heading_plan(text, index, PlanSource::Agent) {
                        plans.push(plan);
                    }
                }
            }
            _ => {
                if let Some(text) = entry.searchable_text() {
                    if let Some(plan) = detect_heading_plan(text, index, PlanSource::Embedded) {
                        plans.push(plan);
                    }
                }
            }
        }
    }

    plans
}

fn detect_heading_plan(text: &str, message_index: usize, source: PlanSource) -> Option<PlanRef> {
    let lowered = text.to_lowercase();
    HEADING_PATTERNS.iter().find(|pattern| lowered.contains(*pattern))?;

    Some(PlanRef {
        title: extract_title(text),
        source,
        message_index,
        file_path: None,
        catalog_id: None,
    })
}

fn detect_write_plan(call: &super::entry::ToolCallEntry, message_index: usize) -> Option<PlanRef> {
    if !call.tool_name.eq_ignore_ascii_case("write") {
        return None;
    }
    let file_path = call.file_path.as_deref()?;
    if !is_plan_file(file_path) {
        return None;
    }

    let title = Path::new(file_path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("plan")
        .to_string();

    Some(PlanRef {
        title,
        source: PlanSource::Write,
        message_index,
        file_path: Some(file_path.to_string()),
        catalog_id: None,
    })
}

fn is_plan_file(path: &str) -> bool {
    let normalized = path.replace('\\', "/");
    if !normalized.contains("/.jacques/plans/") && !normalized.starts_with(".jacques/plans/") {
        return false;
    }
    let file_name = Path::new(&normalized)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");
    file_name.to_lowercase().contains("plan") && file_name.ends_with(".md")
}

fn extract_title(text: &str) -> String {
    for line in text.lines() {
        let trimmed = line.trim();
        if let Some(heading) = trimmed.strip_prefix("# ") {
            if !heading.trim().is_empty() {
                return heading.trim().to_string();
            }
        }
    }
    text.lines()
        .find(|line| !line.trim().is_empty())
        .map(|line| line.trim().to_string())
        .unwrap_or_else(|| "Untitled plan".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::entry::{AssistantMessageEntry, EntryMeta, ToolCallEntry};

    #[test]
    fn detects_embedded_plan_with_h1_title() {
        let entries = vec![TranscriptEntry::AssistantMessage(AssistantMessageEntry {
            meta: EntryMeta::default(),
            text: "# Add retry logic\n\nHere is the plan:\n1. do a thing".to_string(),
            usage: None,
        })];

        let plans = detect_mode_and_plans(&entries);
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].title, "Add retry logic");
        assert_eq!(plans[0].source, PlanSource::Embedded);
    }

    #[test]
    fn first_matching_pattern_wins_tie() {
        let text = "Here is the plan, and also follow this plan strictly.";
        let plan = detect_heading_plan(text, 0, PlanSource::Embedded).unwrap();
        assert_eq!(plan.source, PlanSource::Embedded);
    }

    #[test]
    fn detects_write_source_plan_file() {
        let entries = vec![TranscriptEntry::ToolCall(ToolCallEntry {
            meta: EntryMeta::default(),
            tool_name: "Write".to_string(),
            input: None,
            file_path: Some(".jacques/plans/refactor-plan.md".to_string()),
        })];

        let plans = detect_mode_and_plans(&entries);
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].source, PlanSource::Write);
        assert_eq!(plans[0].title, "refactor-plan");
    }

    #[test]
    fn ignores_non_plan_write_targets() {
        let entries = vec![TranscriptEntry::ToolCall(ToolCallEntry {
            meta: EntryMeta::default(),
            tool_name: "Write".to_string(),
            input: None,
            file_path: Some("src/main.rs".to_string()),
        })];

        assert!(detect_mode_and_plans(&entries).is_empty());
    }
}
