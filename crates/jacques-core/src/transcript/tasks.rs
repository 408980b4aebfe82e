//! Task-signal extraction: deduplicated todo/task entries surfaced from
//! `TodoWrite`-style tool calls and `system` entries with a task subtype.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::entry::TranscriptEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSignal {
    pub id: String,
    pub title: String,
    pub status: TaskStatus,
}

/// Extracts the latest known state of every task mentioned across the
/// transcript. Later entries for the same task id overwrite earlier ones,
/// so the result reflects final status even if it flickered mid-session.
pub fn extract_task_signals(entries: &[TranscriptEntry]) -> Vec<TaskSignal> {
    let mut by_id: HashMap<String, TaskSignal> = HashMap::new();
    let mut order: Vec<String> = Vec::new();

    for entry in entries {
        let items = match entry {
            TranscriptEntry::ToolCall(call) if is_todo_tool(&call.tool_name) => {
                todo_items_from_input(call.input.as_ref())
            }
            TranscriptEntry::System(system) if is_task_subtype(system.subtype.as_deref()) => {
                system
                    .text
                    .as_deref()
                    .map(todo_items_from_text)
                    .unwrap_or_default()
            }
            _ => Vec::new(),
        };

        for item in items {
            if !by_id.contains_key(&item.id) {
                order.push(item.id.clone());
            }
            by_id.insert(item.id.clone(), item);
        }
    }

    order
        .into_iter()
        .filter_map(|id| by_id.remove(&id))
        .collect()
}

fn is_todo_tool(name: &str) -> bool {
    name.eq_ignore_ascii_case("todowrite") || name.eq_ignore_ascii_case("todo_write")
}

fn is_task_subtype(subtype: Option<&str>) -> bool {
    matches!(subtype, Some("task_create") | Some("task_update"))
}

fn todo_items_from_input(input: Option<&serde_json::Value>) -> Vec<TaskSignal> {
    let Some(value) = input else { return Vec::new() };
    let todos = value.get("todos").unwrap_or(value);
    let Some(list) = todos.as_array() else {
        return Vec::new();
    };

    list.iter()
        .enumerate()
        .filter_map(|(index, item)| {
            let title = item.get("content").or_else(|| item.get("title"))?.as_str()?;
            let status_raw = item
                .get("status")
                .and_then(|s| s.as_str())
                .unwrap_or("pending");
            let id = item
                .get("id")
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| format!("todo-{}", index));

            Some(TaskSignal {
                id,
                title: title.to_string(),
                status: parse_status(status_raw),
            })
        })
        .collect()
}

fn todo_items_from_text(text: &str) -> Vec<TaskSignal> {
    text.lines()
        .enumerate()
        .filter_map(|(index, line)| {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                return None;
            }
            Some(TaskSignal {
                id: format!("task-{}", index),
                title: trimmed.to_string(),
                status: TaskStatus::Pending,
            })
        })
        .collect()
}

fn parse_status(raw: &str) -> TaskStatus {
    match raw.to_lowercase().as_str() {
        "in_progress" | "in-progress" | "inprogress" => TaskStatus::InProgress,
        "completed" | "done" => TaskStatus::Completed,
        _ => TaskStatus::Pending,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::entry::{EntryMeta, ToolCallEntry};
    use serde_json::json;

    #[test]
    fn later_status_update_overwrites_earlier_for_same_id() {
        let entries = vec![
            TranscriptEntry::ToolCall(ToolCallEntry {
                meta: EntryMeta::default(),
                tool_name: "TodoWrite".to_string(),
                input: Some(json!({"todos": [{"id": "t1", "content": "write tests", "status": "pending"}]})),
                file_path: None,
            }),
            TranscriptEntry::ToolCall(ToolCallEntry {
                meta: EntryMeta::default(),
                tool_name: "TodoWrite".to_string(),
                input: Some(json!({"todos": [{"id": "t1", "content": "write tests", "status": "completed"}]})),
                file_path: None,
            }),
        ];

        let signals = extract_task_signals(&entries);
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].status, TaskStatus::Completed);
    }

    #[test]
    fn unrelated_tool_calls_contribute_nothing() {
        let entries = vec![TranscriptEntry::ToolCall(ToolCallEntry {
            meta: EntryMeta::default(),
            tool_name: "Read".to_string(),
            input: None,
            file_path: None,
        })];

        assert!(extract_task_signals(&entries).is_empty());
    }
}
