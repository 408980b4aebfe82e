//! Typed transcript entries.
//!
//! A session transcript is a stream of NDJSON objects. Each carries a `type`
//! tag; everything else about its shape depends on that tag, so entries are
//! modeled as a tagged enum rather than one loose struct.

use serde::{Deserialize, Serialize};

/// Fields common to every entry, flattened into each variant.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EntryMeta {
    pub timestamp: Option<String>,
    pub uuid: Option<String>,
    pub parent_uuid: Option<String>,
}

/// Token usage as reported on an assistant turn. Upstream transcripts
/// sometimes render these as strings rather than numbers; both are accepted.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TokenUsage {
    #[serde(default, deserialize_with = "deserialize_lenient_u64")]
    pub input_tokens: u64,
    #[serde(default, deserialize_with = "deserialize_lenient_u64")]
    pub output_tokens: u64,
    #[serde(default, deserialize_with = "deserialize_lenient_u64")]
    pub cache_creation_input_tokens: u64,
    #[serde(default, deserialize_with = "deserialize_lenient_u64")]
    pub cache_read_input_tokens: u64,
}

fn deserialize_lenient_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Lenient {
        Number(u64),
        Text(String),
    }

    match Option::<Lenient>::deserialize(deserializer)? {
        Some(Lenient::Number(n)) => Ok(n),
        Some(Lenient::Text(s)) => Ok(s.parse().unwrap_or(0)),
        None => Ok(0),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserMessageEntry {
    #[serde(flatten)]
    pub meta: EntryMeta,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantMessageEntry {
    #[serde(flatten)]
    pub meta: EntryMeta,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub usage: Option<TokenUsage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallEntry {
    #[serde(flatten)]
    pub meta: EntryMeta,
    pub tool_name: String,
    #[serde(default)]
    pub input: Option<serde_json::Value>,
    #[serde(default)]
    pub file_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResultEntry {
    #[serde(flatten)]
    pub meta: EntryMeta,
    #[serde(default)]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default)]
    pub output: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProgressEntry {
    #[serde(flatten)]
    pub meta: EntryMeta,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSearchEntry {
    #[serde(flatten)]
    pub meta: EntryMeta,
    #[serde(default)]
    pub query: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryEntry {
    #[serde(flatten)]
    pub meta: EntryMeta,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemEntry {
    #[serde(flatten)]
    pub meta: EntryMeta,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TranscriptEntry {
    UserMessage(UserMessageEntry),
    AssistantMessage(AssistantMessageEntry),
    ToolCall(ToolCallEntry),
    ToolResult(ToolResultEntry),
    AgentProgress(AgentProgressEntry),
    WebSearch(WebSearchEntry),
    Summary(SummaryEntry),
    System(SystemEntry),
}

impl TranscriptEntry {
    pub fn meta(&self) -> &EntryMeta {
        match self {
            TranscriptEntry::UserMessage(e) => &e.meta,
            TranscriptEntry::AssistantMessage(e) => &e.meta,
            TranscriptEntry::ToolCall(e) => &e.meta,
            TranscriptEntry::ToolResult(e) => &e.meta,
            TranscriptEntry::AgentProgress(e) => &e.meta,
            TranscriptEntry::WebSearch(e) => &e.meta,
            TranscriptEntry::Summary(e) => &e.meta,
            TranscriptEntry::System(e) => &e.meta,
        }
    }

    /// Text this entry would contribute to plan/heading detection, if any.
    pub fn searchable_text(&self) -> Option<&str> {
        match self {
            TranscriptEntry::UserMessage(e) => Some(e.text.as_str()),
            TranscriptEntry::AssistantMessage(e) => Some(e.text.as_str()),
            TranscriptEntry::AgentProgress(e) => e.message.as_deref(),
            TranscriptEntry::Summary(e) => e.text.as_deref(),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TranscriptEntry::UserMessage(_) => "user_message",
            TranscriptEntry::AssistantMessage(_) => "assistant_message",
            TranscriptEntry::ToolCall(_) => "tool_call",
            TranscriptEntry::ToolResult(_) => "tool_result",
            TranscriptEntry::AgentProgress(_) => "agent_progress",
            TranscriptEntry::WebSearch(_) => "web_search",
            TranscriptEntry::Summary(_) => "summary",
            TranscriptEntry::System(_) => "system",
        }
    }
}
