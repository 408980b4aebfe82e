//! Stream-parses newline-delimited JSON transcripts into typed entries and
//! computes per-turn and per-session statistics (spec §4.1).

pub mod entry;
pub mod parser;
pub mod plans;
pub mod stats;
pub mod tasks;
pub mod web_search;

pub use entry::{EntryMeta, TokenUsage, TranscriptEntry};
pub use parser::{parse_str, parse_transcript, ParseStats};
pub use plans::{detect_mode_and_plans, plan_text_at};
pub use stats::{estimate_tokens, get_entry_statistics, EntryStatistics};
pub use tasks::{extract_task_signals, TaskSignal, TaskStatus};
pub use web_search::extract_web_searches;
