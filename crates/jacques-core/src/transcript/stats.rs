//! One-pass entry statistics. Context usage is taken from the *last* turn's
//! reported numbers, never summed across turns — token counts are cumulative
//! snapshots, not deltas (spec §4.1).

use std::collections::HashMap;

use super::entry::TranscriptEntry;

#[derive(Debug, Clone, Default)]
pub struct EntryStatistics {
    pub counts_by_kind: HashMap<String, usize>,
    pub total_entries: usize,
    /// Sum of every assistant turn's reported input/output tokens. This is
    /// a running total across the transcript, distinct from the last-turn
    /// snapshot below — summing context-size snapshots would overcount,
    /// but a running total of tokens actually spent is exactly a sum.
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub last_turn_input_tokens: u64,
    pub last_turn_output_tokens: u64,
    pub last_turn_cache_creation_tokens: u64,
    pub last_turn_cache_read_tokens: u64,
    pub estimated_total_output_tokens: u64,
}

/// Rough token estimator for entries that never report usage (user turns,
/// tool output), used only to approximate context growth between real
/// assistant-reported snapshots.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(4)
}

pub fn get_entry_statistics(entries: &[TranscriptEntry]) -> EntryStatistics {
    let mut stats = EntryStatistics::default();

    for entry in entries {
        stats.total_entries += 1;
        *stats
            .counts_by_kind
            .entry(entry.kind().to_string())
            .or_insert(0) += 1;

        if let TranscriptEntry::AssistantMessage(msg) = entry {
            if let Some(usage) = &msg.usage {
                stats.total_input_tokens += usage.input_tokens;
                stats.total_output_tokens += usage.output_tokens;
                stats.last_turn_input_tokens = usage.input_tokens;
                stats.last_turn_output_tokens = usage.output_tokens;
                stats.last_turn_cache_creation_tokens = usage.cache_creation_input_tokens;
                stats.last_turn_cache_read_tokens = usage.cache_read_input_tokens;
            } else {
                stats.estimated_total_output_tokens += estimate_tokens(&msg.text);
            }
        }
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::super::entry::{AssistantMessageEntry, EntryMeta, TokenUsage, UserMessageEntry};
    use super::*;

    #[test]
    fn last_turn_usage_wins_over_earlier_turns() {
        let entries = vec![
            TranscriptEntry::AssistantMessage(AssistantMessageEntry {
                meta: EntryMeta::default(),
                text: "first".to_string(),
                usage: Some(TokenUsage {
                    input_tokens: 100,
                    output_tokens: 50,
                    cache_creation_input_tokens: 0,
                    cache_read_input_tokens: 0,
                }),
            }),
            TranscriptEntry::AssistantMessage(AssistantMessageEntry {
                meta: EntryMeta::default(),
                text: "second".to_string(),
                usage: Some(TokenUsage {
                    input_tokens: 4000,
                    output_tokens: 120,
                    cache_creation_input_tokens: 10,
                    cache_read_input_tokens: 200,
                }),
            }),
        ];

        let stats = get_entry_statistics(&entries);
        assert_eq!(stats.last_turn_input_tokens, 4000);
        assert_eq!(stats.last_turn_output_tokens, 120);
        assert_eq!(stats.total_input_tokens, 4100);
        assert_eq!(stats.total_output_tokens, 170);
    }

    #[test]
    fn counts_entries_by_kind() {
        let entries = vec![
            TranscriptEntry::UserMessage(UserMessageEntry {
                meta: EntryMeta::default(),
                text: "hi".to_string(),
            }),
            TranscriptEntry::UserMessage(UserMessageEntry {
                meta: EntryMeta::default(),
                text: "again".to_string(),
            }),
        ];

        let stats = get_entry_statistics(&entries);
        assert_eq!(stats.counts_by_kind.get("user_message"), Some(&2));
        assert_eq!(stats.total_entries, 2);
    }
}
