//! Web-search signal extraction: the raw `web_search` entries a transcript
//! reports, surfaced for the session detail view.

use jacques_protocol::WebSearchRecord;

use super::entry::TranscriptEntry;

pub fn extract_web_searches(entries: &[TranscriptEntry]) -> Vec<WebSearchRecord> {
    entries
        .iter()
        .filter_map(|entry| match entry {
            TranscriptEntry::WebSearch(search) => Some(WebSearchRecord {
                query: search.query.clone(),
                timestamp: search.meta.timestamp.clone(),
            }),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::entry::{EntryMeta, WebSearchEntry};

    #[test]
    fn collects_queries_in_order() {
        let entries = vec![
            TranscriptEntry::WebSearch(WebSearchEntry {
                meta: EntryMeta { timestamp: Some("2026-01-01T00:00:00Z".to_string()), uuid: None, parent_uuid: None },
                query: Some("rust async runtimes".to_string()),
            }),
            TranscriptEntry::UserMessage(crate::transcript::entry::UserMessageEntry {
                meta: EntryMeta::default(),
                text: "thanks".to_string(),
            }),
        ];

        let searches = extract_web_searches(&entries);
        assert_eq!(searches.len(), 1);
        assert_eq!(searches[0].query.as_deref(), Some("rust async runtimes"));
    }
}
