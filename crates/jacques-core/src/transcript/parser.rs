//! Lazy, line-oriented NDJSON parsing. A transcript is read once per poll
//! rather than kept open; malformed lines are skipped and counted, never
//! fatal (spec §4.1 — transcripts are written by a process we don't control
//! and may be read mid-write).

use std::io::{BufRead, BufReader};
use std::path::Path;

use fs_err as fs;

use crate::error::{Error, Result};

use super::entry::TranscriptEntry;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseStats {
    pub total_lines: usize,
    pub malformed_lines: usize,
}

pub fn parse_transcript(path: &Path) -> Result<(Vec<TranscriptEntry>, ParseStats)> {
    let file = fs::File::open(path).map_err(|e| Error::io("open transcript", e))?;
    let reader = BufReader::new(file);
    let mut entries = Vec::new();
    let mut stats = ParseStats::default();

    for line in reader.lines() {
        let line = match line {
            Ok(line) => line,
            Err(_) => {
                stats.total_lines += 1;
                stats.malformed_lines += 1;
                continue;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        stats.total_lines += 1;
        match serde_json::from_str::<TranscriptEntry>(&line) {
            Ok(entry) => entries.push(entry),
            Err(_) => stats.malformed_lines += 1,
        }
    }

    Ok((entries, stats))
}

/// Same as [`parse_transcript`] but over an in-memory string, for tests and
/// for re-parsing a buffered tail without touching the filesystem.
pub fn parse_str(content: &str) -> (Vec<TranscriptEntry>, ParseStats) {
    let mut entries = Vec::new();
    let mut stats = ParseStats::default();

    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }
        stats.total_lines += 1;
        match serde_json::from_str::<TranscriptEntry>(line) {
            Ok(entry) => entries.push(entry),
            Err(_) => stats.malformed_lines += 1,
        }
    }

    (entries, stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_malformed_lines_without_aborting() {
        let content = concat!(
            r#"{"type":"user_message","text":"hello","timestamp":"2026-01-01T00:00:00Z"}"#,
            "\n",
            "not json at all\n",
            r#"{"type":"assistant_message","text":"hi back"}"#,
            "\n",
        );

        let (entries, stats) = parse_str(content);
        assert_eq!(entries.len(), 2);
        assert_eq!(stats.total_lines, 3);
        assert_eq!(stats.malformed_lines, 1);
    }

    #[test]
    fn unknown_type_tag_counts_as_malformed() {
        let content = r#"{"type":"some_future_type","text":"x"}"#;
        let (entries, stats) = parse_str(content);
        assert!(entries.is_empty());
        assert_eq!(stats.malformed_lines, 1);
    }

    #[test]
    fn blank_lines_are_ignored_not_counted() {
        let content = "\n\n   \n";
        let (entries, stats) = parse_str(content);
        assert!(entries.is_empty());
        assert_eq!(stats.total_lines, 0);
    }
}
