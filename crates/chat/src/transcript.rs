//! Append-only question/answer transcript
//!
//! Write failures are logged and swallowed so the chat keeps answering.

use chrono::{DateTime, Local};
use citegraph_common::config::TranscriptConfig;
use std::path::PathBuf;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

pub struct Transcript {
    path: PathBuf,
    enabled: bool,
}

impl Transcript {
    pub fn new(config: &TranscriptConfig) -> Self {
        Self {
            path: PathBuf::from(&config.path),
            enabled: config.enabled,
        }
    }

    fn format_entry(timestamp: DateTime<Local>, question: &str, answer: &str) -> String {
        format!(
            "--- {} ---\nquestion: {}\nanswer: {}\n{}\n\n",
            timestamp.format("%Y-%m-%d %H:%M:%S"),
            question,
            answer,
            "-".repeat(20)
        )
    }

    async fn append(&self, entry: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(entry.as_bytes()).await?;
        file.flush().await
    }

    /// Append one exchange; returns whether it was written
    pub async fn record(&self, question: &str, answer: &str) -> bool {
        if !self.enabled {
            return false;
        }

        let entry = Self::format_entry(Local::now(), question, answer);
        match self.append(&entry).await {
            Ok(()) => {
                debug!(path = %self.path.display(), "Transcript entry written");
                true
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to write transcript entry");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn transcript(path: PathBuf, enabled: bool) -> Transcript {
        Transcript::new(&TranscriptConfig {
            path: path.display().to_string(),
            enabled,
        })
    }

    #[test]
    fn test_entry_format() {
        let timestamp = Local.with_ymd_and_hms(2025, 3, 14, 9, 30, 0).unwrap();
        let entry = Transcript::format_entry(timestamp, "When are fees due?", "In January.");
        assert_eq!(
            entry,
            "--- 2025-03-14 09:30:00 ---\nquestion: When are fees due?\nanswer: In January.\n--------------------\n\n"
        );
    }

    #[tokio::test]
    async fn test_entries_are_appended() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("chat_history.txt");
        let transcript = transcript(path.clone(), true);

        assert!(transcript.record("first question", "first answer").await);
        assert!(transcript.record("second question", "second answer").await);

        let contents = std::fs::read_to_string(path).unwrap();
        let first = contents.find("question: first question").unwrap();
        let second = contents.find("question: second question").unwrap();
        assert!(first < second);
        assert_eq!(contents.matches("answer: ").count(), 2);
    }

    #[tokio::test]
    async fn test_write_failure_is_swallowed() {
        let dir = TempDir::new().unwrap();
        let transcript = transcript(dir.path().join("missing").join("chat_history.txt"), true);

        assert!(!transcript.record("question", "answer").await);
    }

    #[tokio::test]
    async fn test_disabled_transcript_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("chat_history.txt");

        assert!(!transcript(path.clone(), false).record("question", "answer").await);
        assert!(!path.exists());
    }
}
