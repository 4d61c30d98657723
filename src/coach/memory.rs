use crate::utils::ensure_parent_exists;

use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs::{read_to_string, write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub question: String,
    pub response: String,
    pub timestamp: String,
    pub has_audio: bool,
    #[serde(default)]
    pub is_favorite: bool,
}

/// Append-only conversation history backed by a JSON file.
#[derive(Debug)]
pub struct ConversationStore {
    path: PathBuf,
    records: Vec<ConversationRecord>,
}

impl ConversationStore {
    /// A missing or malformed file yields an empty history rather than an error.
    pub fn load(path: &Path) -> Self {
        let records = match read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(records) => records,
                Err(err) => {
                    warn!(
                        "Malformed conversation history at {}, starting empty, {err}",
                        path.display()
                    );
                    vec![]
                }
            },
            Err(_) => vec![],
        };
        Self {
            path: path.to_path_buf(),
            records,
        }
    }

    pub fn save(&self) -> Result<()> {
        ensure_parent_exists(&self.path)?;
        let content = serde_json::to_string_pretty(&self.records)
            .with_context(|| "Failed to serialize conversation history")?;
        write(&self.path, content).with_context(|| {
            format!(
                "Failed to write conversation history to {}",
                self.path.display()
            )
        })
    }

    pub fn append(&mut self, record: ConversationRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[ConversationRecord] {
        &self.records
    }

    pub fn recent(&self, n: usize) -> &[ConversationRecord] {
        &self.records[self.records.len().saturating_sub(n)..]
    }

    /// Flips the favorite flag on the record with the matching timestamp,
    /// returns the new state.
    pub fn toggle_favorite(&mut self, timestamp: &str) -> Option<bool> {
        let record = self
            .records
            .iter_mut()
            .find(|v| v.timestamp == timestamp)?;
        record.is_favorite = !record.is_favorite;
        Some(record.is_favorite)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(question: &str, timestamp: &str) -> ConversationRecord {
        ConversationRecord {
            question: question.into(),
            response: format!("Answer to {question}"),
            timestamp: timestamp.into(),
            has_audio: false,
            is_favorite: false,
        }
    }

    #[test]
    fn test_load_save_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conversations.json");

        let mut store = ConversationStore::load(&path);
        assert!(store.is_empty());

        store.append(record("How do I set goals?", "2025-01-01T10:00:00+00:00"));
        store.append(record("What about discipline?", "2025-01-01T11:00:00+00:00"));
        store.save().unwrap();

        let reloaded = ConversationStore::load(&path);
        assert_eq!(reloaded.records(), store.records());
    }

    #[test]
    fn test_load_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conversations.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = ConversationStore::load(&path);
        assert!(store.is_empty());
    }

    #[test]
    fn test_load_missing_favorite_field() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conversations.json");
        std::fs::write(
            &path,
            r#"[{"question": "q", "response": "a", "timestamp": "t", "has_audio": true}]"#,
        )
        .unwrap();

        let store = ConversationStore::load(&path);
        assert_eq!(store.len(), 1);
        assert!(store.records()[0].has_audio);
        assert!(!store.records()[0].is_favorite);
    }

    #[test]
    fn test_recent() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ConversationStore::load(&dir.path().join("conversations.json"));
        for i in 0..12 {
            store.append(record(&format!("question {i}"), &format!("ts-{i}")));
        }
        let recent = store.recent(10);
        assert_eq!(recent.len(), 10);
        assert_eq!(recent[0].question, "question 2");
        assert_eq!(recent[9].question, "question 11");

        assert_eq!(store.recent(100).len(), 12);
    }

    #[test]
    fn test_toggle_favorite() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ConversationStore::load(&dir.path().join("conversations.json"));
        store.append(record("first", "ts-1"));
        store.append(record("second", "ts-2"));

        assert_eq!(store.toggle_favorite("ts-2"), Some(true));
        assert!(!store.records()[0].is_favorite);
        assert!(store.records()[1].is_favorite);

        assert_eq!(store.toggle_favorite("ts-2"), Some(false));
        assert_eq!(store.toggle_favorite("ts-404"), None);
    }
}
