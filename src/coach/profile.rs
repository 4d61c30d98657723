use crate::utils::ensure_parent_exists;

use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs::{read_to_string, write};
use std::path::Path;

/// Keep only the most recent entries of each tracked list.
pub const PROFILE_LIST_CAP: usize = 10;
pub const PROFILE_INSIGHTS_CAP: usize = 5;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserProfile {
    pub name: String,
    pub location: String,
    pub total_conversations: usize,
    pub recurring_themes: Vec<String>,
    pub growth_areas: Vec<String>,
    pub goals: Vec<String>,
    pub strengths: Vec<String>,
    pub challenges: Vec<String>,
    pub insights: Vec<String>,
    pub first_conversation: Option<String>,
    pub last_conversation: Option<String>,
}

impl UserProfile {
    /// A missing or malformed file yields a fresh profile rather than an error.
    pub fn load(path: &Path) -> Self {
        match read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(profile) => profile,
                Err(err) => {
                    warn!(
                        "Malformed user profile at {}, starting fresh, {err}",
                        path.display()
                    );
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        ensure_parent_exists(path)?;
        let content = serde_json::to_string_pretty(self)
            .with_context(|| "Failed to serialize user profile")?;
        write(path, content)
            .with_context(|| format!("Failed to write user profile to {}", path.display()))
    }

    pub fn record_exchange(&mut self, timestamp: &str, total_conversations: usize) {
        self.total_conversations = total_conversations;
        self.last_conversation = Some(timestamp.to_string());
        if self.first_conversation.is_none() {
            self.first_conversation = Some(timestamp.to_string());
        }
    }

    pub fn cap_lists(&mut self) {
        for list in [
            &mut self.recurring_themes,
            &mut self.growth_areas,
            &mut self.goals,
            &mut self.challenges,
        ] {
            cap(list, PROFILE_LIST_CAP);
        }
        cap(&mut self.insights, PROFILE_INSIGHTS_CAP);
    }
}

fn cap(list: &mut Vec<String>, n: usize) {
    if list.len() > n {
        list.drain(..list.len() - n);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_load_missing_and_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile.json");

        assert_eq!(UserProfile::load(&path), UserProfile::default());

        std::fs::write(&path, "[]").unwrap();
        assert_eq!(UserProfile::load(&path), UserProfile::default());
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profile.json");

        let mut profile = UserProfile::default();
        profile.name = "Steve".into();
        profile.location = "Austin, TX".into();
        profile.goals.push("start a business".into());
        profile.record_exchange("2025-01-01T10:00:00+00:00", 1);
        profile.save(&path).unwrap();

        assert_eq!(UserProfile::load(&path), profile);
    }

    #[test]
    fn test_record_exchange() {
        let mut profile = UserProfile::default();
        profile.record_exchange("ts-1", 1);
        assert_eq!(profile.first_conversation.as_deref(), Some("ts-1"));
        assert_eq!(profile.last_conversation.as_deref(), Some("ts-1"));
        assert_eq!(profile.total_conversations, 1);

        profile.record_exchange("ts-2", 2);
        assert_eq!(profile.first_conversation.as_deref(), Some("ts-1"));
        assert_eq!(profile.last_conversation.as_deref(), Some("ts-2"));
        assert_eq!(profile.total_conversations, 2);
    }

    #[test]
    fn test_cap_lists() {
        let mut profile = UserProfile::default();
        profile.recurring_themes = (0..13).map(|i| format!("theme {i}")).collect();
        profile.insights = (0..7).map(|i| format!("insight {i}")).collect();
        profile.cap_lists();

        assert_eq!(profile.recurring_themes.len(), PROFILE_LIST_CAP);
        assert_eq!(profile.recurring_themes[0], "theme 3");
        assert_eq!(profile.recurring_themes[9], "theme 12");

        assert_eq!(profile.insights.len(), PROFILE_INSIGHTS_CAP);
        assert_eq!(profile.insights[0], "insight 2");
    }
}
