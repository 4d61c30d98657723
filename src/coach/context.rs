use super::{ConversationRecord, UserProfile};

use std::collections::HashSet;

/// How far back to scan for similar conversations.
pub const RECENT_WINDOW: usize = 10;
/// Shared lowercase words needed to consider two questions similar.
pub const MIN_WORD_OVERLAP: usize = 2;

const MAX_RELEVANT: usize = 2;
const QUESTION_SNIPPET_LEN: usize = 100;
const RESPONSE_SNIPPET_LEN: usize = 150;

const CONTEXT_THEMES: usize = 5;
const CONTEXT_GROWTH_AREAS: usize = 3;
const CONTEXT_GOALS: usize = 3;

/// Builds the memory context block spliced into the system prompt.
/// Returns an empty string when there is nothing worth recalling.
pub fn assemble_context(
    question: &str,
    profile: &UserProfile,
    conversations: &[ConversationRecord],
) -> String {
    let mut context: Vec<String> = vec![];

    let mut personal_info = vec![];
    if !profile.name.is_empty() {
        personal_info.push(format!("User's name: {}", profile.name));
    }
    if !profile.location.is_empty() {
        personal_info.push(format!("Location: {}", profile.location));
    }
    if !personal_info.is_empty() {
        context.push(format!(
            "Personal Information: {}",
            personal_info.join(", ")
        ));
    }

    if !profile.recurring_themes.is_empty() {
        context.push(format!(
            "User's recurring themes: {}",
            last_n(&profile.recurring_themes, CONTEXT_THEMES).join(", ")
        ));
    }
    if !profile.growth_areas.is_empty() {
        context.push(format!(
            "Growth areas: {}",
            last_n(&profile.growth_areas, CONTEXT_GROWTH_AREAS).join(", ")
        ));
    }
    if !profile.goals.is_empty() {
        context.push(format!(
            "Current goals: {}",
            last_n(&profile.goals, CONTEXT_GOALS).join(", ")
        ));
    }

    let current_words = word_set(question);
    let relevant: Vec<&ConversationRecord> = last_n(conversations, RECENT_WINDOW)
        .iter()
        .filter(|convo| {
            word_set(&convo.question)
                .intersection(&current_words)
                .count()
                >= MIN_WORD_OVERLAP
        })
        .collect();

    if !relevant.is_empty() {
        context.push("Recent similar conversations:".into());
        for convo in last_n(&relevant, MAX_RELEVANT) {
            context.push(format!(
                "- Q: {}... A: {}...",
                truncate_chars(&convo.question, QUESTION_SNIPPET_LEN),
                truncate_chars(&convo.response, RESPONSE_SNIPPET_LEN),
            ));
        }
    }

    context.join("\n")
}

fn word_set(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(|v| v.to_string())
        .collect()
}

fn last_n<T>(list: &[T], n: usize) -> &[T] {
    &list[list.len().saturating_sub(n)..]
}

fn truncate_chars(text: &str, n: usize) -> &str {
    match text.char_indices().nth(n) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn record(question: &str, response: &str) -> ConversationRecord {
        ConversationRecord {
            question: question.into(),
            response: response.into(),
            timestamp: "2025-01-01T10:00:00+00:00".into(),
            has_audio: false,
            is_favorite: false,
        }
    }

    #[test]
    fn test_empty_when_nothing_to_recall() {
        let profile = UserProfile::default();
        assert_eq!(assemble_context("How do I grow?", &profile, &[]), "");
    }

    #[test]
    fn test_profile_sentences() {
        let mut profile = UserProfile::default();
        profile.name = "Steve".into();
        profile.location = "Austin, TX".into();
        profile.recurring_themes = (1..=7).map(|i| format!("theme{i}")).collect();
        profile.growth_areas = vec!["patience".into(), "focus".into(), "rest".into(), "candor".into()];
        profile.goals = vec!["write a book".into()];

        let context = assemble_context("Something novel entirely?", &profile, &[]);
        let lines: Vec<&str> = context.lines().collect();
        assert_eq!(
            lines,
            vec![
                "Personal Information: User's name: Steve, Location: Austin, TX",
                "User's recurring themes: theme3, theme4, theme5, theme6, theme7",
                "Growth areas: focus, rest, candor",
                "Current goals: write a book",
            ]
        );
    }

    #[test]
    fn test_word_overlap_threshold() {
        let profile = UserProfile::default();
        let conversations = vec![
            record("thinking about money", "Profits are better than wages."),
            record("how should I build discipline", "Discipline is the bridge."),
        ];

        // one shared word is not enough
        let context = assemble_context("my money worries", &profile, &conversations);
        assert_eq!(context, "");

        let context = assemble_context(
            "how should I approach saving",
            &profile,
            &conversations,
        );
        assert_eq!(
            context,
            "Recent similar conversations:\n- Q: how should I build discipline... A: Discipline is the bridge...."
        );
    }

    #[test]
    fn test_overlap_is_case_insensitive() {
        let profile = UserProfile::default();
        let conversations = vec![record(
            "Setting Goals For Next Year",
            "Goals are the fuel in the furnace of achievement.",
        )];
        let context = assemble_context("setting goals today", &profile, &conversations);
        assert!(context.starts_with("Recent similar conversations:"));
    }

    #[test]
    fn test_scan_window_and_last_two() {
        let profile = UserProfile::default();
        let mut conversations = vec![record("setting goals number zero", "Answer zero.")];
        for i in 1..=10 {
            conversations.push(record(
                &format!("filler question item {i}"),
                &format!("Answer {i}."),
            ));
        }
        // record zero fell outside the 10-conversation window
        let context = assemble_context("setting goals number eleven", &profile, &conversations);
        assert_eq!(context, "");

        // three matches inside the window keep only the last two
        let mut conversations = vec![];
        for i in 1..=3 {
            conversations.push(record(
                &format!("setting goals attempt {i}"),
                &format!("Answer {i}."),
            ));
        }
        let context = assemble_context("setting goals again", &profile, &conversations);
        assert_eq!(
            context,
            "Recent similar conversations:\n\
             - Q: setting goals attempt 2... A: Answer 2....\n\
             - Q: setting goals attempt 3... A: Answer 3...."
        );
    }

    #[test]
    fn test_snippet_truncation() {
        let profile = UserProfile::default();
        let long_question = "goals money ".repeat(15);
        let long_response = "answer ".repeat(40);
        let conversations = vec![record(long_question.trim(), long_response.trim())];

        let context = assemble_context("my goals money", &profile, &conversations);
        let line = context.lines().nth(1).unwrap();
        let q_part = line
            .strip_prefix("- Q: ")
            .and_then(|v| v.split_once("... A: "))
            .unwrap();
        assert_eq!(q_part.0.chars().count(), 100);
        assert!(q_part.1.ends_with("..."));
        assert_eq!(q_part.1.chars().count(), 150 + 3);
    }
}
