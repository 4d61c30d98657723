use super::UserProfile;

use crate::client::{ChatApi, ChatCompletionsData, Message};

use anyhow::{Context, Result};
use fancy_regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;

pub const ANALYSIS_TEMPERATURE: f64 = 0.3;
pub const ANALYSIS_MAX_TOKENS: isize = 300;

/// What the analysis pass extracted from a single exchange.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProfileInsights {
    pub themes: Vec<String>,
    pub growth_areas: Vec<String>,
    pub goals: Vec<String>,
    pub challenges: Vec<String>,
    pub insights: Vec<String>,
}

/// Runs a low-temperature side call that mines the exchange for profile updates.
pub async fn analyze_conversation(
    client: &dyn ChatApi,
    question: &str,
    response: &str,
    profile: &UserProfile,
) -> Result<ProfileInsights> {
    let prompt = build_analysis_prompt(question, response, profile);
    let data = ChatCompletionsData {
        messages: vec![Message::system(&prompt)],
        temperature: Some(ANALYSIS_TEMPERATURE),
        max_tokens: Some(ANALYSIS_MAX_TOKENS),
    };
    let output = client.chat_completions(data).await?;
    parse_insights(&output.text)
}

pub fn build_analysis_prompt(question: &str, response: &str, profile: &UserProfile) -> String {
    let profile_json = serde_json::to_string_pretty(profile).unwrap_or_default();
    format!(
        r#"Analyze this conversation for themes and patterns:

User Question: "{question}"
Coach's Response: "{response}"

Current user profile: {profile_json}

Extract and return JSON with:
1. "themes" - Key themes from this conversation (max 3)
2. "growth_areas" - Areas where user needs development (max 2)
3. "goals" - Any goals mentioned or implied (max 2)
4. "challenges" - Challenges user is facing (max 2)
5. "insights" - Key insights about the user (max 1)

Keep responses concise and focus on actionable items."#
    )
}

/// Tolerates the model wrapping its JSON in a markdown fence.
pub fn parse_insights(text: &str) -> Result<ProfileInsights> {
    let text = text.trim();
    let text = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .unwrap_or(text);
    let text = text.strip_suffix("```").unwrap_or(text);
    serde_json::from_str(text.trim()).with_context(|| "Invalid analysis data")
}

/// Folds fresh insights into the profile, skipping duplicates and trimming
/// each list to its cap.
pub fn apply_insights(profile: &mut UserProfile, insights: &ProfileInsights) {
    for theme in &insights.themes {
        if !profile.recurring_themes.contains(theme) {
            profile.recurring_themes.push(theme.clone());
        }
    }
    for area in &insights.growth_areas {
        if !profile.growth_areas.contains(area) {
            profile.growth_areas.push(area.clone());
        }
    }
    for goal in &insights.goals {
        if !profile.goals.contains(goal) {
            profile.goals.push(goal.clone());
        }
    }
    for challenge in &insights.challenges {
        if !profile.challenges.contains(challenge) {
            profile.challenges.push(challenge.clone());
        }
    }
    for insight in &insights.insights {
        profile.insights.push(insight.clone());
    }
    profile.cap_lists();
}

static NAME_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"[Mm]y name is (\w+)",
        r"[Ii]'m (\w+)",
        r"[Nn]ame: (\w+)",
        r"[Cc]all me (\w+)",
    ]
    .iter()
    .map(|v| Regex::new(v).unwrap())
    .collect()
});

static LOCATION_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\(([^)]+, [A-Z]{2})\)",
        r"from ([A-Z][a-z]+, [A-Z]{2})",
        r"in ([A-Z][a-z]+, [A-Z]{2})",
    ]
    .iter()
    .map(|v| Regex::new(v).unwrap())
    .collect()
});

/// Picks up self-introductions like "my name is Steve" or "from Austin, TX".
pub fn extract_personal_details(profile: &mut UserProfile, question: &str) {
    for re in NAME_RES.iter() {
        if let Ok(Some(captures)) = re.captures(question) {
            if let Some(name) = captures.get(1).map(|v| v.as_str().trim()) {
                if name.chars().count() > 1 && name.chars().all(|c| c.is_alphabetic()) {
                    profile.name = name.to_string();
                    break;
                }
            }
        }
    }

    for re in LOCATION_RES.iter() {
        if let Ok(Some(captures)) = re.captures(question) {
            if let Some(location) = captures.get(1).map(|v| v.as_str().trim()) {
                if location.contains(',') {
                    profile.location = location.to_string();
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_insights() {
        let insights = parse_insights(r#"{"themes": ["discipline"], "goals": ["run a marathon"]}"#)
            .unwrap();
        assert_eq!(insights.themes, vec!["discipline"]);
        assert_eq!(insights.goals, vec!["run a marathon"]);
        assert!(insights.growth_areas.is_empty());

        let fenced = "```json\n{\"themes\": [\"habits\"]}\n```";
        assert_eq!(parse_insights(fenced).unwrap().themes, vec!["habits"]);

        assert!(parse_insights("I could not produce JSON, sorry.").is_err());
    }

    #[test]
    fn test_apply_insights_dedup_and_cap() {
        let mut profile = UserProfile::default();
        profile.recurring_themes = (0..10).map(|i| format!("theme {i}")).collect();

        let insights = ProfileInsights {
            themes: vec!["theme 9".into(), "a new theme".into()],
            insights: vec!["prefers concrete steps".into()],
            ..Default::default()
        };
        apply_insights(&mut profile, &insights);

        // duplicate skipped, new theme pushed out the oldest
        assert_eq!(profile.recurring_themes.len(), 10);
        assert_eq!(profile.recurring_themes[0], "theme 1");
        assert_eq!(profile.recurring_themes[9], "a new theme");
        assert_eq!(profile.insights, vec!["prefers concrete steps"]);
    }

    #[test]
    fn test_extract_name() {
        let mut profile = UserProfile::default();
        extract_personal_details(&mut profile, "Hi, my name is Steve and I need advice");
        assert_eq!(profile.name, "Steve");

        extract_personal_details(&mut profile, "People call me Dana these days");
        assert_eq!(profile.name, "Dana");

        // single letters and digits are rejected
        let mut profile = UserProfile::default();
        extract_personal_details(&mut profile, "my name is J");
        assert_eq!(profile.name, "");
        extract_personal_details(&mut profile, "my name is Steve2");
        assert_eq!(profile.name, "");
    }

    #[test]
    fn test_extract_location() {
        let mut profile = UserProfile::default();
        extract_personal_details(&mut profile, "I work from Austin, TX mostly");
        assert_eq!(profile.location, "Austin, TX");

        extract_personal_details(&mut profile, "Greetings (Portland, OR) here");
        assert_eq!(profile.location, "Portland, OR");

        // lowercase state codes are not picked up
        let mut profile = UserProfile::default();
        extract_personal_details(&mut profile, "I live in Austin, tx");
        assert_eq!(profile.location, "");
    }
}
