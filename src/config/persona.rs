use crate::client::{Message, MessageRole};

use serde::{Deserialize, Serialize};

const MEMORY_CONTEXT_HEADER: &str = "=== MEMORY CONTEXT ===";
const MEMORY_CONTEXT_GUIDANCE: &str = "Use this context to provide more personalized advice. \
Reference past conversations when relevant, but don't make it obvious unless it naturally fits the conversation.";

const DEFAULT_PROMPT: &str = "You are Jim Rohn, the legendary personal development speaker.\n\
Respond with wisdom, warmth, and practical advice in your distinctive style.";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Persona {
    /// Persona name
    pub name: String,
    /// System prompt text
    pub prompt: String,
    /// Shown when the REPL starts
    pub greeting: String,
    /// Shown when the REPL exits
    pub farewell: String,
}

impl Default for Persona {
    fn default() -> Self {
        Self {
            name: "Jim Rohn".into(),
            prompt: DEFAULT_PROMPT.into(),
            greeting: "\"Success is neither magical nor mysterious. Success is the natural \
consequence of consistently applying basic fundamentals.\""
                .into(),
            farewell: "Keep growing and keep pursuing your dreams, my friend!\n\
Remember: \"Don't wish it was easier. Wish you were better.\""
                .into(),
        }
    }
}

impl Persona {
    pub fn with_prompt(prompt: &str) -> Self {
        Self {
            prompt: prompt.trim().to_string(),
            ..Default::default()
        }
    }

    /// Splices memory context into the system prompt.
    pub fn enhanced_prompt(&self, context: &str) -> String {
        if context.is_empty() {
            self.prompt.clone()
        } else {
            format!(
                "{}\n\n{MEMORY_CONTEXT_HEADER}\n{context}\n\n{MEMORY_CONTEXT_GUIDANCE}",
                self.prompt
            )
        }
    }

    pub fn echo_messages(&self, context: &str, question: &str) -> String {
        format!("{}\n\n{question}", self.enhanced_prompt(context))
    }

    pub fn build_messages(&self, context: &str, question: &str) -> Vec<Message> {
        vec![
            Message {
                role: MessageRole::System,
                content: self.enhanced_prompt(context),
            },
            Message {
                role: MessageRole::User,
                content: question.to_string(),
            },
        ]
    }

    pub fn apology(&self, err: &str) -> String {
        format!("I'm having some technical difficulties, my friend. Error: {err}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enhanced_prompt() {
        let persona = Persona::default();
        assert_eq!(persona.enhanced_prompt(""), persona.prompt);

        let enhanced = persona.enhanced_prompt("User's name: Steve");
        assert!(enhanced.starts_with(&persona.prompt));
        assert!(enhanced.contains("=== MEMORY CONTEXT ===\nUser's name: Steve"));
        assert!(enhanced.ends_with("naturally fits the conversation."));
    }

    #[test]
    fn test_build_messages() {
        let persona = Persona::with_prompt("You are a coach.");
        let messages = persona.build_messages("", "How do I grow?");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::System);
        assert_eq!(messages[0].content, "You are a coach.");
        assert_eq!(messages[1].role, MessageRole::User);
        assert_eq!(messages[1].content, "How do I grow?");
    }
}
