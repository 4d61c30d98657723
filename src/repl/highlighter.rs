use super::REPL_COMMANDS;

use crate::config::SharedConfig;

use nu_ansi_term::{Color, Style};
use reedline::{Highlighter, StyledText};

pub struct ReplHighlighter {
    config: SharedConfig,
}

impl ReplHighlighter {
    pub fn new(config: &SharedConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }
}

impl Highlighter for ReplHighlighter {
    /// Colors the leading dot-command, everything else stays plain.
    fn highlight(&self, line: &str, _cursor: usize) -> StyledText {
        let plain = Style::new().fg(Color::Default);
        let command_style = if self.config.read().highlight {
            Style::new().fg(Color::Green)
        } else {
            plain
        };

        let mut styled = StyledText::new();
        let trimmed = line.trim_start();
        let known = REPL_COMMANDS
            .iter()
            .map(|(name, _)| *name)
            .find(|name| trimmed.starts_with(name));
        match known {
            Some(name) => {
                let start = line.len() - trimmed.len();
                styled.push((plain, line[..start].to_string()));
                styled.push((command_style, name.to_string()));
                styled.push((plain, line[start + name.len()..].to_string()));
            }
            None => styled.push((plain, line.to_string())),
        }
        styled
    }
}
