mod highlighter;
mod prompt;

pub use self::highlighter::ReplHighlighter;
pub use self::prompt::ReplPrompt;

use crate::coach::{Coach, UserProfile};
use crate::config::{Config, SharedConfig, DEFAULT_USER};
use crate::print_now;
use crate::utils::run_with_spinner;

use anyhow::{Context, Result};
use fancy_regex::Regex;
use reedline::{
    default_emacs_keybindings, ColumnarMenu, DefaultCompleter, Emacs, FileBackedHistory, KeyCode,
    KeyModifiers, Keybindings, MenuBuilder, Reedline, ReedlineEvent, ReedlineMenu, Signal,
};
use std::sync::LazyLock;

const MENU_NAME: &str = "completion_menu";
const HISTORY_DUMP_COUNT: usize = 5;
const RESPONSE_PREVIEW_LEN: usize = 150;

pub const REPL_COMMANDS: [(&str, &str); 7] = [
    (".help", "Print this help message"),
    (".info", "Print system info"),
    (".history", "List recent conversations, e.g. `.history 10`"),
    (".profile", "Show what the coach remembers about you"),
    (".favorite", "Toggle a favorite by its timestamp"),
    (".set", "Adjust a setting, e.g. `.set dry_run true`"),
    (".exit", "Exit the REPL"),
];

static COMMAND_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*(\.\S+)\s*").unwrap());

pub struct Repl {
    editor: Reedline,
    prompt: ReplPrompt,
}

impl Repl {
    pub fn init(config: &SharedConfig) -> Result<Self> {
        let completer = Self::create_completer();
        let keybindings = Self::create_keybindings();
        let history = Self::create_history()?;
        let menu = Self::create_menu();
        let highlighter = ReplHighlighter::new(config);
        let edit_mode = Box::new(Emacs::new(keybindings));
        let editor = Reedline::create()
            .with_completer(Box::new(completer))
            .with_history(history)
            .with_menu(menu)
            .with_highlighter(Box::new(highlighter))
            .with_edit_mode(edit_mode)
            .with_quick_completions(true)
            .with_partial_completions(true)
            .with_ansi_colors(true);
        let prompt = ReplPrompt::new(config);
        Ok(Self { editor, prompt })
    }

    pub async fn run(&mut self, coach: &Coach, config: &SharedConfig) -> Result<()> {
        let (name, greeting) = {
            let config = config.read();
            (
                config.persona.name.clone(),
                config.persona.greeting.clone(),
            )
        };
        print_now!("Welcome to aicoach {}\n", env!("CARGO_PKG_VERSION"));
        print_now!("Type \".help\" for more information.\n");
        if !greeting.is_empty() {
            print_now!("\n{name}: {greeting}\n\n");
        }
        let mut already_ctrlc = false;
        loop {
            let sig = self.editor.read_line(&self.prompt);
            match sig {
                Ok(Signal::Success(line)) => {
                    already_ctrlc = false;
                    match self.handle_line(coach, config, &line).await {
                        Ok(quit) => {
                            if quit {
                                break;
                            }
                        }
                        Err(err) => {
                            let err = format!("{err:?}");
                            print_now!("Error: {}\n\n", err.trim());
                        }
                    }
                }
                Ok(Signal::CtrlC) => {
                    if already_ctrlc {
                        break;
                    }
                    already_ctrlc = true;
                    print_now!("(To exit, press Ctrl+C again or Ctrl+D or type .exit)\n\n");
                }
                Ok(Signal::CtrlD) => {
                    break;
                }
                _ => {}
            }
        }
        coach.flush()?;
        let farewell = config.read().persona.farewell.clone();
        if !farewell.is_empty() {
            print_now!("\n{name}: {farewell}\n");
        }
        Ok(())
    }

    async fn handle_line(
        &mut self,
        coach: &Coach,
        config: &SharedConfig,
        line: &str,
    ) -> Result<bool> {
        match parse_command(line) {
            Some((cmd, args)) => match cmd {
                ".help" => {
                    dump_repl_help();
                }
                ".info" => {
                    let output = config.read().info()?;
                    print_now!("{}\n", output.trim_end());
                    print_now!("\n");
                }
                ".history" => {
                    let count = match args {
                        Some(v) => v
                            .parse()
                            .with_context(|| format!("Invalid conversation count '{v}'"))?,
                        None => HISTORY_DUMP_COUNT,
                    };
                    dump_history(coach, count);
                }
                ".profile" => {
                    dump_profile(&coach.history(DEFAULT_USER).user_profile);
                }
                ".favorite" => match args {
                    Some(timestamp) => {
                        let is_favorite = coach.toggle_favorite(DEFAULT_USER, timestamp)?;
                        if is_favorite {
                            print_now!("Marked as favorite.\n\n");
                        } else {
                            print_now!("Removed from favorites.\n\n");
                        }
                    }
                    None => print_now!("Usage: .favorite <timestamp>\n\n"),
                },
                ".set" => {
                    config.write().update(args.unwrap_or_default())?;
                    print_now!("\n");
                }
                ".exit" => {
                    return Ok(true);
                }
                _ => unknown_command(),
            },
            None => {
                self.submit(coach, config, line).await;
            }
        }

        Ok(false)
    }

    async fn submit(&mut self, coach: &Coach, config: &SharedConfig, line: &str) {
        let question = line.trim();
        if question.is_empty() {
            return;
        }
        let name = config.read().persona.name.clone();
        let outcome = run_with_spinner(coach.ask(DEFAULT_USER, question, false), "Thinking").await;
        print_now!("\n{name}: {}\n\n", outcome.response.trim_end());
    }

    fn create_completer() -> DefaultCompleter {
        let completion: Vec<String> = REPL_COMMANDS
            .into_iter()
            .map(|(v, _)| v.to_string())
            .collect();
        let mut completer = DefaultCompleter::with_inclusions(&['.', '-', '_']).set_min_word_len(2);
        completer.insert(completion);
        completer
    }

    fn create_keybindings() -> Keybindings {
        let mut keybindings = default_emacs_keybindings();
        keybindings.add_binding(
            KeyModifiers::NONE,
            KeyCode::Tab,
            ReedlineEvent::UntilFound(vec![
                ReedlineEvent::Menu(MENU_NAME.to_string()),
                ReedlineEvent::MenuNext,
            ]),
        );
        keybindings
    }

    fn create_menu() -> ReedlineMenu {
        let completion_menu = ColumnarMenu::default().with_name(MENU_NAME);
        ReedlineMenu::EngineCompleter(Box::new(completion_menu))
    }

    fn create_history() -> Result<Box<FileBackedHistory>> {
        Ok(Box::new(
            FileBackedHistory::with_file(1000, Config::history_file()?)
                .with_context(|| "Failed to setup history file")?,
        ))
    }
}

fn dump_history(coach: &Coach, count: usize) {
    let view = coach.history(DEFAULT_USER);
    if view.conversations.is_empty() {
        print_now!("No conversations yet.\n\n");
        return;
    }
    let skip = view.conversations.len().saturating_sub(count);
    for record in view.conversations.iter().skip(skip) {
        let marker = if record.is_favorite { " *" } else { "" };
        print_now!("[{}]{marker}\n", record.timestamp);
        print_now!("  Q: {}\n", record.question.trim());
        print_now!("  A: {}\n", preview(record.response.trim()));
    }
    print_now!("\n");
}

fn dump_profile(profile: &UserProfile) {
    let mut items: Vec<(&str, String)> = vec![];
    if !profile.name.is_empty() {
        items.push(("name", profile.name.clone()));
    }
    if !profile.location.is_empty() {
        items.push(("location", profile.location.clone()));
    }
    items.push(("conversations", profile.total_conversations.to_string()));
    if let Some(first) = &profile.first_conversation {
        items.push(("first_conversation", first.clone()));
    }
    if let Some(last) = &profile.last_conversation {
        items.push(("last_conversation", last.clone()));
    }
    for (name, list) in [
        ("recurring_themes", &profile.recurring_themes),
        ("growth_areas", &profile.growth_areas),
        ("goals", &profile.goals),
        ("strengths", &profile.strengths),
        ("challenges", &profile.challenges),
        ("insights", &profile.insights),
    ] {
        if !list.is_empty() {
            items.push((name, list.join(", ")));
        }
    }
    let mut output = String::new();
    for (name, value) in items {
        output.push_str(&format!("{name:<20}{value}\n"));
    }
    print_now!("{}\n", output);
}

fn preview(text: &str) -> String {
    let mut chars = text.char_indices();
    match chars.nth(RESPONSE_PREVIEW_LEN) {
        Some((offset, _)) => format!("{}...", &text[..offset]),
        None => text.to_string(),
    }
}

fn unknown_command() {
    print_now!("Unknown command. Try `.help`.\n\n");
}

fn dump_repl_help() {
    let head = REPL_COMMANDS
        .iter()
        .map(|(name, desc)| format!("{name:<24} {desc}"))
        .collect::<Vec<String>>()
        .join("\n");
    print_now!(
        r###"{head}

Press Ctrl+C to abort readline, Ctrl+D to exit the REPL

"###,
    );
}

fn parse_command(line: &str) -> Option<(&str, Option<&str>)> {
    if let Ok(Some(captures)) = COMMAND_RE.captures(line) {
        if let Some(cmd) = captures.get(1) {
            let cmd = cmd.as_str();
            let args = line[captures[0].len()..].trim();
            let args = if args.is_empty() { None } else { Some(args) };
            return Some((cmd, args));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_command() {
        assert_eq!(parse_command("hello"), None);
        assert_eq!(parse_command(" .profile"), Some((".profile", None)));
        assert_eq!(parse_command(" .profile  "), Some((".profile", None)));
        assert_eq!(parse_command(".history 10"), Some((".history", Some("10"))));
        assert_eq!(
            parse_command(".favorite 2024-01-15T08:30:00  "),
            Some((".favorite", Some("2024-01-15T08:30:00")))
        );
    }

    #[test]
    fn test_preview() {
        assert_eq!(preview("short"), "short");
        let long = "x".repeat(200);
        let cut = preview(&long);
        assert_eq!(cut.chars().count(), RESPONSE_PREVIEW_LEN + 3);
        assert!(cut.ends_with("..."));
    }
}
