use anyhow::{Context, Result};
use clap::Parser;
use is_terminal::IsTerminal;
use std::io::{stdin, Read};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Select the chat model
    #[clap(short, long)]
    pub model: Option<String>,
    /// Load the persona prompt from a file
    #[clap(long, value_name = "FILE")]
    pub persona: Option<String>,
    /// Serve the web chat
    #[clap(long, value_name = "ADDRESS")]
    pub serve: Option<Option<String>>,
    /// Turn off voice synthesis
    #[clap(long)]
    pub no_voice: bool,
    /// Display the composed prompt without sending it
    #[clap(long)]
    pub dry_run: bool,
    /// Display information
    #[clap(long)]
    pub info: bool,
    /// Input text
    #[clap(trailing_var_arg = true)]
    text: Vec<String>,
}

impl Cli {
    pub fn text(&self) -> Result<Option<String>> {
        let mut stdin_text = String::new();
        if !stdin().is_terminal() {
            let _ = stdin()
                .read_to_string(&mut stdin_text)
                .context("Invalid stdin pipe")?;
        };
        match self.text.is_empty() {
            true => {
                if stdin_text.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(stdin_text))
                }
            }
            false => {
                let text = self.text.join(" ");
                if stdin_text.is_empty() {
                    Ok(Some(text))
                } else {
                    Ok(Some(format!("{text}\n{stdin_text}")))
                }
            }
        }
    }
}
