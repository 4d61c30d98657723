mod cli;
mod client;
mod coach;
mod config;
mod logger;
mod repl;
mod serve;
mod users;
#[macro_use]
mod utils;

use crate::cli::Cli;
use crate::coach::Coach;
use crate::config::{Config, SharedConfig, WorkingMode, DEFAULT_USER};
use crate::repl::Repl;

use anyhow::Result;
use clap::Parser;
use parking_lot::RwLock;
use std::path::Path;
use std::process::exit;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let text = if cli.serve.is_some() {
        None
    } else {
        cli.text()?
    };
    let working_mode = if cli.serve.is_some() {
        WorkingMode::Serve
    } else if text.is_none() {
        WorkingMode::Repl
    } else {
        WorkingMode::Cmd
    };
    logger::setup_logger(working_mode)?;
    let config = Arc::new(RwLock::new(Config::init(working_mode)?));
    update_config_with_cli_options(&config, &cli)?;

    if cli.info {
        let info = config.read().info()?;
        print!("{info}");
        exit(0);
    }

    if let Some(addr) = &cli.serve {
        return serve::run(config, addr.clone()).await;
    }

    let coach = Coach::init(&config)?;
    match text {
        Some(text) => start_directive(&coach, &text).await,
        None => start_interactive(&coach, &config).await,
    }
}

fn update_config_with_cli_options(config: &SharedConfig, cli: &Cli) -> Result<()> {
    if cli.dry_run {
        config.write().dry_run = true;
    }
    if cli.no_voice {
        config.write().voice.enabled = Some(false);
    }
    if let Some(model) = &cli.model {
        config.write().model = model.clone();
    }
    if let Some(path) = &cli.persona {
        config.write().use_persona_file(Path::new(path))?;
    }
    Ok(())
}

async fn start_directive(coach: &Coach, text: &str) -> Result<()> {
    let outcome = coach.ask(DEFAULT_USER, text, false).await;
    println!("{}", outcome.response.trim());
    Ok(())
}

async fn start_interactive(coach: &Coach, config: &SharedConfig) -> Result<()> {
    let mut repl = Repl::init(config)?;
    repl.run(coach, config).await
}
