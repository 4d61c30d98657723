mod crypto;
mod spinner;

pub use self::crypto::*;
pub use self::spinner::*;

use anyhow::{anyhow, Context, Result};
use chrono::prelude::*;
use log::{info, warn};
use std::fs::create_dir_all;
use std::io::{stdout, Write};
use std::path::Path;
use std::process::Command;

#[macro_export]
macro_rules! print_now {
    ($($arg:tt)*) => {
        $crate::utils::print_now(&format!($($arg)*))
    };
}

pub fn print_now<T: ToString>(text: &T) {
    print!("{}", text.to_string());
    let _ = stdout().flush();
}

pub fn now() -> String {
    let now = Local::now();
    now.to_rfc3339_opts(SecondsFormat::Secs, false)
}

pub fn get_env_name(key: &str) -> String {
    format!(
        "{}_{}",
        env!("CARGO_CRATE_NAME").to_ascii_uppercase(),
        key.to_ascii_uppercase(),
    )
}

pub fn ensure_parent_exists(path: &Path) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow!("Failed to write to {}, No parent path", path.display()))?;
    if !parent.exists() {
        create_dir_all(parent).with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    Ok(())
}

#[cfg(target_os = "macos")]
const OPEN_COMMAND: &[&str] = &["open"];
#[cfg(target_os = "windows")]
const OPEN_COMMAND: &[&str] = &["cmd", "/C", "start"];
#[cfg(not(any(target_os = "macos", target_os = "windows")))]
const OPEN_COMMAND: &[&str] = &["xdg-open"];

pub fn open_in_browser(url: &str) {
    let (program, args) = match OPEN_COMMAND.split_first() {
        Some(v) => v,
        None => return,
    };
    match Command::new(program).args(args).arg(url).spawn() {
        Ok(_) => info!("Opened {url} in the browser"),
        Err(err) => warn!("Failed to open {url} in the browser, {err}"),
    }
}
