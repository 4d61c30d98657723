mod persona;

pub use self::persona::Persona;

use crate::utils::{ensure_parent_exists, get_env_name};

use anyhow::{anyhow, bail, Context, Result};
use inquire::{Confirm, Text};
use log::{info, warn};
use parking_lot::RwLock;
use serde::Deserialize;
use std::{
    env,
    fs::read_to_string,
    path::{Path, PathBuf},
    process::exit,
    sync::Arc,
};

const CONFIG_FILE_NAME: &str = "config.yaml";
const PERSONA_FILE_NAME: &str = "persona.txt";
const CONVERSATIONS_FILE_NAME: &str = "conversations.json";
const PROFILE_FILE_NAME: &str = "profile.json";
const USERS_FILE_NAME: &str = "users.json";
const USERS_DIR_NAME: &str = "users";
const HISTORY_FILE_NAME: &str = "history.txt";

pub const DEFAULT_SERVE_ADDR: &str = "127.0.0.1:9999";

/// Owner of the shared single-user memory files.
pub const DEFAULT_USER: &str = "default";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Chat model
    pub model: String,
    /// Sampling temperature for coaching replies
    pub temperature: f64,
    /// Token limit for coaching replies
    pub max_output_tokens: isize,
    /// Chat API key, falls back to OPENAI_API_KEY
    pub api_key: Option<String>,
    /// Chat API base url
    pub api_base: Option<String>,
    /// Voice synthesis settings
    pub voice: VoiceConfig,
    /// Whether to persist conversations and the profile
    pub save: bool,
    /// Dry-run flag
    pub dry_run: bool,
    /// Whether to color REPL input
    pub highlight: bool,
    /// Serve per-account memory with registration and login
    pub multi_user: bool,
    /// Password protecting /admin/stats
    pub admin_password: Option<String>,
    /// Secret used to sign web session cookies
    pub session_secret: Option<String>,
    /// Default serve address
    pub serve_addr: Option<String>,
    /// Proxy for outbound API calls
    pub proxy: Option<String>,
    /// Api connect timeout in seconds
    pub connect_timeout: Option<u64>,
    #[serde(skip)]
    pub persona: Persona,
    #[serde(skip)]
    pub data_dir: PathBuf,
    #[serde(skip)]
    pub working_mode: WorkingMode,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: "gpt-4".into(),
            temperature: 0.7,
            max_output_tokens: 1000,
            api_key: None,
            api_base: None,
            voice: Default::default(),
            save: true,
            dry_run: false,
            highlight: true,
            multi_user: false,
            admin_password: None,
            session_secret: None,
            serve_addr: None,
            proxy: None,
            connect_timeout: None,
            persona: Default::default(),
            data_dir: Default::default(),
            working_mode: WorkingMode::Cmd,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct VoiceConfig {
    /// Whether voice synthesis is offered at all
    pub enabled: Option<bool>,
    /// Speech API key, falls back to ELEVENLABS_API_KEY
    pub api_key: Option<String>,
    /// Voice to synthesize with, falls back to ELEVENLABS_VOICE_ID
    pub voice_id: Option<String>,
    /// Speech API base url
    pub api_base: Option<String>,
}

pub type SharedConfig = Arc<RwLock<Config>>;

impl Config {
    pub fn init(working_mode: WorkingMode) -> Result<Self> {
        let config_path = Self::config_file()?;

        let api_key = env::var("OPENAI_API_KEY").ok();

        let exist_config_path = config_path.exists();
        if working_mode.is_repl() && api_key.is_none() && !exist_config_path {
            create_config_file(&config_path)?;
        }
        let mut config = if config_path.exists() {
            Self::load_config(&config_path)?
        } else {
            Self::default()
        };

        config.working_mode = working_mode;
        config.data_dir = Self::config_dir()?;
        config.load_envs();
        config.load_persona()?;

        Ok(config)
    }

    pub fn config_dir() -> Result<PathBuf> {
        let env_name = get_env_name("config_dir");
        let path = if let Some(v) = env::var_os(env_name) {
            PathBuf::from(v)
        } else {
            let mut dir = dirs::config_dir().ok_or_else(|| anyhow!("Not found config dir"))?;
            dir.push(env!("CARGO_CRATE_NAME"));
            dir
        };
        Ok(path)
    }

    pub fn local_path(name: &str) -> Result<PathBuf> {
        let mut path = Self::config_dir()?;
        path.push(name);
        Ok(path)
    }

    pub fn config_file() -> Result<PathBuf> {
        Self::local_path(CONFIG_FILE_NAME)
    }

    pub fn persona_file() -> Result<PathBuf> {
        Self::local_path(PERSONA_FILE_NAME)
    }

    pub fn history_file() -> Result<PathBuf> {
        Self::local_path(HISTORY_FILE_NAME)
    }

    pub fn users_file(&self) -> PathBuf {
        self.data_dir.join(USERS_FILE_NAME)
    }

    /// The single-user files live at the data dir root, accounts get their own subdir.
    pub fn user_store_dir(&self, user_id: &str) -> PathBuf {
        if user_id == DEFAULT_USER {
            self.data_dir.clone()
        } else {
            self.data_dir.join(USERS_DIR_NAME).join(user_id)
        }
    }

    pub fn conversations_file(&self, user_id: &str) -> PathBuf {
        self.user_store_dir(user_id).join(CONVERSATIONS_FILE_NAME)
    }

    pub fn profile_file(&self, user_id: &str) -> PathBuf {
        self.user_store_dir(user_id).join(PROFILE_FILE_NAME)
    }

    pub fn serve_addr(&self) -> String {
        self.serve_addr
            .clone()
            .unwrap_or_else(|| DEFAULT_SERVE_ADDR.into())
    }

    pub fn voice_ready(&self) -> bool {
        self.voice.enabled.unwrap_or(true)
            && self.voice.api_key.is_some()
            && self.voice.voice_id.is_some()
    }

    pub fn use_persona_file(&mut self, path: &Path) -> Result<()> {
        let prompt = read_to_string(path)
            .with_context(|| format!("Failed to load persona at {}", path.display()))?;
        self.persona = Persona::with_prompt(&prompt);
        Ok(())
    }

    pub fn info(&self) -> Result<String> {
        let path_info = |path: &Path| {
            let state = if path.exists() { "" } else { " ⚠️" };
            format!("{}{state}", path.display())
        };
        let voice = if self.voice_ready() { "ready" } else { "off" };
        let items = vec![
            ("config_file", path_info(&Self::config_file()?)),
            ("persona_file", path_info(&Self::persona_file()?)),
            (
                "conversations_file",
                path_info(&self.conversations_file(DEFAULT_USER)),
            ),
            (
                "profile_file",
                path_info(&self.profile_file(DEFAULT_USER)),
            ),
            ("model", self.model.clone()),
            ("temperature", self.temperature.to_string()),
            ("max_output_tokens", self.max_output_tokens.to_string()),
            ("voice", voice.into()),
            ("multi_user", self.multi_user.to_string()),
            ("save", self.save.to_string()),
            ("dry_run", self.dry_run.to_string()),
            ("highlight", self.highlight.to_string()),
        ];
        let mut output = String::new();
        for (name, value) in items {
            output.push_str(&format!("{name:<20}{value}\n"));
        }
        Ok(output)
    }

    pub fn update(&mut self, data: &str) -> Result<()> {
        let parts: Vec<&str> = data.split_whitespace().collect();
        if parts.len() != 2 {
            bail!("Usage: .set <key> <value>");
        }
        let key = parts[0];
        let value = parts[1];
        match key {
            "temperature" => {
                self.temperature = value.parse().with_context(|| "Invalid value")?;
            }
            "save" => {
                self.save = value.parse().with_context(|| "Invalid value")?;
            }
            "dry_run" => {
                self.dry_run = value.parse().with_context(|| "Invalid value")?;
            }
            "highlight" => {
                self.highlight = value.parse().with_context(|| "Invalid value")?;
            }
            _ => bail!("Unknown key `{key}`"),
        }
        Ok(())
    }

    fn load_config(config_path: &Path) -> Result<Self> {
        let ctx = || format!("Failed to load config at {}", config_path.display());
        let content = read_to_string(config_path).with_context(ctx)?;
        let config: Self = serde_yaml::from_str(&content).with_context(ctx)?;
        Ok(config)
    }

    fn load_envs(&mut self) {
        if self.api_key.is_none() {
            self.api_key = env::var("OPENAI_API_KEY").ok();
        }
        if self.voice.api_key.is_none() {
            self.voice.api_key = env::var("ELEVENLABS_API_KEY").ok();
        }
        if self.voice.voice_id.is_none() {
            self.voice.voice_id = env::var("ELEVENLABS_VOICE_ID").ok();
        }
        if self.admin_password.is_none() {
            self.admin_password = env::var(get_env_name("admin_password")).ok();
        }
        if self.session_secret.is_none() {
            self.session_secret = env::var(get_env_name("session_secret")).ok();
        }
        if self.serve_addr.is_none() {
            self.serve_addr = env::var(get_env_name("serve_addr")).ok();
        }
        if let Ok(value) = env::var(get_env_name("multi_user")) {
            set_bool(&mut self.multi_user, &value);
        }
    }

    fn load_persona(&mut self) -> Result<()> {
        let path = Self::persona_file()?;
        if path.exists() {
            let prompt = read_to_string(&path)
                .with_context(|| format!("Failed to load persona at {}", path.display()))?;
            self.persona = Persona::with_prompt(&prompt);
            info!("Loaded custom persona prompt from {}", path.display());
        } else {
            self.persona = Persona::default();
            warn!("No persona file at {}, using the builtin prompt", path.display());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkingMode {
    #[default]
    Cmd,
    Repl,
    Serve,
}

impl WorkingMode {
    pub fn is_repl(&self) -> bool {
        *self == WorkingMode::Repl
    }
    pub fn is_serve(&self) -> bool {
        *self == WorkingMode::Serve
    }
}

fn create_config_file(config_path: &Path) -> Result<()> {
    let ans = Confirm::new("No config file, create a new one?")
        .with_default(true)
        .prompt()?;
    if !ans {
        exit(0);
    }

    let api_key = Text::new("OpenAI API key:").prompt()?;

    let mut config = serde_json::json!({ "model": "gpt-4" });
    if !api_key.trim().is_empty() {
        config["api_key"] = api_key.trim().into();
    }

    let config_data = serde_yaml::to_string(&config).with_context(|| "Failed to create config")?;

    ensure_parent_exists(config_path)?;
    std::fs::write(config_path, config_data).with_context(|| "Failed to write to config file")?;
    #[cfg(unix)]
    {
        use std::os::unix::prelude::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(config_path, perms)?;
    }

    println!("✨ Saved config file to {}\n", config_path.display());

    Ok(())
}

fn set_bool(target: &mut bool, value: &str) {
    match value {
        "1" | "true" => *target = true,
        "0" | "false" => *target = false,
        _ => {}
    }
}
