//! Configuration management
//!
//! Settings are resolved in this order:
//! 1. Environment variables
//! 2. `gcal.toml` in the working directory
//! 3. Defaults
//!
//! `${VAR_NAME}` inside the TOML file is expanded from the environment
//! before parsing.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::Error;
use crate::render::RenderOptions;

/// Default config file name looked up by [`Config::load`]
pub const CONFIG_FILE: &str = "gcal.toml";

/// Which event store backs the calendar
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Relational store with numeric event ids
    #[default]
    Sqlite,
    /// Single JSON document, title-based deletion
    Json,
}

impl StorageBackend {
    fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "json" | "file" => Self::Json,
            _ => Self::Sqlite,
        }
    }
}

/// Discord connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordConfig {
    /// Bot token (optional until the bot is started)
    pub token: Option<String>,

    /// Prefix for text commands such as `$setup`
    #[serde(default = "default_command_prefix")]
    pub command_prefix: String,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            token: None,
            command_prefix: default_command_prefix(),
        }
    }
}

/// Persistence settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// SQLite database (events when backend = sqlite, members always)
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// JSON document used when backend = json
    #[serde(default = "default_json_path")]
    pub json_path: String,

    /// Maximum pooled connections
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// How long a caller waits for a free connection
    #[serde(default = "default_pool_timeout_secs")]
    pub pool_timeout_secs: u64,

    /// How long SQLite waits on a locked database file before giving up
    #[serde(default = "default_busy_timeout_secs")]
    pub busy_timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            db_path: default_db_path(),
            json_path: default_json_path(),
            pool_size: default_pool_size(),
            pool_timeout_secs: default_pool_timeout_secs(),
            busy_timeout_secs: default_busy_timeout_secs(),
        }
    }
}

/// Calendar behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarConfig {
    /// Channel holding the canonical message
    #[serde(default = "default_channel_name")]
    pub channel_name: String,

    /// Role required to mutate the calendar
    #[serde(default = "default_role_name")]
    pub role_name: String,

    /// Recent-message window scanned to rediscover the canonical message
    #[serde(default = "default_scan_limit")]
    pub scan_limit: u8,

    /// Embed title
    #[serde(default = "default_title")]
    pub title: String,

    /// Append event ids to rendered entries
    #[serde(default = "default_show_event_ids")]
    pub show_event_ids: bool,

    /// Deadline for one mutate+render+edit cycle
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            channel_name: default_channel_name(),
            role_name: default_role_name(),
            scan_limit: default_scan_limit(),
            title: default_title(),
            show_event_ids: default_show_event_ids(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl CalendarConfig {
    pub const MIN_SCAN_LIMIT: u8 = 10;
    pub const MAX_SCAN_LIMIT: u8 = 20;

    /// Scan window clamped to the supported range
    pub fn scan_limit(&self) -> u8 {
        self.scan_limit.clamp(Self::MIN_SCAN_LIMIT, Self::MAX_SCAN_LIMIT)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            title: self.title.clone(),
            show_event_ids: self.show_event_ids,
            footer: format!("Bearbeiten nur mit der Rolle \"{}\"", self.role_name),
        }
    }
}

/// Membership mirror settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Extra attempts after a failed write before it is dropped
    #[serde(default = "default_mirror_retries")]
    pub max_retries: u32,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: default_mirror_retries(),
        }
    }
}

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub discord: DiscordConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub calendar: CalendarConfig,

    #[serde(default)]
    pub mirror: MirrorConfig,
}

fn default_command_prefix() -> String {
    "$".to_string()
}

fn default_db_path() -> String {
    "data/gcal.db".to_string()
}

fn default_json_path() -> String {
    "data/calendar.json".to_string()
}

fn default_pool_size() -> u32 {
    8
}

fn default_pool_timeout_secs() -> u64 {
    5
}

fn default_busy_timeout_secs() -> u64 {
    5
}

fn default_channel_name() -> String {
    "kalender".to_string()
}

fn default_role_name() -> String {
    "editaccess".to_string()
}

fn default_scan_limit() -> u8 {
    10
}

fn default_title() -> String {
    "📅 Server Kalender".to_string()
}

fn default_show_event_ids() -> bool {
    true
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

fn default_mirror_retries() -> u32 {
    3
}

impl Config {
    /// Replace `${VAR_NAME}` with the variable's value (empty if unset)
    fn expand_env_vars(value: &str) -> String {
        let mut result = String::new();
        let mut chars = value.chars().peekable();

        while let Some(c) = chars.next() {
            if c == '$' && chars.peek() == Some(&'{') {
                chars.next();

                let mut var_name = String::new();
                for c in chars.by_ref() {
                    if c == '}' {
                        break;
                    }
                    var_name.push(c);
                }

                if let Ok(env_value) = std::env::var(&var_name) {
                    result.push_str(&env_value);
                }
            } else {
                result.push(c);
            }
        }

        result
    }

    /// Load from a TOML file, then apply environment overrides
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();

        let toml_content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let mut config = Self::from_toml_str(&toml_content)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse TOML content (with `${VAR}` expansion), no env overrides
    pub fn from_toml_str(content: &str) -> crate::Result<Self> {
        let expanded = Self::expand_env_vars(content);
        toml::from_str(&expanded).map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))
    }

    /// Load `gcal.toml` if present, otherwise environment variables only
    pub fn load() -> crate::Result<Self> {
        if Path::new(CONFIG_FILE).exists() {
            return Self::from_toml_file(CONFIG_FILE);
        }
        Ok(Self::from_env())
    }

    /// Defaults overridden by environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        // Discord
        if let Some(token) = non_empty_env("DISCORD_BOT_TOKEN").or_else(|| non_empty_env("TOKEN")) {
            self.discord.token = Some(token);
        }
        if let Some(prefix) = non_empty_env("COMMAND_PREFIX") {
            self.discord.command_prefix = prefix;
        }

        // Storage
        if let Some(backend) = non_empty_env("STORAGE_BACKEND") {
            self.storage.backend = StorageBackend::parse(&backend);
        }
        if let Some(path) = non_empty_env("DB_PATH") {
            self.storage.db_path = path;
        }
        if let Some(path) = non_empty_env("CALENDAR_JSON_PATH") {
            self.storage.json_path = path;
        }
        if let Some(size) = parsed_env("DB_POOL_SIZE") {
            self.storage.pool_size = size;
        }
        if let Some(secs) = parsed_env("DB_POOL_TIMEOUT_SECS") {
            self.storage.pool_timeout_secs = secs;
        }
        if let Some(secs) = parsed_env("DB_BUSY_TIMEOUT_SECS") {
            self.storage.busy_timeout_secs = secs;
        }

        // Calendar
        if let Some(name) = non_empty_env("CALENDAR_CHANNEL") {
            self.calendar.channel_name = name;
        }
        if let Some(name) = non_empty_env("CALENDAR_ROLE") {
            self.calendar.role_name = name;
        }
        if let Some(limit) = parsed_env("CALENDAR_SCAN_LIMIT") {
            self.calendar.scan_limit = limit;
        }
        if let Some(secs) = parsed_env("CALENDAR_REQUEST_TIMEOUT_SECS") {
            self.calendar.request_timeout_secs = secs;
        }

        // Mirror
        if let Some(enabled) = non_empty_env("MIRROR_ENABLED") {
            self.mirror.enabled = enabled.to_lowercase() != "false";
        }
        if let Some(retries) = parsed_env("MIRROR_MAX_RETRIES") {
            self.mirror.max_retries = retries;
        }
    }

    /// Bot token, or a configuration error if none is set
    pub fn discord_token(&self) -> crate::Result<&str> {
        self.discord
            .token
            .as_deref()
            .ok_or_else(|| Error::Config("DISCORD_BOT_TOKEN not set".to_string()))
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    non_empty_env(key).and_then(|v| v.trim().parse().ok())
}
