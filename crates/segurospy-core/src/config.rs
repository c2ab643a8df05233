//! SegurosPy configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, SegurosError};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SegurosConfig {
    #[serde(default)]
    pub company: CompanyConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

impl SegurosConfig {
    /// Load config from the default path (~/.segurospy/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SegurosError::Config(format!("Failed to read config: {e}")))?;
        Self::from_toml(&content)
    }

    /// Parse config from TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| SegurosError::Config(format!("Failed to parse config: {e}")))
    }

    /// Override secrets and deploy-specific values from the environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let set = |target: &mut String, key: &str| {
            if let Some(value) = lookup(key).filter(|v| !v.is_empty()) {
                *target = value;
            }
        };
        set(&mut self.telegram.bot_token, "SEGUROSPY_TELEGRAM_BOT_TOKEN");
        set(&mut self.telegram.chat_id, "SEGUROSPY_TELEGRAM_CHAT_ID");
        set(&mut self.email.smtp_user, "SEGUROSPY_SMTP_USER");
        set(&mut self.email.smtp_password, "SEGUROSPY_SMTP_PASSWORD");
        set(&mut self.database.path, "SEGUROSPY_DB_PATH");
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the SegurosPy home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".segurospy")
    }
}

/// Business identity used in outbound mail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyConfig {
    #[serde(default = "default_company_name")]
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
    #[serde(default = "default_review_url")]
    pub review_url: String,
}

fn default_company_name() -> String { "Candi Seguros".into() }
fn default_review_url() -> String { "https://g.page/r/candiseguros/review".into() }

impl Default for CompanyConfig {
    fn default() -> Self {
        Self {
            name: default_company_name(),
            phone: String::new(),
            email: String::new(),
            review_url: default_review_url(),
        }
    }
}

/// Lead store location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String { "~/.segurospy/segurospy.db".into() }

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: default_db_path() }
    }
}

/// Telegram bot used as the push channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub chat_id: String,
    #[serde(default = "default_telegram_api")]
    pub api_base: String,
}

fn default_telegram_api() -> String { "https://api.telegram.org".into() }

impl TelegramConfig {
    pub fn is_configured(&self) -> bool {
        !self.bot_token.is_empty() && !self.chat_id.is_empty()
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            chat_id: String::new(),
            api_base: default_telegram_api(),
        }
    }
}

/// SMTP settings for the mail channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_user: String,
    #[serde(default)]
    pub smtp_password: String,
    #[serde(default = "default_from")]
    pub from: String,
    #[serde(default)]
    pub from_name: Option<String>,
}

fn default_smtp_host() -> String { "smtp.gmail.com".into() }
fn default_smtp_port() -> u16 { 587 }
fn default_from() -> String { "candi@candiseguros.com".into() }

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_host: default_smtp_host(),
            smtp_port: default_smtp_port(),
            smtp_user: String::new(),
            smtp_password: String::new(),
            from: default_from(),
            from_name: None,
        }
    }
}

/// Scheduler loop and job settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
    /// Process "local time" as a fixed offset from UTC, in minutes.
    #[serde(default)]
    pub utc_offset_minutes: i32,
    #[serde(default)]
    pub jobs: JobTriggers,
    #[serde(default = "default_review_delay_days")]
    pub review_delay_days: i64,
    #[serde(default = "default_stale_after_hours")]
    pub stale_after_hours: i64,
    #[serde(default = "default_stale_alert_limit")]
    pub stale_alert_limit: usize,
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
}

fn default_tick_secs() -> u64 { 1 }
fn default_review_delay_days() -> i64 { 7 }
fn default_stale_after_hours() -> i64 { 24 }
fn default_stale_alert_limit() -> usize { 10 }
fn default_retention_days() -> i64 { 7 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_secs: default_tick_secs(),
            utc_offset_minutes: 0,
            jobs: JobTriggers::default(),
            review_delay_days: default_review_delay_days(),
            stale_after_hours: default_stale_after_hours(),
            stale_alert_limit: default_stale_alert_limit(),
            retention_days: default_retention_days(),
        }
    }
}

/// Trigger spec per built-in job, e.g. "daily 20:00" or "0 */4 * * *".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobTriggers {
    #[serde(default = "default_daily_report")]
    pub daily_report: String,
    #[serde(default = "default_review_requests")]
    pub review_requests: String,
    #[serde(default = "default_stale_leads")]
    pub stale_leads: String,
    #[serde(default = "default_retention")]
    pub retention: String,
}

fn default_daily_report() -> String { "daily 20:00".into() }
fn default_review_requests() -> String { "daily 10:00".into() }
fn default_stale_leads() -> String { "every 4h".into() }
fn default_retention() -> String { "weekly sun 03:00".into() }

impl Default for JobTriggers {
    fn default() -> Self {
        Self {
            daily_report: default_daily_report(),
            review_requests: default_review_requests(),
            stale_leads: default_stale_leads(),
            retention: default_retention(),
        }
    }
}
