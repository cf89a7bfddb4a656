use anyhow::{Context, Result};
use chrono::{FixedOffset, Offset, Utc};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub weather: WeatherConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub broadcast: BroadcastConfig,
    #[serde(default)]
    pub alerts: AlertThresholds,
    #[serde(default)]
    pub health: HealthConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_seen_capacity")]
    pub seen_capacity: usize,
    /// Handler failures tolerated for one update before it is skipped.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WeatherConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_weather_base_url")]
    pub base_url: String,
    /// City used when a chat has no remembered location (e.g. "Buenos Aires")
    #[serde(default = "default_city")]
    pub default_city: String,
    /// Offset from UTC used for "tomorrow", greetings and throttle buckets
    #[serde(default = "default_utc_offset")]
    pub utc_offset_hours: i32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_offset_path")]
    pub offset_path: PathBuf,
    #[serde(default = "default_db_path")]
    pub database_path: PathBuf,
    #[serde(default = "default_session_capacity")]
    pub session_capacity: u64,
    #[serde(default = "default_session_idle")]
    pub session_idle_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BroadcastConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_broadcast_cron")]
    pub cron: String,
    /// Chats that always receive the broadcast, on top of subscribers
    #[serde(default)]
    pub chat_ids: Vec<i64>,
    #[serde(default = "default_sudden_change")]
    pub sudden_change: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AlertThresholds {
    #[serde(default = "default_cold")]
    pub cold_threshold: f64,
    #[serde(default = "default_heat")]
    pub heat_threshold: f64,
    #[serde(default = "default_wind")]
    pub wind_threshold: f64,
    #[serde(default = "default_rain_probability")]
    pub rain_probability: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HealthConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
}

fn default_poll_interval() -> u64 {
    4
}

fn default_seen_capacity() -> usize {
    512
}

fn default_max_attempts() -> u32 {
    3
}

fn default_weather_base_url() -> String {
    "https://api.openweathermap.org/data/2.5".to_string()
}

fn default_city() -> String {
    "Buenos Aires".to_string()
}

fn default_utc_offset() -> i32 {
    -3
}

fn default_timeout() -> u64 {
    10
}

fn default_offset_path() -> PathBuf {
    PathBuf::from(".data/lastUpdate.json")
}

fn default_db_path() -> PathBuf {
    PathBuf::from("weatherbot.db")
}

fn default_session_capacity() -> u64 {
    10_000
}

fn default_session_idle() -> u64 {
    7 * 24 * 60 * 60
}

fn default_broadcast_cron() -> String {
    "0 */30 * * * *".to_string()
}

fn default_sudden_change() -> f64 {
    5.0
}

fn default_cold() -> f64 {
    0.0
}

fn default_heat() -> f64 {
    35.0
}

fn default_wind() -> f64 {
    50.0
}

fn default_rain_probability() -> f64 {
    0.7
}

fn default_true() -> bool {
    true
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 3000))
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            poll_interval_secs: default_poll_interval(),
            seen_capacity: default_seen_capacity(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_weather_base_url(),
            default_city: default_city(),
            utc_offset_hours: default_utc_offset(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            offset_path: default_offset_path(),
            database_path: default_db_path(),
            session_capacity: default_session_capacity(),
            session_idle_secs: default_session_idle(),
        }
    }
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cron: default_broadcast_cron(),
            chat_ids: Vec::new(),
            sudden_change: default_sudden_change(),
        }
    }
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            cold_threshold: default_cold(),
            heat_threshold: default_heat(),
            wind_threshold: default_wind(),
            rain_probability: default_rain_probability(),
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            bind: default_bind(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl WeatherConfig {
    /// Fixed offset for the configured timezone. Falls back to UTC when the
    /// configured hours are out of range.
    pub fn timezone(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_hours * 3600)
            .unwrap_or_else(|| Utc.fix())
    }
}

impl Config {
    /// Load the TOML file, apply environment overrides and validate.
    /// A missing file is not an error as long as the environment supplies
    /// the credentials.
    pub fn load(path: &Path) -> Result<Self> {
        let content = if path.exists() {
            std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?
        } else {
            String::new()
        };

        let mut config = Self::parse(&content)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    /// Environment variables win over the file. Names follow the `.env`
    /// files the bot has always been deployed with.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup("TELEGRAM_TOKEN") {
            self.telegram.bot_token = token.trim().to_string();
        }
        if let Some(key) = lookup("API_KEY") {
            self.weather.api_key = key.trim().to_string();
        }
        if let Some(city) = lookup("CITY") {
            self.weather.default_city = city.trim().to_string();
        }
        if let Some(chat) = lookup("TELEGRAM_CHAT_ID") {
            if let Ok(id) = chat.trim().parse::<i64>() {
                if !self.broadcast.chat_ids.contains(&id) {
                    self.broadcast.chat_ids.push(id);
                }
            }
        }
        if let Some(mode) = lookup("MODO_BOT_PRIVADO") {
            self.broadcast.enabled = mode.trim() == "true";
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.telegram.bot_token.is_empty() {
            anyhow::bail!("Missing Telegram bot token (telegram.bot_token or TELEGRAM_TOKEN)");
        }
        if self.weather.api_key.is_empty() {
            anyhow::bail!("Missing OpenWeatherMap API key (weather.api_key or API_KEY)");
        }
        if self.telegram.poll_interval_secs == 0 {
            anyhow::bail!("telegram.poll_interval_secs must be greater than zero");
        }
        Ok(())
    }
}
