//! weatherbot setup wizard.
//!
//! Asks for the Telegram token, the OpenWeatherMap key and the defaults the
//! bot answers with, then writes `config.toml` to the project root
//! (`WEATHERBOT_ROOT`, or the current directory).

use anyhow::{Context, Result};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

// ── Config formatting ──────────────────────────────────────────────────────────

struct ConfigParams<'a> {
    tg_token: &'a str,
    api_key: &'a str,
    city: &'a str,
    utc_offset: i32,
    broadcast_chats: &'a str,
    db_path: &'a str,
}

/// TOML string literal with quotes and backslashes escaped
fn quoted(value: &str) -> String {
    toml::Value::String(value.to_string()).to_string()
}

/// Chat ids typed as a comma- or space-separated list
fn parse_chat_ids(input: &str) -> Result<Vec<i64>> {
    input
        .split([',', ' '])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>()
                .with_context(|| format!("'{}' is not a Telegram chat id", s))
        })
        .collect()
}

/// Produces a valid config.toml string. Extracted so it can be unit-tested.
fn format_config(p: &ConfigParams<'_>) -> Result<String> {
    let ids = parse_chat_ids(p.broadcast_chats)?;
    let enabled = !ids.is_empty();
    let ids_str = ids
        .iter()
        .map(i64::to_string)
        .collect::<Vec<_>>()
        .join(", ");

    let tg_token = quoted(p.tg_token);
    let api_key = quoted(p.api_key);
    let city = quoted(p.city);
    let utc_offset = p.utc_offset;
    let db_path = quoted(p.db_path);

    Ok(format!(
        r#"[telegram]
bot_token = {tg_token}
poll_interval_secs = 4

[weather]
api_key = {api_key}
default_city = {city}
utc_offset_hours = {utc_offset}

[http]
timeout_secs = 10

[storage]
offset_path = ".data/lastUpdate.json"
database_path = {db_path}

[broadcast]
enabled = {enabled}
cron = "0 */30 * * * *"
chat_ids = [{ids_str}]

[health]
enabled = true
bind = "0.0.0.0:3000"
"#
    ))
}

fn run_cli(project_root: &Path) -> Result<()> {
    println!("=== weatherbot setup ===\n");

    let read_line = |prompt: &str| -> Result<String> {
        print!("{prompt}");
        io::stdout().flush()?;
        let mut buf = String::new();
        io::stdin().read_line(&mut buf)?;
        Ok(buf.trim().to_owned())
    };

    let or_default = |s: String, default: &str| {
        if s.is_empty() {
            default.to_owned()
        } else {
            s
        }
    };

    let tg_token = read_line("Telegram bot token: ")?;
    let api_key = read_line("OpenWeatherMap API key: ")?;
    let city = or_default(read_line("Default city [Buenos Aires]: ")?, "Buenos Aires");
    let utc_offset: i32 = or_default(read_line("UTC offset in hours [-3]: ")?, "-3")
        .parse()
        .context("UTC offset must be a whole number of hours")?;
    let broadcast_chats =
        read_line("Chat IDs for the periodic broadcast (comma-separated, empty to disable): ")?;
    let db_path = or_default(
        read_line("Subscriber DB path [weatherbot.db]: ")?,
        "weatherbot.db",
    );

    let config = format_config(&ConfigParams {
        tg_token: &tg_token,
        api_key: &api_key,
        city: &city,
        utc_offset,
        broadcast_chats: &broadcast_chats,
        db_path: &db_path,
    })?;

    let config_path = project_root.join("config.toml");
    std::fs::write(&config_path, &config)
        .with_context(|| format!("Could not write {}", config_path.display()))?;

    println!("\n✓  config.toml saved to {}", config_path.display());
    println!("   Run the bot with:  cargo run");
    println!("   Check delivery with:  cargo run -- --send-test");
    Ok(())
}

fn main() -> Result<()> {
    let project_root =
        PathBuf::from(std::env::var("WEATHERBOT_ROOT").unwrap_or_else(|_| ".".to_string()));
    run_cli(&project_root)
}
