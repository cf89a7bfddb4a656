//! Periodic weather push to subscribers, with sudden-change and extreme
//! temperature notices.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, FixedOffset, Utc};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::{AlertThresholds, BroadcastConfig};
use crate::format;
use crate::platform::Messenger;
use crate::session::fingerprint;
use crate::subscribers::SubscriberStore;
use crate::weather::{CurrentConditions, Location, WeatherProvider};

#[derive(Default)]
struct BroadcastState {
    last_temperature: Option<f64>,
    last_fingerprint: Option<String>,
}

pub struct Broadcaster {
    weather: Arc<dyn WeatherProvider>,
    messenger: Arc<dyn Messenger>,
    subscribers: Arc<dyn SubscriberStore>,
    city: String,
    timezone: FixedOffset,
    fixed_chats: Vec<i64>,
    sudden_change: f64,
    thresholds: AlertThresholds,
    state: Mutex<BroadcastState>,
}

impl Broadcaster {
    pub fn new(
        weather: Arc<dyn WeatherProvider>,
        messenger: Arc<dyn Messenger>,
        subscribers: Arc<dyn SubscriberStore>,
        city: &str,
        timezone: FixedOffset,
        config: &BroadcastConfig,
        thresholds: AlertThresholds,
    ) -> Self {
        Self {
            weather,
            messenger,
            subscribers,
            city: city.to_string(),
            timezone,
            fixed_chats: config.chat_ids.clone(),
            sudden_change: config.sudden_change,
            thresholds,
            state: Mutex::new(BroadcastState::default()),
        }
    }

    async fn recipients(&self) -> Result<Vec<i64>> {
        let mut chats = self.fixed_chats.clone();
        for id in self.subscribers.list().await? {
            if !chats.contains(&id) {
                chats.push(id);
            }
        }
        Ok(chats)
    }

    /// Messages due against `state`, in send order, and the state to keep
    /// once they have gone out.
    fn compose(
        &self,
        state: &BroadcastState,
        current: &CurrentConditions,
        now: DateTime<Utc>,
    ) -> (Vec<String>, BroadcastState) {
        let temp = current.temperature;
        let mut messages = Vec::new();

        let full = format::full_weather(current, &self.city, now.with_timezone(&self.timezone));
        let fp = fingerprint(&full);
        if state.last_fingerprint.as_deref() != Some(fp.as_str()) {
            messages.push(full);
        }

        if let Some(previous) = state.last_temperature {
            if (temp - previous).abs() >= self.sudden_change {
                messages.push(format::sudden_change(previous, temp));
            }
        }
        if temp <= self.thresholds.cold_threshold {
            messages.push(format::extreme_cold(temp));
        }
        if temp >= self.thresholds.heat_threshold {
            messages.push(format::extreme_heat(temp));
        }

        let next = BroadcastState {
            last_temperature: Some(temp),
            last_fingerprint: Some(fp),
        };
        (messages, next)
    }

    /// Send whatever is due. Returns the number of messages delivered. The
    /// change baseline only moves once delivery has been attempted.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut state = self.state.lock().await;
        let current = self
            .weather
            .current(&Location::Named(self.city.clone()))
            .await
            .context("Failed to fetch weather for broadcast")?;

        let (messages, next) = self.compose(&state, &current, now);
        if messages.is_empty() {
            *state = next;
            return Ok(0);
        }

        let chats = self.recipients().await?;
        let mut delivered = 0;
        for chat in &chats {
            for text in &messages {
                match self.messenger.send_text(*chat, text).await {
                    Ok(()) => delivered += 1,
                    Err(e) => warn!("Broadcast to chat {} failed: {:#}", chat, e),
                }
            }
        }
        *state = next;
        info!(
            "Broadcast {} message(s) to {} chat(s)",
            messages.len(),
            chats.len()
        );
        Ok(delivered)
    }
}
