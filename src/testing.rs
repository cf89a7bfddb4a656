//! In-memory collaborators shared by the router, poller and broadcast tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::platform::{InboundMessage, Messenger};
use crate::weather::{CurrentConditions, ForecastPoint, Location, WeatherProvider};

#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Text(i64, String),
    LocationRequest(i64, String),
}

#[derive(Default)]
pub struct FakeMessenger {
    pub batches: Mutex<VecDeque<Result<Vec<InboundMessage>>>>,
    pub fetched_after: Mutex<Vec<u64>>,
    pub sent: Mutex<Vec<Sent>>,
    pub fail_sends: Mutex<bool>,
}

impl FakeMessenger {
    pub fn push_batch(&self, batch: Vec<InboundMessage>) {
        self.batches.lock().unwrap().push_back(Ok(batch));
    }

    pub fn push_error(&self, message: &str) {
        self.batches
            .lock()
            .unwrap()
            .push_back(Err(anyhow::anyhow!(message.to_string())));
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn texts_to(&self, chat_id: i64) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Text(c, t) if c == chat_id => Some(t),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Messenger for FakeMessenger {
    async fn fetch_updates(&self, after: u64) -> Result<Vec<InboundMessage>> {
        self.fetched_after.lock().unwrap().push(after);
        self.batches
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()> {
        if *self.fail_sends.lock().unwrap() {
            anyhow::bail!("send failed");
        }
        self.sent
            .lock()
            .unwrap()
            .push(Sent::Text(chat_id, text.to_string()));
        Ok(())
    }

    async fn request_location(&self, chat_id: i64, text: &str) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push(Sent::LocationRequest(chat_id, text.to_string()));
        Ok(())
    }
}

pub fn conditions(place: &str, temperature: f64, description: &str) -> CurrentConditions {
    CurrentConditions {
        temperature,
        feels_like: temperature,
        humidity: 50,
        wind_speed: 10.0,
        description: description.to_string(),
        place_name: place.to_string(),
    }
}

/// Three-hourly points covering the next two days from `start`
pub fn forecast_from(start: DateTime<Utc>, temperature: f64) -> Vec<ForecastPoint> {
    (0..16)
        .map(|i| ForecastPoint {
            timestamp: start + Duration::hours(3 * i),
            temperature: temperature + i as f64,
            description: "clear sky".to_string(),
            precipitation_probability: Some(0.1),
        })
        .collect()
}

pub struct FakeWeather {
    pub current: Mutex<Option<CurrentConditions>>,
    pub forecast: Mutex<Option<Vec<ForecastPoint>>>,
    pub requests: Mutex<Vec<Location>>,
}

impl FakeWeather {
    pub fn new(current: CurrentConditions, forecast: Vec<ForecastPoint>) -> Self {
        Self {
            current: Mutex::new(Some(current)),
            forecast: Mutex::new(Some(forecast)),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Every call fails, like a provider timing out
    pub fn failing() -> Self {
        Self {
            current: Mutex::new(None),
            forecast: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn set_current(&self, current: CurrentConditions) {
        *self.current.lock().unwrap() = Some(current);
    }

    pub fn set_forecast(&self, forecast: Vec<ForecastPoint>) {
        *self.forecast.lock().unwrap() = Some(forecast);
    }

    pub fn requests(&self) -> Vec<Location> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl WeatherProvider for FakeWeather {
    async fn current(&self, location: &Location) -> Result<CurrentConditions> {
        self.requests.lock().unwrap().push(location.clone());
        self.current
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| anyhow::anyhow!("operation timed out"))
    }

    async fn forecast(&self, location: &Location) -> Result<Vec<ForecastPoint>> {
        self.requests.lock().unwrap().push(location.clone());
        self.forecast
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| anyhow::anyhow!("operation timed out"))
    }
}

/// Offset store backed by a plain integer; can be told to fail writes.
#[derive(Default)]
pub struct MemoryOffsetStore {
    pub value: Mutex<u64>,
    pub saves: Mutex<Vec<u64>>,
    pub fail_next: Mutex<usize>,
}

impl MemoryOffsetStore {
    pub fn starting_at(value: u64) -> Self {
        Self {
            value: Mutex::new(value),
            ..Default::default()
        }
    }

    pub fn get(&self) -> u64 {
        *self.value.lock().unwrap()
    }
}

#[async_trait]
impl crate::offset::OffsetStore for MemoryOffsetStore {
    async fn load(&self) -> u64 {
        self.get()
    }

    async fn save(&self, update_id: u64) -> Result<()> {
        let mut fail = self.fail_next.lock().unwrap();
        if *fail > 0 {
            *fail -= 1;
            anyhow::bail!("disk full");
        }
        *self.value.lock().unwrap() = update_id;
        self.saves.lock().unwrap().push(update_id);
        Ok(())
    }
}
