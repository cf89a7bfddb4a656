pub mod openweather;

use std::fmt;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Latitude/longitude pair in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Where to ask the provider about
#[derive(Debug, Clone, PartialEq)]
pub enum Location {
    Named(String),
    Point(Coordinate),
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Named(name) => write!(f, "{}", name),
            Location::Point(c) => write!(f, "{},{}", c.latitude, c.longitude),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CurrentConditions {
    /// °C
    pub temperature: f64,
    /// °C
    pub feels_like: f64,
    /// Percent
    pub humidity: u8,
    /// km/h
    pub wind_speed: f64,
    /// Provider description, untranslated
    pub description: String,
    pub place_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForecastPoint {
    pub timestamp: DateTime<Utc>,
    pub temperature: f64,
    pub description: String,
    /// 0.0..=1.0 when the provider reports it
    pub precipitation_probability: Option<f64>,
}

#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn current(&self, location: &Location) -> Result<CurrentConditions>;

    /// Forecast intervals in ascending timestamp order
    async fn forecast(&self, location: &Location) -> Result<Vec<ForecastPoint>>;
}
