use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::DateTime;
use serde::Deserialize;
use tracing::debug;

use crate::weather::{CurrentConditions, ForecastPoint, Location, WeatherProvider};

/// OpenWeatherMap reports wind in m/s with `units=metric`
const MS_TO_KMH: f64 = 3.6;

#[derive(Debug, Deserialize)]
struct CurrentResponse {
    #[serde(default)]
    name: String,
    main: MainBlock,
    wind: WindBlock,
    #[serde(default)]
    weather: Vec<ConditionBlock>,
}

#[derive(Debug, Deserialize)]
struct MainBlock {
    temp: f64,
    #[serde(default)]
    feels_like: Option<f64>,
    #[serde(default)]
    humidity: Option<u8>,
}

#[derive(Debug, Deserialize)]
struct WindBlock {
    #[serde(default)]
    speed: f64,
}

#[derive(Debug, Deserialize)]
struct ConditionBlock {
    description: String,
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    list: Vec<ForecastEntry>,
}

#[derive(Debug, Deserialize)]
struct ForecastEntry {
    dt: i64,
    main: MainBlock,
    #[serde(default)]
    weather: Vec<ConditionBlock>,
    #[serde(default)]
    pop: Option<f64>,
}

fn first_description(weather: &[ConditionBlock]) -> String {
    weather
        .first()
        .map(|w| w.description.clone())
        .unwrap_or_default()
}

pub struct OpenWeatherClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenWeatherClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build OpenWeatherMap HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    fn location_query(location: &Location) -> Vec<(&'static str, String)> {
        match location {
            Location::Named(city) => vec![("q", city.clone())],
            Location::Point(c) => vec![
                ("lat", c.latitude.to_string()),
                ("lon", c.longitude.to_string()),
            ],
        }
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        location: &Location,
    ) -> Result<T> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let mut query = Self::location_query(location);
        query.push(("appid", self.api_key.clone()));
        query.push(("units", "metric".to_string()));

        debug!("Requesting OpenWeatherMap {} for {}", endpoint, location);

        let response = self
            .client
            .get(&url)
            .query(&query)
            .send()
            .await
            .with_context(|| format!("Failed to send request to OpenWeatherMap {}", endpoint))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            anyhow::bail!("OpenWeatherMap API error ({}): {}", status, error_body);
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse OpenWeatherMap {} response", endpoint))
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherClient {
    async fn current(&self, location: &Location) -> Result<CurrentConditions> {
        let data: CurrentResponse = self.get("weather", location).await?;
        Ok(CurrentConditions {
            temperature: data.main.temp,
            feels_like: data.main.feels_like.unwrap_or(data.main.temp),
            humidity: data.main.humidity.unwrap_or_default(),
            wind_speed: data.wind.speed * MS_TO_KMH,
            description: first_description(&data.weather),
            place_name: data.name,
        })
    }

    async fn forecast(&self, location: &Location) -> Result<Vec<ForecastPoint>> {
        let data: ForecastResponse = self.get("forecast", location).await?;
        let mut points = data
            .list
            .into_iter()
            .map(|entry| {
                let timestamp = DateTime::from_timestamp(entry.dt, 0)
                    .with_context(|| format!("Invalid forecast timestamp: {}", entry.dt))?;
                Ok(ForecastPoint {
                    timestamp,
                    temperature: entry.main.temp,
                    description: first_description(&entry.weather),
                    precipitation_probability: entry.pop,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        points.sort_by_key(|p| p.timestamp);
        Ok(points)
    }
}
