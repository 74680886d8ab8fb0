use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;

use crate::{RawObservation, http};

use super::WeatherProvider;

const CURRENT_WEATHER_PATH: &str = "data/2.5/weather";

#[derive(Debug, Clone)]
pub struct OpenWeatherProvider {
    api_key: String,
    current_url: String,
    http: Client,
}

impl OpenWeatherProvider {
    pub fn new(api_key: String) -> Self {
        Self::with_client(Client::new(), "https://api.openweathermap.org", api_key)
    }

    pub fn with_client(http: Client, base_url: &str, api_key: String) -> Self {
        Self {
            api_key,
            current_url: http::join_url(base_url, CURRENT_WEATHER_PATH),
            http,
        }
    }

    pub fn current_url(&self) -> &str {
        &self.current_url
    }

    async fn fetch_current(&self, city: &str) -> Result<RawObservation> {
        let res = self
            .http
            .get(&self.current_url)
            .query(&[
                ("q", city),
                ("appid", self.api_key.as_str()),
                ("units", "metric"),
            ])
            .send()
            .await
            .with_context(|| format!("Failed to send request to OpenWeather for {city}"))?;

        let status = res.status();
        let body = res
            .text()
            .await
            .context("Failed to read OpenWeather current response body")?;

        if !status.is_success() {
            return Err(anyhow!(
                "OpenWeather current request for {} failed with status {}: {}",
                city,
                status,
                http::truncate_body(&body),
            ));
        }

        let raw = RawObservation::from_json(&body)
            .with_context(|| format!("OpenWeather returned an unusable observation for {city}"))?;

        tracing::debug!(message = "fetched observation", city = %city, dt = ?raw.dt);
        Ok(raw)
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherProvider {
    async fn current(&self, city: &str) -> Result<RawObservation> {
        self.fetch_current(city).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_endpoint_is_current_weather() {
        let provider = OpenWeatherProvider::new("KEY".into());
        assert_eq!(
            provider.current_url(),
            "https://api.openweathermap.org/data/2.5/weather"
        );
    }

    #[test]
    fn custom_base_url_keeps_single_slash() {
        let provider =
            OpenWeatherProvider::with_client(Client::new(), "http://localhost:8080/", "KEY".into());
        assert_eq!(provider.current_url(), "http://localhost:8080/data/2.5/weather");
    }
}
