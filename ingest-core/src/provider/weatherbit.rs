use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::{Client, Url};
use std::time::Duration;
use tracing::debug;

use crate::model::{ForecastPayload, RawHourlyRecord};

use super::{ForecastSource, ProviderId};

/// Weatherbit hourly forecast endpoint, e.g.
/// `https://api.weatherbit.io/v2.0/forecast/hourly?city=Austin,TX&hours=24`.
#[derive(Debug, Clone)]
pub struct WeatherbitSource {
    url: Url,
    api_key: Option<String>,
    http: Client,
}

impl WeatherbitSource {
    /// `timeout` bounds the whole request; there is no retry.
    pub fn new(url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let url =
            Url::parse(url).with_context(|| format!("Invalid forecast endpoint URL '{url}'"))?;

        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { url, api_key, http })
    }
}

#[async_trait]
impl ForecastSource for WeatherbitSource {
    fn provider(&self) -> ProviderId {
        ProviderId::Weatherbit
    }

    async fn fetch_hourly(&self) -> Result<Vec<RawHourlyRecord>> {
        let mut req = self.http.get(self.url.clone());
        if let Some(key) = &self.api_key {
            req = req.query(&[("key", key.as_str())]);
        }

        let res = req
            .send()
            .await
            .context("Failed to send request to Weatherbit (hourly forecast)")?;

        let status = res.status();
        let body = res
            .text()
            .await
            .context("Failed to read Weatherbit hourly response body")?;

        if !status.is_success() {
            return Err(anyhow!(
                "Weatherbit hourly request failed with status {}: {}",
                status,
                truncate_body(&body),
            ));
        }

        let records = parse_hourly_body(&body)?;
        debug!(records = records.len(), "fetched hourly forecast");
        Ok(records)
    }
}

/// Decode a response body and merge its location block into each hour.
pub fn parse_hourly_body(body: &str) -> Result<Vec<RawHourlyRecord>> {
    let payload: ForecastPayload =
        serde_json::from_str(body).context("Failed to parse Weatherbit hourly JSON")?;
    Ok(payload.into_records())
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "city_name": "Austin",
        "country_code": "US",
        "state_code": "TX",
        "lat": 30.3,
        "lon": -97.7,
        "timezone": "America/Chicago",
        "data": [
            {
                "timestamp_utc": "2023-11-14T22:00:00",
                "timestamp_local": "2023-11-14T16:00:00",
                "ts": 1699999200,
                "temp": 21.5,
                "app_temp": 21.0,
                "rh": 40,
                "wind_spd": 3.2,
                "wind_cdir": "SSE",
                "pop": 0,
                "weather": { "description": "Clear sky", "code": 800, "icon": "c01d" },
                "pod": "d"
            },
            {
                "timestamp_utc": "2023-11-14T23:00:00",
                "ts": 1700002800,
                "temp": null
            }
        ]
    }"#;

    #[test]
    fn parses_sample_response() {
        let records = parse_hourly_body(SAMPLE).expect("parse");
        assert_eq!(records.len(), 2);

        let first = &records[0];
        assert_eq!(first.location.city_name.as_deref(), Some("Austin"));
        assert_eq!(first.timestamp_utc.as_deref(), Some("2023-11-14T22:00:00"));
        assert_eq!(first.rh, Some(40.0));
        assert_eq!(first.weather.as_ref().and_then(|w| w.code), Some(800));

        assert_eq!(records[1].temp, None);
        assert_eq!(records[1].location.country_code.as_deref(), Some("US"));
    }

    #[test]
    fn rejects_non_json_body() {
        let err = parse_hourly_body("<html>rate limited</html>").unwrap_err();
        assert!(err.to_string().contains("Failed to parse Weatherbit hourly JSON"));
    }

    #[test]
    fn truncates_long_bodies_on_char_boundary() {
        let body = "é".repeat(300);
        let out = truncate_body(&body);
        assert!(out.ends_with("..."));
        assert_eq!(out.chars().count(), 203);
        assert_eq!(truncate_body("short"), "short");
    }

    #[test]
    fn rejects_invalid_url() {
        let err = WeatherbitSource::new("::nope", None, Duration::from_secs(20)).unwrap_err();
        assert!(err.to_string().contains("Invalid forecast endpoint URL"));
    }
}
