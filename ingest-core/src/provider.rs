use crate::{Config, RawHourlyRecord, provider::weatherbit::WeatherbitSource};
use async_trait::async_trait;
use std::{fmt::Debug, time::Duration};

pub mod weatherbit;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderId {
    Weatherbit,
}

impl ProviderId {
    /// Tag stored on every document as `provider`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::Weatherbit => "weatherbit",
        }
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where hourly forecast records come from.
#[async_trait]
pub trait ForecastSource: Send + Sync + Debug {
    fn provider(&self) -> ProviderId;

    /// One forecast response, split into hourly records with location
    /// metadata merged in. Any transport or status failure is an error.
    async fn fetch_hourly(&self) -> anyhow::Result<Vec<RawHourlyRecord>>;
}

/// Construct the forecast source described by `config`.
pub fn source_from_config(config: &Config) -> anyhow::Result<Box<dyn ForecastSource>> {
    let provider = config.provider_config()?;

    let source = WeatherbitSource::new(
        &provider.url,
        provider.api_key.clone(),
        Duration::from_secs(provider.timeout_secs),
    )?;

    Ok(Box::new(source))
}
