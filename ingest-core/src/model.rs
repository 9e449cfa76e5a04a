use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::lenient;

/// Location block that the provider sends once per response.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LocationMeta {
    #[serde(default, deserialize_with = "lenient::text")]
    pub city_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub country_code: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub state_code: Option<String>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub lat: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub lon: Option<f64>,
}

/// Nested `weather` object of an hourly entry.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct WeatherCondition {
    #[serde(default, deserialize_with = "lenient::text")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient::integer")]
    pub code: Option<i64>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub icon: Option<String>,
}

/// One hourly forecast entry as the provider sends it, with the response's
/// location metadata merged in.
///
/// Decoding a JSON object into this type never fails: unknown keys are
/// ignored, and missing or mistyped keys become `None`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawHourlyRecord {
    #[serde(flatten)]
    pub location: LocationMeta,

    #[serde(default, deserialize_with = "lenient::text")]
    pub timestamp_utc: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub datetime: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub ob_time: Option<String>,
    #[serde(default, deserialize_with = "lenient::integer")]
    pub ts: Option<i64>,

    #[serde(default, deserialize_with = "lenient::number")]
    pub temp: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub app_temp: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub rh: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub dewpt: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub wind_spd: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub wind_gust_spd: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub wind_dir: Option<f64>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub wind_cdir: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub wind_cdir_full: Option<String>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub pop: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub precip: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub snow: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub snow_depth: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub clouds_low: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub clouds_mid: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub clouds_hi: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub clouds: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub slp: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub pres: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub vis: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub uv: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub dhi: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub dni: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub ghi: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub solar_rad: Option<f64>,
    #[serde(default, deserialize_with = "lenient::number")]
    pub ozone: Option<f64>,

    #[serde(default, deserialize_with = "lenient::condition")]
    pub weather: Option<WeatherCondition>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub pod: Option<String>,
}

/// Top-level hourly forecast response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ForecastPayload {
    #[serde(flatten)]
    pub location: LocationMeta,
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub data: Vec<Value>,
}

impl ForecastPayload {
    /// Split the response into hourly records, stamping each one with the
    /// response's location metadata. Metadata wins over same-named keys on
    /// the hourly entry.
    pub fn into_records(self) -> Vec<RawHourlyRecord> {
        let location = self.location;

        self.data
            .into_iter()
            .enumerate()
            .filter_map(|(idx, entry)| {
                if !entry.is_object() {
                    warn!(index = idx, "skipping hourly entry that is not a JSON object");
                    return None;
                }
                match serde_json::from_value::<RawHourlyRecord>(entry) {
                    Ok(mut rec) => {
                        rec.location = location.clone();
                        Some(rec)
                    }
                    Err(err) => {
                        warn!(index = idx, error = %err, "skipping undecodable hourly entry");
                        None
                    }
                }
            })
            .collect()
    }
}

/// Storage-ready hourly forecast document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalWeatherDocument {
    /// `city|dt`, the upsert key.
    pub id: String,
    pub provider: String,

    pub city: String,
    pub country: Option<String>,
    pub state_code: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,

    /// Canonical UTC timestamp of the forecast hour.
    pub dt: String,

    pub temp_c: Option<f64>,
    pub feels_like_c: Option<f64>,
    pub rh: Option<f64>,
    pub dewpt_c: Option<f64>,
    pub wind_ms: Option<f64>,
    pub wind_gust_ms: Option<f64>,
    pub wind_dir_deg: Option<f64>,
    pub wind_cdir: Option<String>,
    pub wind_cdir_full: Option<String>,
    pub pop_pct: Option<f64>,
    pub precip_mm: Option<f64>,
    pub snow_mm: Option<f64>,
    pub snow_depth_mm: Option<f64>,
    pub clouds_low_pct: Option<f64>,
    pub clouds_mid_pct: Option<f64>,
    pub clouds_hi_pct: Option<f64>,
    pub clouds_pct: Option<f64>,
    pub slp_mb: Option<f64>,
    pub pres_mb: Option<f64>,
    pub vis_km: Option<f64>,
    pub uv_index: Option<f64>,
    pub dhi_wm2: Option<f64>,
    pub dni_wm2: Option<f64>,
    pub ghi_wm2: Option<f64>,
    pub solar_rad_wm2: Option<f64>,
    pub ozone_dobson: Option<f64>,

    pub conditions: Option<String>,
    pub weather_code: Option<i64>,
    pub weather_icon: Option<String>,
    pub pod: Option<String>,

    pub ingested_at: String,
    pub updated_at: String,
}
