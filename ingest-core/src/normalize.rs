use crate::{
    model::{CanonicalWeatherDocument, RawHourlyRecord},
    provider::ProviderId,
    time::{self, Clock},
};

/// City used when the provider omits one.
pub const UNKNOWN_CITY: &str = "UNKNOWN";

/// Upsert key: two records with the same city and hour are the same document.
pub fn document_id(city: &str, dt: &str) -> String {
    format!("{city}|{dt}")
}

/// Map one merged hourly record onto the stored document shape.
///
/// Absent source fields stay `None`; only the city gets a placeholder.
/// Values are not range-checked.
pub fn normalize(rec: &RawHourlyRecord, clock: &dyn Clock) -> CanonicalWeatherDocument {
    let dt = time::canonical_timestamp(rec, clock);

    let city = rec
        .location
        .city_name
        .as_deref()
        .filter(|c| !c.is_empty())
        .unwrap_or(UNKNOWN_CITY)
        .to_string();

    let id = document_id(&city, &dt);
    let stamped = time::format_utc_precise(clock.now());
    let wx = rec.weather.as_ref();

    CanonicalWeatherDocument {
        id,
        provider: ProviderId::Weatherbit.as_str().to_string(),

        city,
        country: rec.location.country_code.clone(),
        state_code: rec.location.state_code.clone(),
        lat: rec.location.lat,
        lon: rec.location.lon,

        dt,

        temp_c: rec.temp,
        feels_like_c: rec.app_temp,
        rh: rec.rh,
        dewpt_c: rec.dewpt,
        wind_ms: rec.wind_spd,
        wind_gust_ms: rec.wind_gust_spd,
        wind_dir_deg: rec.wind_dir,
        wind_cdir: rec.wind_cdir.clone(),
        wind_cdir_full: rec.wind_cdir_full.clone(),
        pop_pct: rec.pop,
        precip_mm: rec.precip,
        snow_mm: rec.snow,
        snow_depth_mm: rec.snow_depth,
        clouds_low_pct: rec.clouds_low,
        clouds_mid_pct: rec.clouds_mid,
        clouds_hi_pct: rec.clouds_hi,
        clouds_pct: rec.clouds,
        slp_mb: rec.slp,
        pres_mb: rec.pres,
        vis_km: rec.vis,
        uv_index: rec.uv,
        dhi_wm2: rec.dhi,
        dni_wm2: rec.dni,
        ghi_wm2: rec.ghi,
        solar_rad_wm2: rec.solar_rad,
        ozone_dobson: rec.ozone,

        conditions: wx.and_then(|w| w.description.clone()),
        weather_code: wx.and_then(|w| w.code),
        weather_icon: wx.and_then(|w| w.icon.clone()),
        pod: rec.pod.clone(),

        ingested_at: stamped.clone(),
        updated_at: stamped,
    }
}
