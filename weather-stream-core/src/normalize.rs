//! Raw provider observation → canonical record.
//!
//! The transform is pure: the only clock it sees is the capture instant the
//! caller passes in, so the same input and instant always produce the same
//! record.

use chrono::{DateTime, SecondsFormat, TimeZone};
use std::fmt;

use crate::{
    error::NormalizeError,
    model::{CanonicalRecord, RawObservation, TempCategory},
};

pub const DATA_SOURCE: &str = "openweather_api";
pub const PROCESSOR: &str = "weather-stream";
pub const SCHEMA_VERSION: &str = "1.0";

/// Wall-clock layout of `created_at`.
pub const CREATED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const HEAT_INDEX_MIN_TEMP_C: f64 = 27.0;

/// Derived fields attached to a record when their inputs are available.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Enrichment {
    pub temp_category: Option<TempCategory>,
    pub heat_index: Option<f64>,
}

impl Enrichment {
    /// Nothing is derived unless both temperature and humidity are known.
    /// The heat index additionally needs `temp >= 27`.
    pub fn derive(temp: Option<f64>, humidity: Option<f64>) -> Self {
        let (Some(temp), Some(humidity)) = (temp, humidity) else {
            return Self::default();
        };

        let heat_index = (temp >= HEAT_INDEX_MIN_TEMP_C)
            .then(|| round_to_millis(temp + 0.5 * (humidity - 50.0)));

        Self {
            temp_category: Some(TempCategory::from_celsius(temp)),
            heat_index,
        }
    }
}

/// Rounds the exact binary value, not `value * 1000`.
fn round_to_millis(value: f64) -> f64 {
    format!("{value:.3}").parse().unwrap_or(value)
}

/// Build the canonical record for one observation captured at `captured_at`.
///
/// `created_at` is the capture wall clock in the instant's own time zone;
/// `processed_at` is the same instant in RFC 3339.
pub fn normalize<Tz>(
    raw: &RawObservation,
    captured_at: &DateTime<Tz>,
) -> Result<CanonicalRecord, NormalizeError>
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let condition = raw
        .weather
        .first()
        .ok_or_else(|| NormalizeError::malformed("weather condition list is empty"))?;

    let wind = raw.wind.unwrap_or_default();
    let rain = raw.rain.unwrap_or_default();
    let snow = raw.snow.unwrap_or_default();

    let enrichment =
        Enrichment::derive(Some(raw.main.temp), Some(f64::from(raw.main.humidity)));

    Ok(CanonicalRecord {
        created_at: captured_at.format(CREATED_AT_FORMAT).to_string(),
        timestamp: raw.dt.unwrap_or_else(|| captured_at.timestamp()),
        city_id: raw.id.unwrap_or(0),
        city_name: raw.name.clone().unwrap_or_default(),
        country: raw.sys.country.clone(),
        lat: raw.coord.lat,
        lon: raw.coord.lon,
        timezone: raw.timezone.unwrap_or(0),
        temp: raw.main.temp,
        feels_like: raw.main.feels_like,
        temp_min: raw.main.temp_min,
        temp_max: raw.main.temp_max,
        pressure: raw.main.pressure,
        humidity: raw.main.humidity,
        sea_level: raw.main.sea_level.unwrap_or(0),
        grnd_level: raw.main.grnd_level.unwrap_or(0),
        // The provider reports 0 when visibility is unknown.
        visibility: raw.visibility.filter(|meters| *meters != 0),
        clouds: raw.clouds.all,
        wind_speed: wind.speed.unwrap_or(0.0),
        wind_deg: wind.deg.unwrap_or(0),
        wind_gust: wind.gust.unwrap_or(0.0),
        weather_main: condition.main.clone(),
        weather_description: condition.description.clone(),
        weather_icon: condition.icon.clone(),
        sunrise: raw.sys.sunrise,
        sunset: raw.sys.sunset,
        rain_1h: rain.one_hour.unwrap_or(0.0),
        rain_3h: rain.three_hours.unwrap_or(0.0),
        snow_1h: snow.one_hour.unwrap_or(0.0),
        snow_3h: snow.three_hours.unwrap_or(0.0),
        temp_category: enrichment.temp_category,
        heat_index: enrichment.heat_index,
        processed_at: captured_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        data_source: DATA_SOURCE.to_string(),
        processor: PROCESSOR.to_string(),
        version: SCHEMA_VERSION.to_string(),
    })
}

/// Validate a provider response body and normalize it in one step.
pub fn normalize_json<Tz>(
    body: &str,
    captured_at: &DateTime<Tz>,
) -> Result<CanonicalRecord, NormalizeError>
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let raw = RawObservation::from_json(body)?;
    normalize(&raw, captured_at)
}
