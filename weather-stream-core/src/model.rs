use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::NormalizeError;

/// Provider "current weather" response for one city at one instant.
///
/// Mandatory members are plain fields, so a payload missing any of them is
/// rejected while deserializing. Optional members default as documented on
/// each field. Members not listed here are dropped.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawObservation {
    /// City id; defaults to 0.
    pub id: Option<i64>,
    /// City name; defaults to "".
    pub name: Option<String>,
    /// Provider epoch seconds; defaults to the capture instant.
    pub dt: Option<i64>,
    /// Shift from UTC in seconds; defaults to 0.
    pub timezone: Option<i32>,
    pub coord: RawCoord,
    pub main: RawMain,
    /// Meters. Absent and 0 both mean "not reported".
    pub visibility: Option<u32>,
    pub clouds: RawClouds,
    pub wind: Option<RawWind>,
    pub weather: Vec<RawCondition>,
    pub sys: RawSys,
    pub rain: Option<RawPrecipitation>,
    pub snow: Option<RawPrecipitation>,
}

impl RawObservation {
    pub fn from_json(body: &str) -> Result<Self, NormalizeError> {
        Ok(serde_json::from_str(body)?)
    }

    pub fn from_value(value: Value) -> Result<Self, NormalizeError> {
        Ok(serde_json::from_value(value)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct RawCoord {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct RawMain {
    pub temp: f64,
    pub feels_like: f64,
    pub temp_min: f64,
    pub temp_max: f64,
    pub pressure: u32,
    pub humidity: u8,
    pub sea_level: Option<u32>,
    pub grnd_level: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct RawClouds {
    pub all: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
pub struct RawWind {
    pub speed: Option<f64>,
    pub deg: Option<u16>,
    pub gust: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawCondition {
    pub main: String,
    pub description: String,
    pub icon: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawSys {
    pub country: String,
    pub sunrise: i64,
    pub sunset: i64,
}

/// Rain or snow accumulation in millimeters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
pub struct RawPrecipitation {
    #[serde(rename = "1h")]
    pub one_hour: Option<f64>,
    #[serde(rename = "3h")]
    pub three_hours: Option<f64>,
}

/// Coarse temperature band, half-open on the upper bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TempCategory {
    Freezing,
    Cold,
    Mild,
    Warm,
    Hot,
}

impl TempCategory {
    pub fn from_celsius(temp: f64) -> Self {
        if temp < 0.0 {
            TempCategory::Freezing
        } else if temp < 10.0 {
            TempCategory::Cold
        } else if temp < 20.0 {
            TempCategory::Mild
        } else if temp < 30.0 {
            TempCategory::Warm
        } else {
            TempCategory::Hot
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TempCategory::Freezing => "freezing",
            TempCategory::Cold => "cold",
            TempCategory::Mild => "mild",
            TempCategory::Warm => "warm",
            TempCategory::Hot => "hot",
        }
    }
}

impl std::fmt::Display for TempCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Flat, schema-stable record handed to every sink.
///
/// Field order is the serialization order. Only `temp_category` and
/// `heat_index` may be missing from the serialized form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub created_at: String,
    pub timestamp: i64,
    pub city_id: i64,
    pub city_name: String,
    pub country: String,
    pub lat: f64,
    pub lon: f64,
    pub timezone: i32,
    pub temp: f64,
    pub feels_like: f64,
    pub temp_min: f64,
    pub temp_max: f64,
    pub pressure: u32,
    pub humidity: u8,
    pub sea_level: u32,
    pub grnd_level: u32,
    pub visibility: Option<u32>,
    pub clouds: u8,
    pub wind_speed: f64,
    pub wind_deg: u16,
    pub wind_gust: f64,
    pub weather_main: String,
    pub weather_description: String,
    pub weather_icon: String,
    pub sunrise: i64,
    pub sunset: i64,
    pub rain_1h: f64,
    pub rain_3h: f64,
    pub snow_1h: f64,
    pub snow_3h: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_category: Option<TempCategory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heat_index: Option<f64>,
    pub processed_at: String,
    pub data_source: String,
    pub processor: String,
    pub version: String,
}
