//! Core library for the `weather-stream` pipeline.
//!
//! This crate defines:
//! - The provider observation schema and its normalization into a flat,
//!   schema-stable record
//! - The OpenWeather client and the record sinks
//! - The polling pipeline, health probes and dashboard scaffolding
//! - Configuration handling
//!
//! It is used by `weather-stream-cli`, but the normalizer has no I/O and can be
//! embedded anywhere records are produced.

pub mod config;
pub mod dashboard;
pub mod error;
pub mod health;
pub mod http;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod provider;
pub mod sink;

pub use config::{Config, SinkKind};
pub use error::NormalizeError;
pub use model::{CanonicalRecord, RawObservation, TempCategory};
pub use normalize::{Enrichment, normalize, normalize_json};
pub use pipeline::{CycleReport, Pipeline};
pub use provider::WeatherProvider;
pub use sink::RecordSink;
