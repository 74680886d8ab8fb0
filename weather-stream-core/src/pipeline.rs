//! Periodic fetch → normalize → deliver loop over a fixed list of cities.
//!
//! A failure for one city is logged and that city is skipped for the cycle;
//! the remaining cities are still processed.

use anyhow::Result;
use chrono::Local;
use std::{future::Future, time::Duration};
use tokio::time::MissedTickBehavior;
use tracing::Instrument;

use crate::{
    CanonicalRecord, NormalizeError, normalize::normalize, provider::WeatherProvider,
    sink::RecordSink,
};

/// Shortest delay between cycles; a zero interval is raised to this.
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub cycle: u64,
    pub succeeded: usize,
    pub failed: usize,
}

impl CycleReport {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }
}

#[derive(Debug)]
pub struct Pipeline {
    provider: Box<dyn WeatherProvider>,
    sink: Box<dyn RecordSink>,
    cities: Vec<String>,
}

impl Pipeline {
    pub fn new(
        provider: Box<dyn WeatherProvider>,
        sink: Box<dyn RecordSink>,
        cities: Vec<String>,
    ) -> Self {
        Self {
            provider,
            sink,
            cities,
        }
    }

    pub fn cities(&self) -> &[String] {
        &self.cities
    }

    /// Fetch, normalize and deliver one city's current observation.
    pub async fn process_city(&self, city: &str) -> Result<CanonicalRecord> {
        let raw = self.provider.current(city).await?;
        let record = normalize(&raw, &Local::now())?;
        self.sink.send(&record).await?;
        Ok(record)
    }

    pub async fn run_cycle(&self, cycle: u64) -> CycleReport {
        let mut report = CycleReport {
            cycle,
            succeeded: 0,
            failed: 0,
        };

        for city in &self.cities {
            match self.process_city(city).await {
                Ok(record) => {
                    report.succeeded += 1;
                    tracing::info!(
                        message = "delivered record",
                        city = %city,
                        temp = record.temp,
                        description = %record.weather_description,
                    );
                }
                Err(e) if e.downcast_ref::<NormalizeError>().is_some() => {
                    report.failed += 1;
                    tracing::error!(
                        message = "provider returned a malformed observation",
                        city = %city,
                        error = %format!("{e:#}"),
                    );
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(
                        message = "failed to process city",
                        city = %city,
                        error = %format!("{e:#}"),
                    );
                }
            }
        }

        if let Err(e) = self.sink.flush().await {
            tracing::warn!(message = "failed to flush sink", error = %format!("{e:#}"));
        }

        tracing::info!(
            message = "cycle finished",
            cycle = cycle,
            succeeded = report.succeeded,
            total = report.total(),
        );
        report
    }

    /// Run cycles every `interval` until `max_cycles` have completed or
    /// `shutdown` resolves. Returns the number of cycles run.
    pub async fn run<F>(&self, interval: Duration, max_cycles: Option<u64>, shutdown: F) -> u64
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        if interval.is_zero() {
            tracing::warn!(
                message = "zero polling interval raised to minimum",
                interval_secs = MIN_INTERVAL.as_secs(),
            );
        }
        let interval = interval.max(MIN_INTERVAL);

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            message = "weather polling started",
            cities = self.cities.len(),
            interval_secs = interval.as_secs(),
        );

        let mut cycle = 0;
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    tracing::info!("shutdown requested, stopping polling");
                    break;
                }
                _ = ticker.tick() => {}
            }

            cycle += 1;
            self.run_cycle(cycle)
                .instrument(tracing::info_span!("cycle", cycle))
                .await;

            if max_cycles.is_some_and(|max| cycle >= max) {
                break;
            }
        }

        cycle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RawObservation;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::{
        collections::HashMap,
        sync::{Arc, Mutex},
    };

    #[derive(Debug, Default)]
    struct FakeProvider {
        bodies: HashMap<String, Value>,
    }

    impl FakeProvider {
        fn with(mut self, city: &str, body: Value) -> Self {
            self.bodies.insert(city.to_string(), body);
            self
        }
    }

    #[async_trait]
    impl WeatherProvider for FakeProvider {
        async fn current(&self, city: &str) -> Result<RawObservation> {
            let body = self
                .bodies
                .get(city)
                .ok_or_else(|| anyhow!("city not found: {city}"))?;
            Ok(RawObservation::from_value(body.clone())?)
        }
    }

    #[derive(Debug, Default, Clone)]
    struct RecordingSink {
        records: Arc<Mutex<Vec<CanonicalRecord>>>,
        flushes: Arc<Mutex<usize>>,
        reject: Option<String>,
    }

    #[async_trait]
    impl RecordSink for RecordingSink {
        async fn send(&self, record: &CanonicalRecord) -> Result<()> {
            if self.reject.as_deref() == Some(record.city_name.as_str()) {
                return Err(anyhow!("rejected {}", record.city_name));
            }
            self.records.lock().unwrap().push(record.clone());
            Ok(())
        }

        async fn flush(&self) -> Result<()> {
            *self.flushes.lock().unwrap() += 1;
            Ok(())
        }
    }

    fn body(city: &str, temp: f64) -> Value {
        json!({
            "coord": {"lon": 13.4105, "lat": 52.5244},
            "weather": [{"main": "Rain", "description": "light rain", "icon": "10d"}],
            "main": {
                "temp": temp, "feels_like": temp, "temp_min": temp, "temp_max": temp,
                "pressure": 1009, "humidity": 81
            },
            "visibility": 9000,
            "clouds": {"all": 100},
            "rain": {"1h": 0.21},
            "dt": 1719835200,
            "sys": {"country": "DE", "sunrise": 1719803000, "sunset": 1719863000},
            "id": 2950159,
            "name": city
        })
    }

    fn cities(names: &[&str]) -> Vec<String> {
        names.iter().map(|c| c.to_string()).collect()
    }

    #[tokio::test]
    async fn cycle_delivers_every_city() {
        let provider = FakeProvider::default()
            .with("Berlin", body("Berlin", 12.0))
            .with("Krakow", body("Krakow", 31.0));
        let sink = RecordingSink::default();
        let pipeline = Pipeline::new(
            Box::new(provider),
            Box::new(sink.clone()),
            cities(&["Berlin", "Krakow"]),
        );

        let report = pipeline.run_cycle(1).await;
        assert_eq!(report, CycleReport { cycle: 1, succeeded: 2, failed: 0 });

        let records = sink.records.lock().unwrap();
        assert_eq!(records[0].city_name, "Berlin");
        assert_eq!(records[0].rain_1h, 0.21);
        assert_eq!(records[1].heat_index, Some(46.5));
        assert_eq!(*sink.flushes.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn failures_are_skipped_not_fatal() {
        let mut broken = body("Paris", 20.0);
        broken["main"].as_object_mut().unwrap().remove("temp");

        let provider = FakeProvider::default()
            .with("Paris", broken)
            .with("Vienna", body("Vienna", 18.0))
            .with("Amsterdam", body("Amsterdam", 15.0));
        let sink = RecordingSink {
            reject: Some("Amsterdam".to_string()),
            ..RecordingSink::default()
        };
        let pipeline = Pipeline::new(
            Box::new(provider),
            Box::new(sink.clone()),
            cities(&["Paris", "Unknown", "Vienna", "Amsterdam"]),
        );

        let report = pipeline.run_cycle(7).await;
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 3);
        assert_eq!(report.total(), 4);

        let records = sink.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].city_name, "Vienna");
    }

    #[tokio::test]
    async fn malformed_observation_is_visible_to_caller() {
        let mut broken = body("Paris", 20.0);
        broken["weather"] = json!([]);

        let pipeline = Pipeline::new(
            Box::new(FakeProvider::default().with("Paris", broken)),
            Box::new(RecordingSink::default()),
            cities(&["Paris"]),
        );

        let err = pipeline.process_city("Paris").await.unwrap_err();
        assert!(err.downcast_ref::<NormalizeError>().is_some());
    }

    #[tokio::test]
    async fn run_stops_after_max_cycles() {
        let sink = RecordingSink::default();
        let pipeline = Pipeline::new(
            Box::new(FakeProvider::default().with("Berlin", body("Berlin", 5.0))),
            Box::new(sink.clone()),
            cities(&["Berlin"]),
        );

        let ran = pipeline
            .run(Duration::from_millis(1), Some(3), std::future::pending())
            .await;

        assert_eq!(ran, 3);
        assert_eq!(sink.records.lock().unwrap().len(), 3);
        assert_eq!(*sink.flushes.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn run_survives_zero_interval() {
        let sink = RecordingSink::default();
        let pipeline = Pipeline::new(
            Box::new(FakeProvider::default().with("Berlin", body("Berlin", 5.0))),
            Box::new(sink.clone()),
            cities(&["Berlin"]),
        );

        let ran = pipeline
            .run(Duration::ZERO, Some(1), std::future::pending())
            .await;

        assert_eq!(ran, 1);
        assert_eq!(sink.records.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn run_honours_shutdown() {
        let sink = RecordingSink::default();
        let pipeline = Pipeline::new(
            Box::new(FakeProvider::default()),
            Box::new(sink.clone()),
            cities(&["Berlin"]),
        );

        let ran = pipeline
            .run(Duration::from_secs(60), None, std::future::ready(()))
            .await;

        assert_eq!(ran, 0);
        assert_eq!(*sink.flushes.lock().unwrap(), 0);
    }
}
