//! Reachability and health probes for the provider and the downstream stack.

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use reqwest::{Client, RequestBuilder};
use serde_json::{Value, json};
use std::fmt;

use crate::{Config, http, provider::WeatherProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Health {
    Healthy,
    Degraded,
    Unhealthy,
}

impl Health {
    pub fn as_str(&self) -> &'static str {
        match self {
            Health::Healthy => "healthy",
            Health::Degraded => "degraded",
            Health::Unhealthy => "unhealthy",
        }
    }
}

impl fmt::Display for Health {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceStatus {
    pub name: String,
    pub health: Health,
    pub detail: String,
}

impl ServiceStatus {
    fn new(name: &str, health: Health, detail: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            health,
            detail: detail.into(),
        }
    }

    fn unreachable(name: &str, err: &anyhow::Error) -> Self {
        Self::new(name, Health::Unhealthy, format!("{err:#}"))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthReport {
    pub services: Vec<ServiceStatus>,
}

impl HealthReport {
    /// Degraded services still count as up.
    pub fn up_count(&self) -> usize {
        self.services
            .iter()
            .filter(|s| s.health != Health::Unhealthy)
            .count()
    }

    pub fn all_up(&self) -> bool {
        self.up_count() == self.services.len()
    }
}

/// Map a `_cluster/health` body to a health level.
pub fn classify_cluster_health(body: &Value) -> (Health, String) {
    match body.get("status").and_then(Value::as_str) {
        Some("green") => (Health::Healthy, "cluster status green".to_string()),
        Some("yellow") => (Health::Degraded, "cluster status yellow".to_string()),
        Some(other) => (Health::Unhealthy, format!("cluster status {other}")),
        None => (Health::Unhealthy, "cluster status missing".to_string()),
    }
}

/// Map an `/api/status` body to a health level. Older releases report
/// `overall.state`, newer ones `overall.level`.
pub fn classify_kibana_status(body: &Value) -> (Health, String) {
    let overall = body.pointer("/status/overall");
    let state = overall
        .and_then(|o| o.get("level").or_else(|| o.get("state")))
        .and_then(Value::as_str);

    match state {
        Some(s @ ("green" | "available")) => (Health::Healthy, format!("overall {s}")),
        Some(s) => (Health::Degraded, format!("overall {s}")),
        None => (Health::Degraded, "overall status missing".to_string()),
    }
}

pub fn parse_document_count(body: &Value) -> Option<u64> {
    body.get("count").and_then(Value::as_u64)
}

/// Records older than this mean data has stopped flowing.
pub const MAX_RECORD_AGE_SECS: i64 = 300;

/// Newest indexed record, as far as the freshness check cares.
#[derive(Debug, Clone, PartialEq)]
pub struct LatestRecord {
    pub city_name: String,
    pub temp: Option<f64>,
    pub created_at: Option<String>,
    pub timestamp: i64,
}

/// Search body selecting the single newest record by provider timestamp.
pub fn latest_record_query() -> Value {
    json!({
        "size": 1,
        "sort": [{"timestamp": {"order": "desc"}}]
    })
}

/// Pull the first hit out of a `_search` response.
pub fn parse_latest_record(body: &Value) -> Option<LatestRecord> {
    let source = body.pointer("/hits/hits/0/_source")?;

    Some(LatestRecord {
        city_name: source
            .get("city_name")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string(),
        temp: source.get("temp").and_then(Value::as_f64),
        created_at: source
            .get("created_at")
            .and_then(Value::as_str)
            .map(String::from),
        timestamp: source.get("timestamp").and_then(Value::as_i64)?,
    })
}

/// Healthy when the newest record is at most `MAX_RECORD_AGE_SECS` old at `now`.
pub fn classify_freshness(latest: Option<&LatestRecord>, now: i64) -> (Health, String) {
    let Some(latest) = latest else {
        return (Health::Degraded, "no weather records indexed".to_string());
    };

    let temp = latest
        .temp
        .map(|t| format!("{t:.1}°C"))
        .unwrap_or_else(|| "no temperature".to_string());
    let at = latest
        .created_at
        .clone()
        .unwrap_or_else(|| latest.timestamp.to_string());
    let summary = format!("latest {} {} at {}", latest.city_name, temp, at);

    let age = now - latest.timestamp;
    if age > MAX_RECORD_AGE_SECS {
        (Health::Degraded, format!("{summary}, {age}s old"))
    } else {
        (Health::Healthy, summary)
    }
}

#[derive(Debug, Clone)]
pub struct HealthChecker {
    http: Client,
    elasticsearch_url: String,
    index: String,
    kibana_url: String,
}

impl HealthChecker {
    pub fn new(http: Client, config: &Config) -> Self {
        Self {
            http,
            elasticsearch_url: config.elasticsearch.url.clone(),
            index: config.elasticsearch.index.clone(),
            kibana_url: config.kibana.url.clone(),
        }
    }

    async fn get_json(&self, url: &str) -> Result<Value> {
        self.send_json(self.http.get(url), url).await
    }

    async fn send_json(&self, request: RequestBuilder, url: &str) -> Result<Value> {
        let res = request
            .send()
            .await
            .with_context(|| format!("Connection to {url} failed"))?;

        let status = res.status();
        let body = res
            .text()
            .await
            .with_context(|| format!("Failed to read response from {url}"))?;

        if !status.is_success() {
            return Err(anyhow!("HTTP {} from {}: {}", status, url, http::truncate_body(&body)));
        }

        serde_json::from_str(&body).with_context(|| format!("Invalid JSON from {url}"))
    }

    pub async fn check_elasticsearch(&self) -> ServiceStatus {
        const NAME: &str = "elasticsearch";

        let health_url = http::join_url(&self.elasticsearch_url, "_cluster/health");
        let (health, mut detail) = match self.get_json(&health_url).await {
            Ok(body) => classify_cluster_health(&body),
            Err(e) => return ServiceStatus::unreachable(NAME, &e),
        };

        let count_url = http::join_url(&self.elasticsearch_url, &format!("{}/_count", self.index));
        match self.get_json(&count_url).await {
            Ok(body) => {
                if let Some(count) = parse_document_count(&body) {
                    detail.push_str(&format!(", {count} documents in {}", self.index));
                }
            }
            Err(e) => {
                tracing::debug!(message = "document count unavailable", index = %self.index, error = %e);
                detail.push_str(&format!(", index {} not found", self.index));
            }
        }

        ServiceStatus::new(NAME, health, detail)
    }

    /// Check that records are still arriving in the index.
    pub async fn check_data_flow(&self) -> ServiceStatus {
        const NAME: &str = "data flow";

        let url = http::join_url(&self.elasticsearch_url, &format!("{}/_search", self.index));
        let request = self.http.post(&url).json(&latest_record_query());
        match self.send_json(request, &url).await {
            Ok(body) => {
                let latest = parse_latest_record(&body);
                let (health, detail) = classify_freshness(latest.as_ref(), Utc::now().timestamp());
                ServiceStatus::new(NAME, health, detail)
            }
            Err(e) => ServiceStatus::unreachable(NAME, &e),
        }
    }

    pub async fn check_kibana(&self) -> ServiceStatus {
        const NAME: &str = "kibana";

        let url = http::join_url(&self.kibana_url, "api/status");
        match self.get_json(&url).await {
            Ok(body) => {
                let (health, detail) = classify_kibana_status(&body);
                ServiceStatus::new(NAME, health, detail)
            }
            Err(e) => ServiceStatus::unreachable(NAME, &e),
        }
    }

    pub async fn check_provider(&self, provider: &dyn WeatherProvider, city: &str) -> ServiceStatus {
        const NAME: &str = "openweather";

        match provider.current(city).await {
            Ok(raw) => ServiceStatus::new(
                NAME,
                Health::Healthy,
                format!("{} reports {:.1}°C", city, raw.main.temp),
            ),
            Err(e) => ServiceStatus::unreachable(NAME, &e),
        }
    }

    /// Probe every service. The provider is skipped when none is configured.
    pub async fn run_all(&self, provider: Option<(&dyn WeatherProvider, &str)>) -> HealthReport {
        let mut services = Vec::new();

        if let Some((provider, city)) = provider {
            services.push(self.check_provider(provider, city).await);
        }
        services.push(self.check_elasticsearch().await);
        services.push(self.check_data_flow().await);
        services.push(self.check_kibana().await);

        for status in &services {
            tracing::debug!(
                message = "health check finished",
                service = %status.name,
                health = %status.health,
            );
        }

        HealthReport { services }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RawObservation;
    use async_trait::async_trait;

    #[test]
    fn cluster_colours_map_to_health() {
        assert_eq!(classify_cluster_health(&json!({"status": "green"})).0, Health::Healthy);
        assert_eq!(classify_cluster_health(&json!({"status": "yellow"})).0, Health::Degraded);
        assert_eq!(classify_cluster_health(&json!({"status": "red"})).0, Health::Unhealthy);
        assert_eq!(classify_cluster_health(&json!({})).0, Health::Unhealthy);
    }

    #[test]
    fn kibana_state_and_level_are_both_understood() {
        let legacy = json!({"status": {"overall": {"state": "green"}}});
        let current = json!({"status": {"overall": {"level": "available"}}});
        let degraded = json!({"status": {"overall": {"level": "degraded"}}});

        assert_eq!(classify_kibana_status(&legacy).0, Health::Healthy);
        assert_eq!(classify_kibana_status(&current).0, Health::Healthy);

        let (health, detail) = classify_kibana_status(&degraded);
        assert_eq!(health, Health::Degraded);
        assert_eq!(detail, "overall degraded");
    }

    #[test]
    fn document_count_is_read() {
        assert_eq!(parse_document_count(&json!({"count": 42, "_shards": {}})), Some(42));
        assert_eq!(parse_document_count(&json!({"error": "no such index"})), None);
    }

    #[test]
    fn latest_record_query_sorts_newest_first() {
        let query = latest_record_query();
        assert_eq!(query["size"], 1);
        assert_eq!(query["sort"][0]["timestamp"]["order"], "desc");
    }

    #[test]
    fn latest_record_is_read_from_first_hit() {
        let body = json!({
            "hits": {"total": {"value": 12}, "hits": [{
                "_index": "openweather",
                "_source": {
                    "city_name": "Vienna",
                    "temp": 21.4,
                    "created_at": "2024-07-01 14:05:09",
                    "timestamp": 1719835200
                }
            }]}
        });

        let latest = parse_latest_record(&body).unwrap();
        assert_eq!(latest.city_name, "Vienna");
        assert_eq!(latest.temp, Some(21.4));
        assert_eq!(latest.created_at.as_deref(), Some("2024-07-01 14:05:09"));
        assert_eq!(latest.timestamp, 1719835200);

        assert_eq!(parse_latest_record(&json!({"hits": {"hits": []}})), None);
    }

    #[test]
    fn freshness_depends_on_record_age() {
        let latest = LatestRecord {
            city_name: "Vienna".to_string(),
            temp: Some(21.4),
            created_at: Some("2024-07-01 14:05:09".to_string()),
            timestamp: 1_000_000,
        };

        let (health, detail) = classify_freshness(Some(&latest), 1_000_000 + MAX_RECORD_AGE_SECS);
        assert_eq!(health, Health::Healthy);
        assert_eq!(detail, "latest Vienna 21.4°C at 2024-07-01 14:05:09");

        let (health, detail) = classify_freshness(Some(&latest), 1_000_000 + 3600);
        assert_eq!(health, Health::Degraded);
        assert!(detail.ends_with("3600s old"));

        let (health, detail) = classify_freshness(None, 1_000_000);
        assert_eq!(health, Health::Degraded);
        assert_eq!(detail, "no weather records indexed");
    }

    #[test]
    fn report_counts_degraded_as_up() {
        let report = HealthReport {
            services: vec![
                ServiceStatus::new("a", Health::Healthy, ""),
                ServiceStatus::new("b", Health::Degraded, ""),
                ServiceStatus::new("c", Health::Unhealthy, ""),
            ],
        };

        assert_eq!(report.up_count(), 2);
        assert!(!report.all_up());
    }

    #[derive(Debug)]
    struct DownProvider;

    #[async_trait]
    impl WeatherProvider for DownProvider {
        async fn current(&self, _city: &str) -> Result<RawObservation> {
            Err(anyhow!("401 Unauthorized"))
        }
    }

    #[tokio::test]
    async fn provider_failure_is_unhealthy() {
        let checker = HealthChecker::new(Client::new(), &Config::default());
        let status = checker.check_provider(&DownProvider, "London").await;

        assert_eq!(status.name, "openweather");
        assert_eq!(status.health, Health::Unhealthy);
        assert!(status.detail.contains("401"));
    }
}
