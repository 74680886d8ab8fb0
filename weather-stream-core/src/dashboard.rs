//! Saved-object scaffolding for a per-city weather dashboard.

use anyhow::{Context, Result, anyhow};
use reqwest::{Client, StatusCode};
use serde_json::{Value, json};

use crate::{Config, http};

/// Field the index pattern uses as its time axis.
pub const TIME_FIELD: &str = "created_at";

/// A record field rendered as a "latest value" metric tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricField {
    pub field: &'static str,
    pub label: &'static str,
    pub id_prefix: &'static str,
    pub range_max: u32,
}

pub const TEMPERATURE: MetricField = MetricField {
    field: "temp",
    label: "Temperature",
    id_prefix: "temp",
    range_max: 50,
};

pub const HUMIDITY: MetricField = MetricField {
    field: "humidity",
    label: "Humidity",
    id_prefix: "humidity",
    range_max: 100,
};

pub const CITY_METRICS: [MetricField; 2] = [TEMPERATURE, HUMIDITY];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Created,
    AlreadyExists,
}

pub fn index_pattern_payload(title: &str) -> Value {
    json!({
        "attributes": {
            "title": title,
            "timeFieldName": TIME_FIELD,
        }
    })
}

pub fn visualization_id(metric: &MetricField, city: &str) -> String {
    format!("{}-{}", metric.id_prefix, city_slug(city))
}

/// Metric visualization showing the most recent `metric.field` for `city`.
pub fn metric_visualization_payload(metric: &MetricField, city: &str, pattern_id: &str) -> Value {
    let title = format!("{} - {}", metric.label, city);

    let vis_state = json!({
        "title": title,
        "type": "metric",
        "params": {
            "metric": {
                "percentageMode": false,
                "useRanges": false,
                "colorSchema": "Green to Red",
                "metricColorMode": "None",
                "colorsRange": [{"from": 0, "to": metric.range_max}],
                "labels": {"show": true},
                "invertColors": false,
                "style": {
                    "bgFill": "#000",
                    "bgColor": false,
                    "labelColor": false,
                    "subText": "",
                    "fontSize": 60
                }
            }
        },
        "aggs": [{
            "id": "1",
            "enabled": true,
            "type": "top_hits",
            "schema": "metric",
            "params": {
                "field": metric.field,
                "aggregate": "concat",
                "size": 1,
                "sortField": "timestamp",
                "sortOrder": "desc"
            }
        }]
    });

    saved_visualization(&title, &vis_state, city, pattern_id)
}

pub fn temperature_trend_id(city: &str) -> String {
    format!("temp-line-{}", city_slug(city))
}

/// Line chart of average temperature per `timestamp` term for `city`,
/// first 20 terms in ascending order.
pub fn temperature_trend_payload(city: &str, pattern_id: &str) -> Value {
    let title = format!("Temperature Trend - {city}");

    let vis_state = json!({
        "title": title,
        "type": "line",
        "params": {
            "grid": {"categoryLines": false, "style": {"color": "#eee"}},
            "categoryAxes": [{
                "id": "CategoryAxis-1",
                "type": "category",
                "position": "bottom",
                "show": true,
                "style": {},
                "scale": {"type": "linear"},
                "labels": {"show": true, "truncate": 100},
                "title": {}
            }],
            "valueAxes": [{
                "id": "ValueAxis-1",
                "name": "LeftAxis-1",
                "type": "value",
                "position": "left",
                "show": true,
                "style": {},
                "scale": {"type": "linear", "mode": "normal"},
                "labels": {"show": true, "rotate": 0, "filter": false, "truncate": 100},
                "title": {"text": "Temperature"}
            }],
            "seriesParams": [{
                "show": "true",
                "type": "line",
                "mode": "normal",
                "data": {"label": "Average temp", "id": "1"},
                "valueAxis": "ValueAxis-1",
                "drawLinesBetweenPoints": true,
                "showCircles": true
            }],
            "addTooltip": true,
            "addLegend": true,
            "legendPosition": "right",
            "times": [],
            "addTimeMarker": false
        },
        "aggs": [
            {
                "id": "1",
                "enabled": true,
                "type": "avg",
                "schema": "metric",
                "params": {"field": TEMPERATURE.field}
            },
            {
                "id": "2",
                "enabled": true,
                "type": "terms",
                "schema": "segment",
                "params": {
                    "field": "timestamp",
                    "size": 20,
                    "order": "asc",
                    "orderBy": "_key"
                }
            }
        ]
    });

    saved_visualization(&title, &vis_state, city, pattern_id)
}

fn city_slug(city: &str) -> String {
    city.to_lowercase().replace(' ', "-")
}

/// Wrap a visualization state in a saved object filtered to one city.
/// `visState` and `searchSourceJSON` are JSON documents embedded as strings.
fn saved_visualization(title: &str, vis_state: &Value, city: &str, pattern_id: &str) -> Value {
    let search_source = json!({
        "index": pattern_id,
        "filter": [{
            "meta": {
                "alias": null,
                "disabled": false,
                "key": "city_name.keyword",
                "negate": false,
                "params": {"query": city},
                "type": "phrase"
            },
            "query": {"match_phrase": {"city_name.keyword": city}}
        }],
        "query": {"query": "", "language": "kuery"}
    });

    json!({
        "attributes": {
            "title": title,
            "visState": vis_state.to_string(),
            "uiStateJSON": "{}",
            "description": "",
            "version": 1,
            "kibanaSavedObjectMeta": {
                "searchSourceJSON": search_source.to_string()
            }
        }
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScaffoldReport {
    pub created: Vec<String>,
    pub existing: Vec<String>,
    pub failed: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct DashboardBuilder {
    http: Client,
    kibana_url: String,
    index_pattern: String,
    pattern_id: String,
}

impl DashboardBuilder {
    pub fn new(http: Client, config: &Config) -> Self {
        Self {
            http,
            kibana_url: config.kibana.url.clone(),
            index_pattern: config.kibana.index_pattern.clone(),
            pattern_id: config.kibana.pattern_id.clone(),
        }
    }

    pub fn saved_object_url(&self, kind: &str, id: &str) -> String {
        http::join_url(&self.kibana_url, &format!("api/saved_objects/{kind}/{id}"))
    }

    async fn create_saved_object(&self, kind: &str, id: &str, payload: &Value) -> Result<SaveOutcome> {
        let url = self.saved_object_url(kind, id);
        let res = self
            .http
            .post(&url)
            .header("kbn-xsrf", "true")
            .json(payload)
            .send()
            .await
            .with_context(|| format!("Failed to send saved object {kind}/{id}"))?;

        match res.status() {
            StatusCode::OK | StatusCode::CREATED => Ok(SaveOutcome::Created),
            StatusCode::CONFLICT => Ok(SaveOutcome::AlreadyExists),
            status => {
                let body = res.text().await.unwrap_or_default();
                Err(anyhow!(
                    "Kibana rejected {}/{} with status {}: {}",
                    kind,
                    id,
                    status,
                    http::truncate_body(&body),
                ))
            }
        }
    }

    pub async fn create_index_pattern(&self) -> Result<SaveOutcome> {
        let outcome = self
            .create_saved_object(
                "index-pattern",
                &self.pattern_id,
                &index_pattern_payload(&self.index_pattern),
            )
            .await?;

        tracing::info!(
            message = "index pattern ready",
            pattern = %self.index_pattern,
            outcome = ?outcome,
        );
        Ok(outcome)
    }

    /// Create the metric tiles and trend chart for every city. A failed tile is recorded and
    /// the rest are still attempted.
    pub async fn create_city_metrics(&self, cities: &[String]) -> ScaffoldReport {
        let mut report = ScaffoldReport::default();

        for city in cities {
            let mut visualizations: Vec<(String, Value)> = CITY_METRICS
                .iter()
                .map(|metric| {
                    (
                        visualization_id(metric, city),
                        metric_visualization_payload(metric, city, &self.pattern_id),
                    )
                })
                .collect();
            visualizations.push((
                temperature_trend_id(city),
                temperature_trend_payload(city, &self.pattern_id),
            ));

            for (id, payload) in visualizations {
                match self.create_saved_object("visualization", &id, &payload).await {
                    Ok(SaveOutcome::Created) => report.created.push(id),
                    Ok(SaveOutcome::AlreadyExists) => report.existing.push(id),
                    Err(e) => {
                        tracing::error!(
                            message = "failed to create visualization",
                            id = %id,
                            error = %format!("{e:#}"),
                        );
                        report.failed.push((id, format!("{e:#}")));
                    }
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_pattern_uses_capture_time() {
        let payload = index_pattern_payload("openweather*");
        assert_eq!(payload["attributes"]["title"], "openweather*");
        assert_eq!(payload["attributes"]["timeFieldName"], "created_at");
    }

    #[test]
    fn visualization_ids_are_slugged() {
        assert_eq!(visualization_id(&TEMPERATURE, "London"), "temp-london");
        assert_eq!(visualization_id(&HUMIDITY, "New York"), "humidity-new-york");
    }

    #[test]
    fn metric_payload_embeds_state_as_strings() {
        let payload = metric_visualization_payload(&HUMIDITY, "Krakow", "openweather-pattern");
        let attrs = &payload["attributes"];
        assert_eq!(attrs["title"], "Humidity - Krakow");

        let vis_state: Value = serde_json::from_str(attrs["visState"].as_str().unwrap()).unwrap();
        assert_eq!(vis_state["aggs"][0]["params"]["field"], "humidity");
        assert_eq!(vis_state["aggs"][0]["params"]["sortField"], "timestamp");
        assert_eq!(vis_state["params"]["metric"]["colorsRange"][0]["to"], 100);

        let source: Value = serde_json::from_str(
            attrs["kibanaSavedObjectMeta"]["searchSourceJSON"].as_str().unwrap(),
        )
        .unwrap();
        assert_eq!(source["index"], "openweather-pattern");
        assert_eq!(source["filter"][0]["query"]["match_phrase"]["city_name.keyword"], "Krakow");
    }

    #[test]
    fn temperature_trend_segments_by_timestamp() {
        assert_eq!(temperature_trend_id("Amsterdam"), "temp-line-amsterdam");

        let payload = temperature_trend_payload("Amsterdam", "openweather-pattern");
        let attrs = &payload["attributes"];
        assert_eq!(attrs["title"], "Temperature Trend - Amsterdam");

        let vis_state: Value = serde_json::from_str(attrs["visState"].as_str().unwrap()).unwrap();
        assert_eq!(vis_state["type"], "line");
        assert_eq!(vis_state["aggs"][0]["type"], "avg");
        assert_eq!(vis_state["aggs"][0]["params"]["field"], "temp");

        let segment = &vis_state["aggs"][1];
        assert_eq!(segment["type"], "terms");
        assert_eq!(segment["schema"], "segment");
        assert_eq!(segment["params"]["field"], "timestamp");
        assert_eq!(segment["params"]["size"], 20);
        assert_eq!(segment["params"]["order"], "asc");
        assert_eq!(segment["params"]["orderBy"], "_key");

        let source: Value = serde_json::from_str(
            attrs["kibanaSavedObjectMeta"]["searchSourceJSON"].as_str().unwrap(),
        )
        .unwrap();
        assert_eq!(source["filter"][0]["query"]["match_phrase"]["city_name.keyword"], "Amsterdam");
    }

    #[test]
    fn saved_object_url_layout() {
        let builder = DashboardBuilder::new(Client::new(), &Config::default());
        assert_eq!(
            builder.saved_object_url("index-pattern", "openweather-pattern"),
            "http://localhost:5601/api/saved_objects/index-pattern/openweather-pattern"
        );
    }
}
