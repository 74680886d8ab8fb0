//! Delivery targets for canonical records.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::{
    fmt::Debug,
    io::{self, Write},
    sync::Mutex,
};

use crate::{CanonicalRecord, Config, SinkKind, http};

#[async_trait]
pub trait RecordSink: Send + Sync + Debug {
    async fn send(&self, record: &CanonicalRecord) -> Result<()>;

    /// Push out anything buffered. Called once at the end of every cycle.
    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Construct the sink selected by `kind`.
pub fn sink_from_config(kind: SinkKind, config: &Config) -> Result<Box<dyn RecordSink>> {
    let boxed: Box<dyn RecordSink> = match kind {
        SinkKind::Stdout => Box::new(JsonLinesSink::stdout()),
        SinkKind::Elasticsearch => {
            let client = http::build_client(config.request_timeout())?;
            Box::new(ElasticsearchSink::new(
                client,
                &config.elasticsearch.url,
                &config.elasticsearch.index,
            ))
        }
    };

    Ok(boxed)
}

/// Newline-delimited JSON, one record per line.
///
/// When keyed, each line is prefixed with the city name and a tab so it can be
/// fed to a console producer that splits keys on a separator.
#[derive(Debug)]
pub struct JsonLinesSink<W> {
    out: Mutex<W>,
    keyed: bool,
}

impl JsonLinesSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
            keyed: false,
        }
    }

    pub fn keyed(mut self, keyed: bool) -> Self {
        self.keyed = keyed;
        self
    }

    pub fn into_inner(self) -> Result<W> {
        self.out
            .into_inner()
            .map_err(|_| anyhow!("JSON lines writer lock was poisoned"))
    }

    fn write_line(&self, record: &CanonicalRecord) -> Result<()> {
        let json = serde_json::to_string(record).context("Failed to serialize record")?;
        let mut out = self
            .out
            .lock()
            .map_err(|_| anyhow!("JSON lines writer lock was poisoned"))?;

        if self.keyed {
            write!(out, "{}\t", record.city_name).context("Failed to write record key")?;
        }
        writeln!(out, "{json}").context("Failed to write record")?;
        Ok(())
    }
}

#[async_trait]
impl<W: Write + Send + Debug> RecordSink for JsonLinesSink<W> {
    async fn send(&self, record: &CanonicalRecord) -> Result<()> {
        self.write_line(record)
    }

    async fn flush(&self) -> Result<()> {
        self.out
            .lock()
            .map_err(|_| anyhow!("JSON lines writer lock was poisoned"))?
            .flush()
            .context("Failed to flush record output")
    }
}

/// Indexes each record as a new document via the search engine's HTTP API.
#[derive(Debug, Clone)]
pub struct ElasticsearchSink {
    http: Client,
    doc_url: String,
}

impl ElasticsearchSink {
    pub fn new(http: Client, base_url: &str, index: &str) -> Self {
        Self {
            http,
            doc_url: http::join_url(base_url, &format!("{index}/_doc")),
        }
    }

    pub fn doc_url(&self) -> &str {
        &self.doc_url
    }
}

#[async_trait]
impl RecordSink for ElasticsearchSink {
    async fn send(&self, record: &CanonicalRecord) -> Result<()> {
        let res = self
            .http
            .post(&self.doc_url)
            .json(record)
            .send()
            .await
            .with_context(|| format!("Failed to send document to {}", self.doc_url))?;

        let status = res.status();
        if status == StatusCode::OK || status == StatusCode::CREATED {
            return Ok(());
        }

        let body = res.text().await.unwrap_or_default();
        Err(anyhow!(
            "Elasticsearch rejected document for {} with status {}: {}",
            record.city_name,
            status,
            http::truncate_body(&body),
        ))
    }
}
