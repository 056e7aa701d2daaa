use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;

use super::{MetricSource, SourceError};
use crate::config::SourceConfig;

/// Instant-query client for the Prometheus HTTP API.
pub struct PrometheusSource {
    client: Client,
    endpoint: String,
    query: String,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryData {
    #[serde(rename = "resultType")]
    result_type: String,
    result: Value,
}

impl PrometheusSource {
    pub fn new(config: &SourceConfig) -> Result<Self, SourceError> {
        let client = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/api/v1/query", config.url.trim_end_matches('/')),
            query: config.query.clone(),
        })
    }
}

/// Prometheus encodes sample values as strings: `[<unix ts>, "<value>"]`.
fn sample_value(pair: &Value) -> Result<f64, SourceError> {
    let raw = pair
        .get(1)
        .and_then(Value::as_str)
        .ok_or_else(|| SourceError::Malformed(format!("unexpected sample {}", pair)))?;
    let value: f64 = raw
        .parse()
        .map_err(|_| SourceError::Malformed(format!("unparsable value {:?}", raw)))?;
    if !value.is_finite() {
        return Err(SourceError::NonFinite(value));
    }
    Ok(value)
}

fn extract(body: QueryResponse) -> Result<f64, SourceError> {
    if body.status != "success" {
        return Err(SourceError::Malformed(
            body.error.unwrap_or_else(|| format!("status {}", body.status)),
        ));
    }
    let data = body
        .data
        .ok_or_else(|| SourceError::Malformed("missing data".to_string()))?;

    match data.result_type.as_str() {
        "vector" => {
            let first = data
                .result
                .as_array()
                .and_then(|r| r.first())
                .ok_or(SourceError::Empty)?;
            let pair = first
                .get("value")
                .ok_or_else(|| SourceError::Malformed("sample without value".to_string()))?;
            sample_value(pair)
        }
        "scalar" => sample_value(&data.result),
        other => Err(SourceError::Malformed(format!("unsupported result type {}", other))),
    }
}

#[async_trait::async_trait]
impl MetricSource for PrometheusSource {
    async fn pull(&self) -> Result<f64, SourceError> {
        let resp = self
            .client
            .get(&self.endpoint)
            .query(&[("query", self.query.as_str())])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() && status.as_u16() != 400 && status.as_u16() != 422 {
            // 400/422 carry a JSON error body worth surfacing.
            let message = resp.text().await.unwrap_or_default();
            return Err(SourceError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let body: QueryResponse = resp.json().await?;
        extract(body)
    }
}
