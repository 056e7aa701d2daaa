use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::{DiagnosticOracle, OracleError};
use crate::config::{ConfigError, OracleConfig};

/// Client for an OpenAI-compatible `chat/completions` endpoint.
pub struct ChatCompletionOracle {
    client: Client,
    url: String,
    model: String,
    api_key: String,
    referer: Option<String>,
    metric_name: String,
    unit: String,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatCompletionOracle {
    pub fn new(config: &OracleConfig, metric_name: &str, unit: &str) -> Result<Self, ConfigError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or(ConfigError::MissingCredential("oracle.api_key"))?;
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ConfigError::Invalid {
                field: "oracle",
                reason: format!("cannot build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            url: config.url.clone(),
            model: config.model.clone(),
            api_key,
            referer: config.referer.clone(),
            metric_name: metric_name.to_string(),
            unit: unit.to_string(),
        })
    }

    fn prompt(&self, value: f64) -> String {
        format!(
            "Server {} is at {:.2}{}. This is an anomaly. Diagnose potential causes and recommend a fix. Keep it under 20 words.",
            self.metric_name, value, self.unit
        )
    }
}

#[async_trait::async_trait]
impl DiagnosticOracle for ChatCompletionOracle {
    async fn diagnose(&self, value: f64) -> Result<String, OracleError> {
        let payload = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": self.prompt(value)}],
        });

        let mut req = self.client.post(&self.url).bearer_auth(&self.api_key).json(&payload);
        if let Some(referer) = &self.referer {
            req = req.header("HTTP-Referer", referer);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(OracleError::Status {
                status: status.as_u16(),
            });
        }

        let body: CompletionResponse = resp.json().await?;
        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(OracleError::Empty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::Value;

    async fn fake_completions(reply: Value) -> String {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(move |headers: HeaderMap, Json(body): Json<Value>| {
                let reply = reply.clone();
                async move {
                    let authed = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        == Some("Bearer sk-test");
                    let prompt = body["messages"][0]["content"].as_str().unwrap_or_default();
                    if !authed || !prompt.contains("CPU load is at 72.40%") {
                        return (StatusCode::BAD_REQUEST, Json(json!({"error": "bad request"})));
                    }
                    (StatusCode::OK, Json(reply))
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/v1/chat/completions", addr)
    }

    fn oracle(url: String) -> ChatCompletionOracle {
        let config = OracleConfig {
            url,
            api_key: Some("sk-test".to_string()),
            ..OracleConfig::default()
        };
        ChatCompletionOracle::new(&config, "CPU load", "%").unwrap()
    }

    #[test]
    fn test_requires_api_key() {
        let err = ChatCompletionOracle::new(&OracleConfig::default(), "CPU load", "%")
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::MissingCredential("oracle.api_key")));
    }

    #[tokio::test]
    async fn test_returns_first_choice() {
        let url = fake_completions(json!({
            "choices": [{"message": {"role": "assistant", "content": "Runaway cron job; throttle it."}}]
        }))
        .await;
        let text = oracle(url).diagnose(72.4).await.unwrap();
        assert_eq!(text, "Runaway cron job; throttle it.");
    }

    #[tokio::test]
    async fn test_empty_choices_is_an_error() {
        let url = fake_completions(json!({"choices": []})).await;
        assert!(matches!(oracle(url).diagnose(72.4).await, Err(OracleError::Empty)));
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let url = fake_completions(json!({})).await;
        // Different value means the prompt check fails and the fake answers 400.
        assert!(matches!(
            oracle(url).diagnose(10.0).await,
            Err(OracleError::Status { status: 400 })
        ));
    }
}
