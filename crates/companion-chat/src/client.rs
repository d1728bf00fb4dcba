//! HTTP client for the generation backend.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use companion_core::config::BackendConfig;

use crate::error::GenerationError;
use crate::generation::{GenerationReply, GenerationRequest, GenerationService};
use crate::health::HealthProbe;

/// Posts turns to the chat endpoint, gated on the cached health probe.
pub struct HttpGenerationClient {
    client: reqwest::Client,
    chat_url: String,
    timeout: Duration,
    probe: Arc<HealthProbe>,
}

impl std::fmt::Debug for HttpGenerationClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpGenerationClient")
            .field("chat_url", &self.chat_url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl HttpGenerationClient {
    pub fn new(chat_url: impl Into<String>, timeout: Duration, probe: Arc<HealthProbe>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            chat_url: chat_url.into(),
            timeout,
            probe,
        }
    }

    pub fn from_config(config: &BackendConfig, probe: Arc<HealthProbe>) -> Self {
        Self::new(config.chat_url(), config.request_timeout(), probe)
    }

    pub fn probe(&self) -> &Arc<HealthProbe> {
        &self.probe
    }

    fn classify(&self, err: reqwest::Error) -> GenerationError {
        if err.is_timeout() {
            GenerationError::Timeout(self.timeout)
        } else {
            GenerationError::from(err)
        }
    }
}

#[async_trait]
impl GenerationService for HttpGenerationClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationReply, GenerationError> {
        if !self.probe.is_available().await {
            return Err(GenerationError::Unavailable);
        }

        let response = match self.client.post(&self.chat_url).json(request).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(url = %self.chat_url, error = %e, "Generation request failed");
                if e.is_connect() {
                    self.probe.invalidate().await;
                }
                return Err(self.classify(e));
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body: String = response
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(500)
                .collect();
            warn!(url = %self.chat_url, status = status.as_u16(), "Generation backend returned an error");
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let reply: GenerationReply = response
            .json()
            .await
            .map_err(|e| GenerationError::Malformed(e.to_string()))?;
        debug!(chars = reply.response.chars().count(), "Generation reply received");
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{json, Value};

    async fn spawn_backend(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn client_for(base: &str) -> HttpGenerationClient {
        let config = BackendConfig {
            base_url: base.to_string(),
            request_timeout_secs: 5,
            ..BackendConfig::default()
        };
        let probe = Arc::new(HealthProbe::from_config(&config));
        HttpGenerationClient::from_config(&config, probe)
    }

    #[tokio::test]
    async fn test_posts_request_and_reads_reply() {
        let router = Router::new()
            .route("/", get(|| async { "ok" }))
            .route(
                "/api/chat",
                post(|Json(body): Json<Value>| async move {
                    let turns = body["history"].as_array().map(|h| h.len()).unwrap_or(0);
                    Json(json!({
                        "response": format!("{} after {} turns", body["message"].as_str().unwrap_or(""), turns)
                    }))
                }),
            );
        let base = spawn_backend(router).await;
        let client = client_for(&base);

        let history = vec![companion_core::Message::assistant("Welcome")];
        let reply = client
            .generate(&GenerationRequest::new("Hi", &history))
            .await
            .unwrap();
        assert_eq!(reply.response, "Hi after 1 turns");
    }

    #[tokio::test]
    async fn test_error_status_is_failure() {
        let router = Router::new()
            .route("/", get(|| async { "ok" }))
            .route(
                "/api/chat",
                post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "model crashed") }),
            );
        let base = spawn_backend(router).await;
        let err = client_for(&base)
            .generate(&GenerationRequest::new("Hi", std::iter::empty()))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            GenerationError::Status {
                status: 500,
                body: "model crashed".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_missing_response_field_is_malformed() {
        let router = Router::new()
            .route("/", get(|| async { "ok" }))
            .route(
                "/api/chat",
                post(|| async { Json(json!({ "answer": "wrong shape" })) }),
            );
        let base = spawn_backend(router).await;
        let err = client_for(&base)
            .generate(&GenerationRequest::new("Hi", std::iter::empty()))
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_offline_backend_is_not_contacted() {
        let router = Router::new().route(
            "/",
            get(|| async { StatusCode::SERVICE_UNAVAILABLE }),
        );
        let base = spawn_backend(router).await;
        let err = client_for(&base)
            .generate(&GenerationRequest::new("Hi", std::iter::empty()))
            .await
            .unwrap_err();
        assert_eq!(err, GenerationError::Unavailable);
    }
}
