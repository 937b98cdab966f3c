//! Webhook-backed Sender implementation
//!
//! Bridges the dispatch engine to an HTTP delivery gateway: username lookups go
//! to `POST {base}/resolve`, deliveries to `POST {base}/send`. Connection-level
//! failures are reported as [`SenderError::Unavailable`] so the executor can
//! abort the sweep instead of burning through the whole target list against a
//! dead transport.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;

use crate::models::MessagePayload;

use super::{ResolvedTarget, Sender, SenderError, TargetAddress};

/// Sender that forwards deliveries to an HTTP gateway
pub struct WebhookSender {
    client: Client,
    base_url: String,
    timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
struct ResolveResponse {
    chat_id: i64,
}

impl WebhookSender {
    /// Create a sender against the given gateway base URL
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, SenderError> {
        let client = Client::builder()
            .timeout(timeout)
            .gzip(true)
            .build()
            .map_err(|e| SenderError::unavailable(format!("HTTP client init failed: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout_secs: timeout.as_secs(),
        })
    }

    fn classify(&self, err: reqwest::Error) -> SenderError {
        if err.is_timeout() {
            SenderError::Timeout {
                timeout_secs: self.timeout_secs,
            }
        } else if err.is_connect() {
            SenderError::unavailable(err.to_string())
        } else {
            SenderError::delivery(err.to_string())
        }
    }
}

#[async_trait]
impl Sender for WebhookSender {
    async fn resolve(&self, target: &TargetAddress) -> Result<ResolvedTarget, SenderError> {
        match target {
            TargetAddress::Chat(id) => Ok(ResolvedTarget { chat_id: *id }),
            TargetAddress::Username(name) => {
                let url = format!("{}/resolve", self.base_url);
                let response = self
                    .client
                    .post(&url)
                    .json(&json!({ "username": name }))
                    .send()
                    .await
                    .map_err(|e| self.classify(e))?;

                match response.status() {
                    StatusCode::NOT_FOUND => Err(SenderError::NotFound {
                        target: format!("@{name}"),
                    }),
                    status if !status.is_success() => Err(SenderError::resolution(
                        format!("@{name}"),
                        format!("gateway returned {status}"),
                    )),
                    _ => {
                        let body: ResolveResponse = response.json().await.map_err(|e| {
                            SenderError::resolution(format!("@{name}"), e.to_string())
                        })?;
                        Ok(ResolvedTarget {
                            chat_id: body.chat_id,
                        })
                    }
                }
            }
        }
    }

    async fn deliver(
        &self,
        target: &ResolvedTarget,
        payload: &MessagePayload,
    ) -> Result<(), SenderError> {
        let url = format!("{}/send", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&json!({ "chat_id": target.chat_id, "payload": payload }))
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(SenderError::NotFound {
                target: target.chat_id.to_string(),
            });
        }
        if !status.is_success() {
            return Err(SenderError::delivery(format!("gateway returned {status}")));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn text(body: &str) -> MessagePayload {
        MessagePayload::Text {
            body: body.to_string(),
        }
    }

    #[tokio::test]
    async fn test_resolve_numeric_is_local() {
        // No mock server needed: numeric ids never hit the gateway
        let sender = WebhookSender::new("http://127.0.0.1:9", Duration::from_secs(5)).unwrap();
        let resolved = sender.resolve(&TargetAddress::Chat(-77)).await.unwrap();
        assert_eq!(resolved.chat_id, -77);
    }

    #[tokio::test]
    async fn test_resolve_username_via_gateway() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/resolve"))
            .and(body_partial_json(json!({ "username": "herald" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "chat_id": 512 })))
            .mount(&server)
            .await;

        let sender = WebhookSender::new(server.uri(), Duration::from_secs(5)).unwrap();
        let resolved = sender
            .resolve(&TargetAddress::Username("herald".to_string()))
            .await
            .unwrap();
        assert_eq!(resolved.chat_id, 512);
    }

    #[tokio::test]
    async fn test_resolve_unknown_username_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/resolve"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let sender = WebhookSender::new(server.uri(), Duration::from_secs(5)).unwrap();
        let err = sender
            .resolve(&TargetAddress::Username("ghost".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(err, SenderError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_deliver_success_and_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/send"))
            .and(body_partial_json(json!({ "chat_id": 100 })))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/send"))
            .and(body_partial_json(json!({ "chat_id": 200 })))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let sender = WebhookSender::new(server.uri(), Duration::from_secs(5)).unwrap();

        sender
            .deliver(&ResolvedTarget { chat_id: 100 }, &text("hello"))
            .await
            .unwrap();

        let err = sender
            .deliver(&ResolvedTarget { chat_id: 200 }, &text("hello"))
            .await
            .unwrap_err();
        assert!(matches!(err, SenderError::Delivery { .. }));
        assert!(!err.is_fatal());
    }

    #[tokio::test]
    async fn test_connection_refused_is_unavailable() {
        // Port 9 (discard) is closed; connect errors must be fatal
        let sender = WebhookSender::new("http://127.0.0.1:9", Duration::from_secs(1)).unwrap();
        let err = sender
            .deliver(&ResolvedTarget { chat_id: 1 }, &text("hello"))
            .await
            .unwrap_err();
        assert!(err.is_fatal());
    }
}
