//! HTTP client for the OneNET device API.

use reqwest::header::{self, HeaderValue};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::config::RelayConfig;

const PROTOCOL: &str = "MQTT";

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("failed to encode request body: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("upstream request failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Buffered upstream reply.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    /// Parsed JSON, or the raw text as a JSON string when it does not parse.
    pub body: Value,
}

impl UpstreamResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Parse `text` as JSON, keeping it verbatim as a string otherwise.
pub fn parse_body(text: String) -> Value {
    serde_json::from_str(&text).unwrap_or(Value::String(text))
}

/// Client for OneNET's HTTP property-post endpoint.
///
/// Holds no per-request state; one instance is shared by all handlers.
#[derive(Debug, Clone)]
pub struct OneNetClient {
    http: Client,
    url: String,
}

impl OneNetClient {
    pub fn new(config: &RelayConfig) -> Result<Self, RelayError> {
        let mut builder =
            Client::builder().danger_accept_invalid_certs(config.accept_invalid_certs);
        if let Some(timeout) = config.upstream_timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build().map_err(RelayError::Client)?;

        Ok(Self {
            http,
            url: config.upstream_url.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// POST `body` with `protocol` and `topic` carried as query parameters.
    pub async fn post_with_query<T: Serialize + ?Sized>(
        &self,
        token: &str,
        topic: &str,
        body: &T,
    ) -> Result<UpstreamResponse, RelayError> {
        let request = self
            .http
            .post(&self.url)
            .query(&[("protocol", PROTOCOL), ("topic", topic)]);
        self.send(request, token, body).await
    }

    /// POST `body` with `protocol` and `topic` packed into the `params` header.
    pub async fn post_with_params_header<T: Serialize + ?Sized>(
        &self,
        token: &str,
        topic: &str,
        body: &T,
    ) -> Result<UpstreamResponse, RelayError> {
        let request = self.http.post(&self.url).header("params", params_header(topic));
        self.send(request, token, body).await
    }

    async fn send<T: Serialize + ?Sized>(
        &self,
        request: RequestBuilder,
        token: &str,
        body: &T,
    ) -> Result<UpstreamResponse, RelayError> {
        let payload = serde_json::to_vec(body)?;

        let response = request
            .header(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            )
            .header("token", token)
            .body(payload)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        tracing::debug!(%status, body_len = text.len(), "OneNET response received");

        Ok(UpstreamResponse {
            status,
            body: parse_body(text),
        })
    }
}

/// `protocol:MQTT;topic:<percent-encoded topic>`
pub fn params_header(topic: &str) -> String {
    format!("protocol:{};topic:{}", PROTOCOL, urlencoding::encode(topic))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_body_json() {
        assert_eq!(parse_body(r#"{"ok":true}"#.to_string()), json!({"ok": true}));
    }

    #[test]
    fn test_parse_body_keeps_key_order() {
        let body = parse_body(r#"{"z":1,"a":{"y":2,"b":3}}"#.to_string());
        assert_eq!(serde_json::to_string(&body).unwrap(), r#"{"z":1,"a":{"y":2,"b":3}}"#);
    }

    #[test]
    fn test_parse_body_raw_text() {
        assert_eq!(
            parse_body("Internal Server Error".to_string()),
            json!("Internal Server Error")
        );
        assert_eq!(parse_body(String::new()), json!(""));
    }

    #[test]
    fn test_params_header() {
        assert_eq!(
            params_header("$sys/abc123/dev1/thing/property/post"),
            "protocol:MQTT;topic:%24sys%2Fabc123%2Fdev1%2Fthing%2Fproperty%2Fpost"
        );
    }

    #[test]
    fn test_client_uses_configured_url() {
        let config = RelayConfig::default().with_upstream_url("http://127.0.0.1:1/post");
        let client = OneNetClient::new(&config).unwrap();
        assert_eq!(client.url(), "http://127.0.0.1:1/post");
    }
}
