//! HTTP surface of the relay: routes, handlers and error mapping.

use std::path::Path;

use axum::{
    Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::config::RelayConfig;
use crate::message_id::generate_message_id;
use crate::onenet::{OneNetClient, RelayError, UpstreamResponse};
use crate::token::{self, SignError};
use crate::types::{
    Connect, ConnectRequest, Endpoints, ErrorEnvelope, HealthResponse, MissingFields,
    PropertyPost, REPORTED_EXPIRES_IN, RelayDetails, RelayEnvelope, SendData, SendDataRequest,
    ServiceInfo, TokenRequest, TokenResponse, iso_timestamp, property_post_topic,
};

pub const SERVICE_NAME: &str = "OneNET Proxy Server";

/// Application state shared across all requests
#[derive(Clone)]
pub struct AppState {
    client: OneNetClient,
}

impl AppState {
    pub fn new(client: OneNetClient) -> Self {
        Self { client }
    }
}

/// Build the router for `config`, including the upstream client.
pub fn app(config: &RelayConfig) -> Result<Router, RelayError> {
    let client = OneNetClient::new(config)?;
    Ok(build_app(AppState::new(client), &config.static_dir))
}

/// Build the Axum application with routes and middleware
pub fn build_app(state: AppState, static_dir: impl AsRef<Path>) -> Router {
    Router::new()
        .route("/", get(service_info))
        .route("/api/health", get(health_check))
        // OneNET relay
        .route("/api/onenet/token", post(issue_token))
        .route("/api/onenet/connect", post(connect))
        .route("/api/onenet/send-data", post(send_data))
        // Frontend bundle
        .fallback_service(ServeDir::new(static_dir))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

async fn service_info() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        message: "OneNET API proxy is running".to_string(),
        endpoints: Endpoints {
            health: "GET /api/health".to_string(),
            connect: "POST /api/onenet/connect".to_string(),
            token: "POST /api/onenet/token".to_string(),
            send_data: "POST /api/onenet/send-data".to_string(),
            frontend: "GET /index.html".to_string(),
        },
        documentation: "https://github.com/chinamobile/OneNET".to_string(),
    })
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK".to_string(),
        service: SERVICE_NAME.to_string(),
        timestamp: iso_timestamp(),
    })
}

/// Compute a device token
async fn issue_token(
    payload: Result<Json<TokenRequest>, JsonRejection>,
) -> Result<Json<TokenResponse>, ApiError> {
    let credentials = json_body(payload)?.into_credentials()?;

    tracing::info!(
        product_id = %credentials.product_id,
        device_name = %credentials.device_name,
        "Issuing OneNET token"
    );

    let token = token::sign_now(&credentials).map_err(|e| {
        tracing::error!("Token computation error: {}", e);
        ApiError::Signing(e)
    })?;

    Ok(Json(TokenResponse {
        success: true,
        token,
        expires_in: REPORTED_EXPIRES_IN,
        timestamp: iso_timestamp(),
    }))
}

/// Relay a caller-signed payload to OneNET
async fn connect(
    State(state): State<AppState>,
    payload: Result<Json<ConnectRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Connect { token, topic, data } = json_body(payload)?.validate()?;

    tracing::info!(
        topic = %topic,
        token_len = token.len(),
        url = state.client.url(),
        "Relaying connect request to OneNET"
    );

    let response = state
        .client
        .post_with_query(&token, &topic, &data)
        .await
        .map_err(|e| {
            tracing::error!("OneNET connect error: {}", e);
            ApiError::Upstream(e)
        })?;

    tracing::info!(status = %response.status, "OneNET connect response");

    Ok(relay_reply(
        response,
        ("OneNET connect succeeded", "OneNET connect failed"),
        topic,
        None,
    ))
}

/// Sign, build and relay a single property report
async fn send_data(
    State(state): State<AppState>,
    payload: Result<Json<SendDataRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let SendData {
        credentials,
        data_name,
        data_value,
    } = json_body(payload)?.validate()?;

    tracing::info!(
        product_id = %credentials.product_id,
        device_name = %credentials.device_name,
        data_name = %data_name,
        "Sending property report to OneNET"
    );

    let token = token::sign_now(&credentials).map_err(|e| {
        tracing::error!("Token computation error: {}", e);
        ApiError::Signing(e)
    })?;

    let topic = property_post_topic(&credentials.product_id, &credentials.device_name);
    let body = PropertyPost::single(generate_message_id(), data_name, data_value);

    let response = state
        .client
        .post_with_params_header(&token, &topic, &body)
        .await
        .map_err(|e| {
            tracing::error!("OneNET send-data error: {}", e);
            ApiError::Upstream(e)
        })?;

    tracing::info!(status = %response.status, "OneNET send-data response");

    Ok(relay_reply(
        response,
        ("Data sent successfully", "Data send failed"),
        topic,
        Some(body),
    ))
}

/// Wrap an upstream reply, keeping its status code.
fn relay_reply(
    response: UpstreamResponse,
    (ok_message, failed_message): (&str, &str),
    topic: String,
    data: Option<PropertyPost>,
) -> Response {
    let success = response.is_success();
    let envelope = RelayEnvelope {
        success,
        status_code: response.status.as_u16(),
        message: if success { ok_message } else { failed_message }.to_string(),
        onenet_response: response.body,
        details: RelayDetails {
            timestamp: iso_timestamp(),
            topic,
            data,
        },
    };
    (response.status, Json(envelope)).into_response()
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload.map(|Json(body)| body).map_err(|rejection| {
        tracing::warn!("Rejected request body: {}", rejection.body_text());
        ApiError::BadRequest(format!("invalid JSON body: {}", rejection.body_text()))
    })
}

/// API error types
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Signing(SignError),
    Upstream(RelayError),
}

impl From<MissingFields> for ApiError {
    fn from(missing: MissingFields) -> Self {
        tracing::warn!("{}", missing);
        ApiError::BadRequest(missing.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, error) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, None),
            ApiError::Signing(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("failed to compute token: {}", e),
                None,
            ),
            ApiError::Upstream(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("proxy error: {}", e),
                Some(e.to_string()),
            ),
        };

        let body = Json(ErrorEnvelope {
            success: false,
            status_code: status.as_u16(),
            message,
            error,
        });

        (status, body).into_response()
    }
}
