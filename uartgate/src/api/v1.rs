//! API version 1 endpoints.
//!
//! Handlers are thin: they move the blocking core call onto a blocking
//! thread, then shape the result into JSON. Messages for people are composed
//! here and nowhere else.

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::{
    error::ExchangeError,
    link::{LinkManager, LinkPhase, Reply, CMD_OFF, CMD_ON},
    transport::{PortDescriptor, SerialBackend},
};

/// Shared application state for API endpoints.
pub struct AppState<B: SerialBackend> {
    pub link: Arc<LinkManager<B>>,
}

impl<B: SerialBackend> AppState<B> {
    pub fn new(link: Arc<LinkManager<B>>) -> Self {
        Self { link }
    }

    /// Run `f` against the link manager on a blocking thread.
    async fn blocking<T, F>(&self, f: F) -> Result<T, Response>
    where
        F: FnOnce(&LinkManager<B>) -> T + Send + 'static,
        T: Send + 'static,
    {
        let link = Arc::clone(&self.link);
        tokio::task::spawn_blocking(move || f(&link))
            .await
            .map_err(|e| {
                error!(error = %e, "Link task failed");
                let body = ErrorResponse {
                    error: format!("Internal error: {e}"),
                };
                (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
            })
    }
}

impl<B: SerialBackend> Clone for AppState<B> {
    fn clone(&self) -> Self {
        Self {
            link: Arc::clone(&self.link),
        }
    }
}

/// Link status response.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StatusResponse {
    /// "connected" or "disconnected"
    pub status: String,
    /// Current or last port, "Not detected" if none
    pub port: String,
    pub phase: LinkPhase,
}

/// One entry in the port listing.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PortEntry {
    #[serde(flatten)]
    pub port: PortDescriptor,
    /// Whether the description matches a known USB-serial bridge
    pub candidate: bool,
}

/// Port listing response.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PortsResponse {
    pub ports: Vec<PortEntry>,
}

/// Outcome of connect/disconnect requests.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ActionResponse {
    /// "success" or "error"
    pub status: String,
    pub message: String,
}

impl ActionResponse {
    fn success(message: impl Into<String>) -> Self {
        Self {
            status: "success".to_string(),
            message: message.into(),
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
        }
    }
}

/// Outcome of a command sent to the device.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CommandResponse {
    /// "success" or "error"
    pub status: String,
    pub message: String,
    /// Device reply, "Command sent" if it stayed silent, null on failure
    pub response: Option<String>,
}

/// Raw command request payload.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CommandRequest {
    /// A single ASCII character, written as one byte
    pub command: String,
}

/// API error response.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Health check endpoint handler.
async fn health() -> &'static str {
    "OK"
}

/// Link status endpoint handler.
///
/// Reads the status snapshot; never waits for an in-flight exchange.
async fn status<B: SerialBackend>(State(state): State<AppState<B>>) -> Json<StatusResponse> {
    let status = state.link.current_status();
    Json(StatusResponse {
        status: if status.connected {
            "connected"
        } else {
            "disconnected"
        }
        .to_string(),
        port: status.port.unwrap_or_else(|| "Not detected".to_string()),
        phase: status.phase,
    })
}

/// List ports endpoint handler.
///
/// # Example
/// ```bash
/// curl http://localhost:5000/api/v1/ports
/// ```
async fn list_ports<B: SerialBackend>(State(state): State<AppState<B>>) -> Response {
    let ports = match state
        .blocking(|link| {
            link.list_available_ports()
                .into_iter()
                .map(|port| PortEntry {
                    candidate: link.resolver().is_candidate(&port.description),
                    port,
                })
                .collect::<Vec<_>>()
        })
        .await
    {
        Ok(ports) => ports,
        Err(response) => return response,
    };

    Json(PortsResponse { ports }).into_response()
}

/// Connect endpoint handler: reconnect to the remembered port or discover.
async fn connect<B: SerialBackend>(State(state): State<AppState<B>>) -> Response {
    let result = state
        .blocking(|link| link.ensure_connected().then(|| link.current_status().port))
        .await;

    match result {
        Ok(Some(port)) => {
            let port = port.unwrap_or_default();
            Json(ActionResponse::success(format!("Connected to device on {port}")))
                .into_response()
        }
        Ok(None) => {
            let body = ActionResponse::error(
                "Failed to connect to device. Check that it is plugged in and not used by \
                 another application.",
            );
            (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
        }
        Err(response) => response,
    }
}

/// Connect to a specific port endpoint handler.
///
/// Port names containing `/` must be percent-encoded.
///
/// # Example
/// ```bash
/// curl -X POST http://localhost:5000/api/v1/connect/%2Fdev%2FttyUSB0
/// ```
async fn connect_port<B: SerialBackend>(
    State(state): State<AppState<B>>,
    Path(port): Path<String>,
) -> Response {
    debug!(port = %port, "API request to connect to port");

    let target = port.clone();
    match state.blocking(move |link| link.connect_to(&target)).await {
        Ok(Ok(())) => {
            Json(ActionResponse::success(format!("Connected to device on {port}"))).into_response()
        }
        Ok(Err(e)) => {
            warn!(port = %port, error = %e, "Connect request failed");
            let body = ActionResponse::error(format!("Failed to connect to {port}: {}", cause(&e)));
            (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
        }
        Err(response) => response,
    }
}

/// Disconnect endpoint handler.
async fn disconnect<B: SerialBackend>(State(state): State<AppState<B>>) -> Response {
    match state.blocking(|link| link.disconnect()).await {
        Ok(()) => Json(ActionResponse::success("Disconnected")).into_response(),
        Err(response) => response,
    }
}

/// LED endpoint handler: `on` sends `1`, `off` sends `0`.
async fn led<B: SerialBackend>(
    State(state): State<AppState<B>>,
    Path(led_state): Path<String>,
) -> Response {
    let Some((command, message)) = led_command(&led_state) else {
        let body = CommandResponse {
            status: "error".to_string(),
            message: "Invalid command".to_string(),
            response: None,
        };
        return (StatusCode::BAD_REQUEST, Json(body)).into_response();
    };

    send(&state, command, message).await
}

/// Raw command endpoint handler.
///
/// # Example
/// ```bash
/// curl -X POST http://localhost:5000/api/v1/command \
///    -H "Content-Type: application/json" \
///    -d '{"command": "1"}'
/// ```
async fn command<B: SerialBackend>(
    State(state): State<AppState<B>>,
    Json(req): Json<CommandRequest>,
) -> Response {
    let Some(byte) = command_byte(&req.command) else {
        let body = ErrorResponse {
            error: format!(
                "Command must be a single ASCII character, got {:?}",
                req.command
            ),
        };
        return (StatusCode::BAD_REQUEST, Json(body)).into_response();
    };

    send(&state, byte, format!("Sent '{}'", char::from(byte))).await
}

async fn send<B: SerialBackend>(
    state: &AppState<B>,
    byte: u8,
    message: impl Into<String>,
) -> Response {
    match state.blocking(move |link| link.exchange(byte)).await {
        Ok(result) => command_response(result, message.into()),
        Err(response) => response,
    }
}

/// Map an LED state name to its command byte and success message.
pub fn led_command(state: &str) -> Option<(u8, &'static str)> {
    match state {
        "on" => Some((CMD_ON, "LED turned ON")),
        "off" => Some((CMD_OFF, "LED turned OFF")),
        _ => None,
    }
}

/// Accept exactly one ASCII character.
pub fn command_byte(command: &str) -> Option<u8> {
    match command.as_bytes() {
        [byte] if byte.is_ascii() => Some(*byte),
        _ => None,
    }
}

/// Shape an exchange outcome into an HTTP response.
pub fn command_response(result: Result<Reply, ExchangeError>, message: String) -> Response {
    match result {
        Ok(reply) => Json(CommandResponse {
            status: "success".to_string(),
            message,
            response: Some(reply.to_string()),
        })
        .into_response(),
        Err(ExchangeError::NotConnected) => {
            let body = CommandResponse {
                status: "error".to_string(),
                message: "Not connected. Connect to the device first.".to_string(),
                response: None,
            };
            (StatusCode::CONFLICT, Json(body)).into_response()
        }
        Err(ExchangeError::Io(e)) => {
            let body = CommandResponse {
                status: "error".to_string(),
                message: format!("Device communication failed: {e}"),
                response: None,
            };
            (StatusCode::BAD_GATEWAY, Json(body)).into_response()
        }
    }
}

// The underlying cause without our own "Failed to open <port>:" prefix.
fn cause(err: &crate::error::Error) -> String {
    match err {
        crate::error::Error::OpenFailed { cause, .. } => cause.clone(),
        other => other.to_string(),
    }
}

/// Build the v1 API routes.
pub fn routes<B: SerialBackend>(state: AppState<B>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/status", get(status::<B>))
        .route("/ports", get(list_ports::<B>))
        .route("/connect", post(connect::<B>))
        .route("/connect/:port", post(connect_port::<B>))
        .route("/disconnect", post(disconnect::<B>))
        .route("/led/:state", post(led::<B>))
        .route("/command", post(command::<B>))
        .with_state(state)
}
