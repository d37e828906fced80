//! Web API endpoints for device state and remote commands.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::broadcast::{self, error::RecvError};

use tivo_client::{ClientError, ConnectionState, DeviceState, TivoClient};

use crate::web::state::{LineRecord, WebBridge};

// ============================================================================
// Data structures
// ============================================================================

/// Device summary for API.
#[derive(Debug, Serialize)]
pub struct DeviceInfo {
    pub device: String,
    pub addr: String,
    pub connection: ConnectionState,
    pub state: DeviceState,
}

impl DeviceInfo {
    fn from_client(client: &TivoClient) -> Self {
        Self {
            device: client.device().to_string(),
            addr: client.addr().to_string(),
            connection: client.connection_state(),
            state: client.state(),
        }
    }
}

/// Command request body.
#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    #[serde(rename = "type", default = "default_command_type")]
    pub kind: String,
    pub arg: String,
}

fn default_command_type() -> String {
    "ircode".to_string()
}

/// Live TV tune request body.
#[derive(Debug, Deserialize)]
pub struct TuneRequest {
    pub channel: String,
    #[serde(default)]
    pub force: bool,
}

// ============================================================================
// Helpers
// ============================================================================

fn error_status(err: &ClientError) -> StatusCode {
    match err {
        ClientError::InvalidCommand(_) => StatusCode::BAD_REQUEST,
        ClientError::NotConnected | ClientError::Closed => StatusCode::SERVICE_UNAVAILABLE,
        ClientError::WriteFailed(_) => StatusCode::BAD_GATEWAY,
    }
}

fn client_error(err: ClientError) -> Response {
    (
        error_status(&err),
        Json(json!({
            "success": false,
            "error": err.to_string()
        })),
    )
        .into_response()
}

fn unknown_device(device: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "success": false,
            "error": format!("Unknown device {:?}", device)
        })),
    )
        .into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// List all devices.
pub async fn get_devices(State(bridge): State<Arc<WebBridge>>) -> Json<Vec<DeviceInfo>> {
    Json(bridge.clients().iter().map(DeviceInfo::from_client).collect())
}

/// Get one device.
pub async fn get_device(
    State(bridge): State<Arc<WebBridge>>,
    Path(device): Path<String>,
) -> Response {
    match bridge.client(&device) {
        Some(client) => Json(DeviceInfo::from_client(&client)).into_response(),
        None => unknown_device(&device),
    }
}

/// Run a remote command on a device.
pub async fn post_command(
    State(bridge): State<Arc<WebBridge>>,
    Path(device): Path<String>,
    Json(payload): Json<CommandRequest>,
) -> Response {
    let Some(client) = bridge.client(&device) else {
        return unknown_device(&device);
    };

    match client.command(&payload.kind, &payload.arg).await {
        Ok(()) => Json(json!({ "success": true })).into_response(),
        Err(e) => {
            if e.is_invalid_command() {
                log::debug!("[{}] Rejected command {} {}", device, payload.kind, payload.arg);
            } else {
                log::warn!("[{}] Command {} {} failed: {}", device, payload.kind, payload.arg, e);
            }
            client_error(e)
        }
    }
}

/// Tune a channel on live TV.
pub async fn post_tune(
    State(bridge): State<Arc<WebBridge>>,
    Path(device): Path<String>,
    Json(payload): Json<TuneRequest>,
) -> Response {
    let Some(client) = bridge.client(&device) else {
        return unknown_device(&device);
    };

    match client.tune_live(&payload.channel, payload.force).await {
        Ok(tuned) => Json(json!({
            "success": true,
            "tuned": tuned,
            "pending": !tuned
        }))
        .into_response(),
        Err(e) => client_error(e),
    }
}

/// Recently received lines.
pub async fn get_lines(
    State(bridge): State<Arc<WebBridge>>,
    Path(device): Path<String>,
) -> Response {
    match bridge.recent_lines(&device) {
        Some(lines) => Json(lines).into_response(),
        None => unknown_device(&device),
    }
}

/// Server-sent events, one `line` event per received line.
pub async fn get_events(
    State(bridge): State<Arc<WebBridge>>,
    Path(device): Path<String>,
) -> Response {
    if bridge.client(&device).is_none() {
        return unknown_device(&device);
    }

    let events = device_lines(bridge.subscribe(), device)
        .map(|record| Ok::<_, Infallible>(Event::default().event("line").data(record.line)));
    Sse::new(events).keep_alive(KeepAlive::default()).into_response()
}

/// Lines received from `device`, skipping other devices.
fn device_lines(
    rx: broadcast::Receiver<LineRecord>,
    device: String,
) -> impl Stream<Item = LineRecord> {
    stream::unfold(rx, move |mut rx| {
        let device = device.clone();
        async move {
            loop {
                match rx.recv().await {
                    Ok(record) if record.device == device => return Some((record, rx)),
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        log::warn!("[{}] Event stream lagged, {} lines skipped", device, skipped);
                    }
                    Err(RecvError::Closed) => return None,
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::{header::CONTENT_TYPE, Request};
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;
    use tower::ServiceExt;

    use tivo_client::{Bridge, ConnectionConfig};

    use crate::web::router;

    fn spawn_client(bridge: &Arc<WebBridge>, device: &str, port: u16) -> TivoClient {
        let config = ConnectionConfig {
            port,
            backoff_initial: Duration::from_millis(10),
            backoff_max: Duration::from_millis(50),
            ..ConnectionConfig::new(device, "127.0.0.1")
        };
        TivoClient::spawn(config, bridge.clone())
    }

    async fn closed_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    async fn call(
        bridge: &Arc<WebBridge>,
        request: Request<Body>,
    ) -> (StatusCode, serde_json::Value) {
        let response = router(bridge.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
        (status, value)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_list_devices() {
        let bridge = Arc::new(WebBridge::new());
        let port = closed_port().await;
        spawn_client(&bridge, "den", port);

        let (status, body) = call(&bridge, get("/api/devices")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["device"], "den");
        assert_eq!(body[0]["addr"], format!("127.0.0.1:{}", port));
        assert_eq!(body[0]["state"]["mode"], "UNKNOWN");
    }

    #[tokio::test]
    async fn test_unknown_device_is_404() {
        let bridge = Arc::new(WebBridge::new());

        let (status, _) = call(&bridge, get("/api/devices/garage")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = call(
            &bridge,
            post("/api/devices/garage/command", json!({"type": "ircode", "arg": "MUTE"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_invalid_command_is_400() {
        let bridge = Arc::new(WebBridge::new());
        spawn_client(&bridge, "den", closed_port().await);

        let (status, body) = call(
            &bridge,
            post("/api/devices/den/command", json!({"type": "ircode", "arg": "NOT_A_CODE"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid command \"NOT_A_CODE\"");
    }

    #[tokio::test]
    async fn test_disconnected_command_is_503() {
        let bridge = Arc::new(WebBridge::new());
        spawn_client(&bridge, "den", closed_port().await);

        let request = post("/api/devices/den/command", json!({"arg": "MUTE"}));
        let (status, _) = call(&bridge, request).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let request = post("/api/devices/den/tune", json!({"channel": "0012"}));
        let (status, _) = call(&bridge, request).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_command_reaches_device() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let bridge = Arc::new(WebBridge::new());
        let client = spawn_client(&bridge, "den", port);

        let (mut device, _) = listener.accept().await.unwrap();
        let mut conn = client.subscribe_connection();
        conn.wait_for(|s| s.is_connected()).await.unwrap();

        let (status, body) = call(
            &bridge,
            post("/api/devices/den/command", json!({"type": "ircode", "arg": "PLAY"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);

        let mut buf = [0u8; 12];
        device.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"IRCODE PLAY\r");

        let request = post("/api/devices/den/tune", json!({"channel": "0012"}));
        let (status, body) = call(&bridge, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["tuned"], false);
        assert_eq!(body["pending"], true);
    }

    #[tokio::test]
    async fn test_recent_lines() {
        let bridge = Arc::new(WebBridge::new());
        spawn_client(&bridge, "den", closed_port().await);
        bridge.publish("den", "LIVETV_READY");
        bridge.publish("den", "CH_STATUS 0007 OK");

        let (status, body) = call(&bridge, get("/api/devices/den/lines")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().map(Vec::len), Some(2));
        assert_eq!(body[1]["line"], "CH_STATUS 0007 OK");
    }

    #[tokio::test]
    async fn test_get_one_device() {
        let bridge = Arc::new(WebBridge::new());
        let port = closed_port().await;
        spawn_client(&bridge, "den", port);
        spawn_client(&bridge, "attic", port);

        let (status, body) = call(&bridge, get("/api/devices/den")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["device"], "den");
        assert_eq!(body["addr"], format!("127.0.0.1:{}", port));
        assert_eq!(body["state"]["mode"], "UNKNOWN");
        assert!(body["state"]["channel"].is_null());
        assert!(body["connection"].is_string());
    }

    #[tokio::test]
    async fn test_device_lines_skip_other_devices() {
        let bridge = WebBridge::new();
        let lines = device_lines(bridge.subscribe(), "den".to_string());
        futures::pin_mut!(lines);

        bridge.publish("attic", "LIVETV_READY");
        let idle = tokio::time::timeout(Duration::from_millis(100), lines.next()).await;
        assert!(idle.is_err());

        bridge.publish("den", "CH_STATUS 0007 OK");
        let record = tokio::time::timeout(Duration::from_secs(5), lines.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.device, "den");
        assert_eq!(record.line, "CH_STATUS 0007 OK");
    }
}
