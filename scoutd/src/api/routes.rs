use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use shared::types::Device;
use crate::handlers::dispatch::Outcome;
use crate::handlers::HandlerInfo;
use crate::scanner::Scanner;

#[derive(Clone)]
pub struct AppState {
    pub scanner: Arc<Scanner>,
}

#[derive(Serialize)]
pub struct NumberedDevice {
    pub number: usize,
    #[serde(flatten)]
    pub device: Device,
}

#[derive(Serialize, Deserialize)]
pub struct NotificationsBody {
    pub enabled: bool,
}

#[derive(Serialize, Deserialize)]
pub struct ScanRequest {
    pub seconds: u64,
}

#[derive(Deserialize)]
pub struct ExportRequest {
    pub path: PathBuf,
}

#[derive(Serialize)]
pub struct ExportResponse {
    pub path: PathBuf,
    pub count: usize,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/devices", get(get_devices))
        .route("/v1/devices/hash", get(get_hash))
        .route("/v1/devices/:number", get(get_device))
        .route("/v1/devices/:number/handler", get(get_device_handler))
        .route("/v1/devices/:number/interact", post(post_interact))
        .route("/v1/handlers", get(get_handlers))
        .route("/v1/notifications", put(put_notifications))
        .route("/v1/scan", post(post_scan))
        .route("/v1/export", post(post_export))
        .with_state(state)
}

/// Store index for a 1-based device number
fn index(number: usize) -> Result<usize, StatusCode> {
    number.checked_sub(1).ok_or(StatusCode::NOT_FOUND)
}

async fn get_devices(State(state): State<AppState>) -> Json<Vec<NumberedDevice>> {
    let devices = state
        .scanner
        .list_devices()
        .into_iter()
        .enumerate()
        .map(|(i, device)| NumberedDevice { number: i + 1, device })
        .collect();
    Json(devices)
}

async fn get_hash(State(state): State<AppState>) -> String {
    state.scanner.snapshot_hash()
}

async fn get_device(
    State(state): State<AppState>,
    Path(number): Path<usize>,
) -> Result<Json<NumberedDevice>, StatusCode> {
    state
        .scanner
        .device(index(number)?)
        .map(|device| Json(NumberedDevice { number, device }))
        .ok_or(StatusCode::NOT_FOUND)
}

async fn get_device_handler(
    State(state): State<AppState>,
    Path(number): Path<usize>,
) -> Result<Json<HandlerInfo>, StatusCode> {
    let device = state
        .scanner
        .device(index(number)?)
        .ok_or(StatusCode::NOT_FOUND)?;

    state
        .scanner
        .find_handler(&device)
        .map(|(key, entry)| {
            Json(HandlerInfo {
                key,
                display_name: entry.display_name,
            })
        })
        .ok_or(StatusCode::NOT_FOUND)
}

async fn post_interact(
    State(state): State<AppState>,
    Path(number): Path<usize>,
) -> Result<Json<Outcome>, StatusCode> {
    state
        .scanner
        .interact(index(number)?)
        .await
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn get_handlers(State(state): State<AppState>) -> Json<Vec<HandlerInfo>> {
    Json(state.scanner.list_handlers())
}

async fn put_notifications(
    State(state): State<AppState>,
    Json(body): Json<NotificationsBody>,
) -> Json<NotificationsBody> {
    state.scanner.set_notifications_enabled(body.enabled);
    tracing::info!("Discovery notifications {}", if body.enabled { "enabled" } else { "disabled" });
    Json(NotificationsBody {
        enabled: state.scanner.notifications_enabled(),
    })
}

/// Open a scan window in the background; discovery lines show until it closes
async fn post_scan(
    State(state): State<AppState>,
    Json(request): Json<ScanRequest>,
) -> Result<(StatusCode, Json<ScanRequest>), StatusCode> {
    if request.seconds == 0 {
        return Err(StatusCode::BAD_REQUEST);
    }

    let scanner = state.scanner.clone();
    let window = Duration::from_secs(request.seconds);
    tokio::spawn(async move {
        scanner.scan(window).await;
    });
    tracing::info!("Scanning for {} seconds", request.seconds);

    Ok((StatusCode::ACCEPTED, Json(request)))
}

async fn post_export(
    State(state): State<AppState>,
    Json(request): Json<ExportRequest>,
) -> Result<Json<ExportResponse>, StatusCode> {
    let scanner = state.scanner.clone();
    let path = request.path.clone();
    let count = tokio::task::spawn_blocking(move || scanner.export_json(&path))
        .await
        .map_err(|e| {
            tracing::error!("Export task failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|e| {
            tracing::error!("Failed to export devices: {:#}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(ExportResponse {
        path: request.path,
        count,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use http_body_util::BodyExt;
    use tower::ServiceExt;
    use crate::discovery::testing::ScriptedResolver;
    use crate::handlers::builtin::register_builtin;
    use crate::identity::testing::{ScriptedProbe, ScriptedVendors};
    use crate::scanner::testing::{instance, key, scanner};

    const SSH: &str = "_ssh._tcp.local.";

    async fn app() -> (Router, Arc<Scanner>) {
        let resolver = ScriptedResolver::default();
        resolver.script(&key(SSH, "nas").instance_name, vec![instance(&["10.0.0.4"], "nas.local.")]);
        let (scanner, _) = scanner(resolver, ScriptedProbe::default(), ScriptedVendors::default());
        register_builtin(scanner.handlers());

        scanner.orchestrator().on_instance(key(SSH, "nas")).await;
        scanner.orchestrator().on_instance(key("_sonos._tcp.local.", "Kitchen")).await;
        scanner.quiesce().await;

        let scanner = Arc::new(scanner);
        let app = router(AppState { scanner: scanner.clone() });
        (app, scanner)
    }

    async fn call(app: &Router, method: Method, uri: &str, body: Option<serde_json::Value>) -> (StatusCode, Vec<u8>) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                request = request.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = app.clone().oneshot(request.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, bytes.to_vec())
    }

    fn json(bytes: &[u8]) -> serde_json::Value {
        serde_json::from_slice(bytes).unwrap()
    }

    #[tokio::test]
    async fn test_list_and_get_devices() {
        let (app, scanner) = app().await;

        let (status, body) = call(&app, Method::GET, "/v1/devices", None).await;
        assert_eq!(status, StatusCode::OK);
        let devices = json(&body);
        assert_eq!(devices.as_array().unwrap().len(), 2);
        assert_eq!(devices[0]["number"], 1);
        assert_eq!(devices[0]["ipv4"], "10.0.0.4");
        assert_eq!(devices[1]["friendly_name"], "Sonos");

        let (status, body) = call(&app, Method::GET, "/v1/devices/2", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body)["instance_name"], "Kitchen._sonos._tcp.local.");

        for uri in ["/v1/devices/0", "/v1/devices/3"] {
            let (status, _) = call(&app, Method::GET, uri, None).await;
            assert_eq!(status, StatusCode::NOT_FOUND);
        }

        let (status, body) = call(&app, Method::GET, "/v1/devices/hash", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(String::from_utf8(body).unwrap(), scanner.snapshot_hash());
    }

    #[tokio::test]
    async fn test_handler_routes() {
        let (app, _) = app().await;

        let (status, body) = call(&app, Method::GET, "/v1/devices/1/handler", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body)["key"], "ssh");

        let (status, _) = call(&app, Method::GET, "/v1/devices/2/handler", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = call(&app, Method::POST, "/v1/devices/1/interact", None).await;
        assert_eq!(status, StatusCode::OK);
        let outcome = json(&body);
        assert_eq!(outcome["outcome"], "completed");
        assert!(outcome["output"].as_str().unwrap().contains("ssh <user>@10.0.0.4"));

        let (_, body) = call(&app, Method::POST, "/v1/devices/2/interact", None).await;
        assert_eq!(json(&body)["outcome"], "no_handler");

        let (_, body) = call(&app, Method::GET, "/v1/handlers", None).await;
        assert_eq!(json(&body).as_array().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_notifications_and_export() {
        let (app, scanner) = app().await;

        let (status, body) = call(
            &app,
            Method::PUT,
            "/v1/notifications",
            Some(serde_json::json!({ "enabled": false })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body)["enabled"], false);
        assert!(!scanner.notifications_enabled());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("devices.json");
        let (status, body) = call(
            &app,
            Method::POST,
            "/v1/export",
            Some(serde_json::json!({ "path": path })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json(&body)["count"], 2);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_scan_opens_window() {
        let (app, scanner) = app().await;
        scanner.set_notifications_enabled(false);

        let (status, body) = call(
            &app,
            Method::POST,
            "/v1/scan",
            Some(serde_json::json!({ "seconds": 1 })),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(json(&body)["seconds"], 1);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(scanner.notifications_enabled());

        tokio::time::sleep(Duration::from_millis(1300)).await;
        assert!(!scanner.notifications_enabled());

        let (status, _) = call(
            &app,
            Method::POST,
            "/v1/scan",
            Some(serde_json::json!({ "seconds": 0 })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
