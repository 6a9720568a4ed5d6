/**
 * HOSTWATCH REST API - HTTP surface of the kernel
 *
 * ROLE:
 * Thin transport over the inventory, the health reconciler and the shutdown
 * invoker. No business rule lives here: handlers parse, delegate, and wrap
 * the result in the JSON envelope (`ApiResponse`).
 *
 * ROUTES:
 * - GET    /health                          liveness
 * - POST   /server/save                     create host
 * - GET    /server/list?limit=N             list hosts (default 30)
 * - GET    /server/get/{id}                 one host
 * - PUT    /server/update                   full-record update
 * - DELETE /server/delete/{id}              delete host
 * - GET    /server/ping/{address}           reconcile status
 * - POST   /server/{id}/reset/{address}     remote shutdown (plain text reply)
 * - GET    /server/image/{name}             image bytes
 *
 * CORS: origins from config, credentials allowed (dashboard runs on another port).
 */

use crate::error::ApiError;
use crate::health::HealthReconciler;
use crate::images::ImageLibrary;
use crate::inventory::{Inventory, DEFAULT_LIST_LIMIT};
use crate::models::{HostId, HostStatus, HostUpdate, NewHost};
use crate::response::ApiResponse;
use crate::shutdown::ShutdownInvoker;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderName, HeaderValue, Method};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub inventory: Arc<Inventory>,
    pub reconciler: HealthReconciler,
    pub shutdown: Arc<ShutdownInvoker>,
    pub images: Arc<ImageLibrary>,
}

#[derive(Debug, Deserialize)]
struct ListParams {
    limit: Option<usize>,
}

pub fn build_router(app_state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/server/save", post(save_server))
        .route("/server/list", get(list_servers))
        .route("/server/get/{id}", get(get_server))
        .route("/server/update", put(update_server))
        .route("/server/delete/{id}", delete(delete_server))
        .route("/server/ping/{address}", get(ping_server))
        .route("/server/{id}/reset/{address}", post(reset_server))
        .route("/server/image/{name}", get(server_image))
        .with_state(app_state)
        .layer(cors_layer(cors_origins))
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::ORIGIN,
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::AUTHORIZATION,
            HeaderName::from_static("x-requested-with"),
        ])
        .allow_credentials(true)
}

/// Extractor rejections become 400 envelopes instead of axum's plain-text replies.
fn bad_request(rejection: impl std::fmt::Display) -> ApiError {
    ApiError::BadRequest(rejection.to_string())
}

// POST /server/save
async fn save_server(
    State(app): State<AppState>,
    payload: Result<Json<NewHost>, JsonRejection>,
) -> Result<ApiResponse, ApiError> {
    let Json(host) = payload.map_err(bad_request)?;
    let created = app.inventory.create(host)?;
    Ok(ApiResponse::ok().message("Server Created").data("server", created))
}

// GET /server/list?limit=N
async fn list_servers(
    State(app): State<AppState>,
    params: Result<Query<ListParams>, QueryRejection>,
) -> Result<ApiResponse, ApiError> {
    let Query(params) = params.map_err(bad_request)?;
    let servers = app.inventory.list(params.limit.unwrap_or(DEFAULT_LIST_LIMIT))?;
    Ok(ApiResponse::ok().message("Servers retrieved").data("servers", servers))
}

// GET /server/get/{id}
async fn get_server(
    State(app): State<AppState>,
    id: Result<Path<HostId>, PathRejection>,
) -> Result<ApiResponse, ApiError> {
    let Path(id) = id.map_err(bad_request)?;
    let server = app.inventory.get(id)?.ok_or(ApiError::HostNotFound(id))?;
    Ok(ApiResponse::ok().message("Server retrieved").data("server", server))
}

// PUT /server/update
async fn update_server(
    State(app): State<AppState>,
    payload: Result<Json<HostUpdate>, JsonRejection>,
) -> Result<ApiResponse, ApiError> {
    let Json(update) = payload.map_err(bad_request)?;
    let server = app.inventory.update(update)?;
    Ok(ApiResponse::ok().message("Server updated").data("server", server))
}

// DELETE /server/delete/{id}
async fn delete_server(
    State(app): State<AppState>,
    id: Result<Path<HostId>, PathRejection>,
) -> Result<ApiResponse, ApiError> {
    let Path(id) = id.map_err(bad_request)?;
    let deleted = app.inventory.delete(id)?;
    Ok(ApiResponse::ok().message("Server deleted").data("deleted", deleted))
}

// GET /server/ping/{address}
async fn ping_server(
    State(app): State<AppState>,
    address: Result<Path<String>, PathRejection>,
) -> Result<ApiResponse, ApiError> {
    let Path(address) = address.map_err(bad_request)?;
    let server = app.reconciler.reconcile(&address).await?;
    let message = if server.status == HostStatus::Up { "Ping Success" } else { "Ping Failed" };
    Ok(ApiResponse::ok().message(message).data("server", server))
}

// POST /server/{id}/reset/{address}
async fn reset_server(
    State(app): State<AppState>,
    params: Result<Path<(HostId, String)>, PathRejection>,
) -> Result<&'static str, ApiError> {
    let Path((id, address)) = params.map_err(bad_request)?;
    let outcome = app.shutdown.shutdown(&address, id).await?;
    info!(id = outcome.host.id, address = %outcome.host.address, output = %outcome.output.trim(), "server reset requested");
    Ok("Server reset successfully")
}

// GET /server/image/{name}
async fn server_image(
    State(app): State<AppState>,
    name: Result<Path<String>, PathRejection>,
) -> Result<Response, ApiError> {
    let Path(name) = name.map_err(bad_request)?;
    let image = app.images.load(&name).await?.ok_or(ApiError::ImageNotFound(name))?;
    Ok(([(header::CONTENT_TYPE, image.content_type)], image.bytes).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::images::ImageRotation;
    use crate::probe::{ProbeError, Prober};
    use crate::shutdown::{CommandOutput, CommandRunner, ShutdownError};
    use crate::store::{HostStore, JsonHostStore};
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tower::ServiceExt;

    struct FixedProber(bool);

    #[async_trait]
    impl Prober for FixedProber {
        async fn probe(&self, _address: &str, _timeout: Duration) -> Result<bool, ProbeError> {
            Ok(self.0)
        }
    }

    #[derive(Default)]
    struct CountingRunner {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CommandRunner for CountingRunner {
        async fn run(&self, _program: &str, _args: &[String]) -> Result<CommandOutput, ShutdownError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(CommandOutput { code: Some(0), output: String::new() })
        }
    }

    struct Harness {
        router: Router,
        store: Arc<JsonHostStore>,
        runner: Arc<CountingRunner>,
        _images_dir: tempfile::TempDir,
    }

    fn harness(reachable: bool) -> Harness {
        let store = Arc::new(JsonHostStore::new_in_memory());
        let runner = Arc::new(CountingRunner::default());
        let images_dir = tempfile::tempdir().unwrap();
        std::fs::write(images_dir.path().join("server1.png"), [137u8, 80, 78, 71]).unwrap();

        let rotation = Arc::new(ImageRotation::new("http://localhost:8080", &[]));
        let state = AppState {
            inventory: Arc::new(Inventory::new(store.clone(), rotation)),
            reconciler: HealthReconciler::new(store.clone(), Arc::new(FixedProber(reachable)), Duration::from_secs(1)),
            shutdown: Arc::new(ShutdownInvoker::new(store.clone(), runner.clone(), "shutdown {address}")),
            images: Arc::new(ImageLibrary::new(images_dir.path())),
        };
        Harness {
            router: build_router(state, &["http://localhost:4200".to_string()]),
            store,
            runner,
            _images_dir: images_dir,
        }
    }

    async fn send(router: &Router, req: Request<Body>) -> (StatusCode, Vec<u8>) {
        let res = router.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    async fn send_json(router: &Router, req: Request<Body>) -> (StatusCode, Value) {
        let (status, body) = send(router, req).await;
        (status, serde_json::from_slice(&body).unwrap())
    }

    fn json_request(method: &str, uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    const EDGE1: &str = r#"{"ipAddr":"10.0.0.5","name":"Edge1","memory":"8GB","type":"Router","status":"SERVER_DOWN"}"#;

    #[tokio::test]
    async fn test_save_then_ping_scenario() {
        let h = harness(true);

        let (status, body) = send_json(&h.router, json_request("POST", "/server/save", EDGE1)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Server Created");
        let server = &body["data"]["server"];
        let id = server["id"].as_u64().unwrap();
        assert_eq!(server["status"], "SERVER_DOWN");
        assert!(server["imageUrl"].as_str().unwrap().starts_with("http://localhost:8080/server/image/server"));

        let (status, body) = send_json(&h.router, get("/server/ping/10.0.0.5")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Ping Success");
        assert_eq!(body["data"]["server"]["status"], "SERVER_UP");
        assert_eq!(body["data"]["server"]["id"].as_u64(), Some(id));
        assert_eq!(body["data"]["server"]["ipAddr"], "10.0.0.5");
    }

    #[tokio::test]
    async fn test_ping_unreachable_reports_failure_message() {
        let h = harness(false);
        send_json(&h.router, json_request("POST", "/server/save", EDGE1)).await;

        let (status, body) = send_json(&h.router, get("/server/ping/10.0.0.5")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Ping Failed");
        assert_eq!(body["data"]["server"]["status"], "SERVER_DOWN");
    }

    #[tokio::test]
    async fn test_ping_unknown_address_is_404_envelope() {
        let h = harness(true);
        let (status, body) = send_json(&h.router, get("/server/ping/10.9.9.9")).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["statusCode"], 404);
        assert_eq!(body["status"], "NOT_FOUND");
        assert!(body.get("data").is_none());
        assert_eq!(h.store.len().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_save_is_bad_request() {
        let h = harness(true);
        send_json(&h.router, json_request("POST", "/server/save", EDGE1)).await;

        let (status, body) = send_json(&h.router, json_request("POST", "/server/save", EDGE1)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["status"], "BAD_REQUEST");
        assert!(body["message"].as_str().unwrap().contains("already registered"));
    }

    #[tokio::test]
    async fn test_malformed_body_is_bad_request_envelope() {
        let h = harness(true);
        let (status, body) = send_json(&h.router, json_request("POST", "/server/save", "{not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["statusCode"], 400);
    }

    #[tokio::test]
    async fn test_list_get_update_delete_flow() {
        let h = harness(true);
        for i in 1..=3 {
            let body = format!(r#"{{"ipAddr":"10.0.0.{i}","name":"h{i}","memory":"8GB","type":"VM"}}"#);
            send_json(&h.router, json_request("POST", "/server/save", &body)).await;
        }

        let (_, body) = send_json(&h.router, get("/server/list?limit=2")).await;
        assert_eq!(body["message"], "Servers retrieved");
        let servers = body["data"]["servers"].as_array().unwrap();
        assert_eq!(servers.len(), 2);
        assert_eq!(servers[0]["name"], "h1");

        let (_, body) = send_json(&h.router, get("/server/list")).await;
        assert_eq!(body["data"]["servers"].as_array().unwrap().len(), 3);

        let id = servers[0]["id"].as_u64().unwrap();
        let (status, body) = send_json(&h.router, get(&format!("/server/get/{id}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["server"]["ipAddr"], "10.0.0.1");

        let update = format!(
            r#"{{"id":{id},"ipAddr":"10.0.0.1","name":"renamed","memory":"64GB","type":"VM","imageUrl":"http://x/y.png","status":"SERVER_UP"}}"#
        );
        let (status, body) = send_json(&h.router, json_request("PUT", "/server/update", &update)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["server"]["name"], "renamed");
        assert_eq!(body["data"]["server"]["status"], "SERVER_UP");
        assert_ne!(body["data"]["server"]["imageUrl"], "http://x/y.png");

        let del = Request::builder().method("DELETE").uri(format!("/server/delete/{id}")).body(Body::empty()).unwrap();
        let (_, body) = send_json(&h.router, del).await;
        assert_eq!(body["message"], "Server deleted");
        assert_eq!(body["data"]["deleted"], true);

        let (status, _) = send_json(&h.router, get(&format!("/server/get/{id}"))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_reset_runs_command_only_for_known_host() {
        let h = harness(true);
        let (_, body) = send_json(&h.router, json_request("POST", "/server/save", EDGE1)).await;
        let id = body["data"]["server"]["id"].as_u64().unwrap();

        let missing = Request::builder().method("POST").uri(format!("/server/{}/reset/10.0.0.5", id + 1)).body(Body::empty()).unwrap();
        let (status, _) = send(&h.router, missing).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(h.runner.calls.load(Ordering::SeqCst), 0);

        let reset = Request::builder().method("POST").uri(format!("/server/{id}/reset/10.0.0.5")).body(Body::empty()).unwrap();
        let (status, body) = send(&h.router, reset).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"Server reset successfully");
        assert_eq!(h.runner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_image_endpoint() {
        let h = harness(true);

        let res = h.router.clone().oneshot(get("/server/image/server1.png")).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(res.headers()[header::CONTENT_TYPE], "image/png");
        let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], &[137u8, 80, 78, 71]);

        let (status, body) = send_json(&h.router, get("/server/image/server9.png")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["status"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_cors_preflight_allows_dashboard_origin() {
        let h = harness(true);
        let req = Request::builder()
            .method("OPTIONS")
            .uri("/server/list")
            .header(header::ORIGIN, "http://localhost:4200")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
            .body(Body::empty())
            .unwrap();

        let res = h.router.clone().oneshot(req).await.unwrap();
        assert_eq!(res.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "http://localhost:4200");
        assert_eq!(res.headers()[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
    }

    #[tokio::test]
    async fn test_health() {
        let h = harness(true);
        let (status, body) = send(&h.router, get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"ok");
    }

    #[tokio::test]
    async fn test_malformed_path_and_query_are_bad_request_envelopes() {
        let h = harness(true);
        let delete_abc = Request::builder().method("DELETE").uri("/server/delete/abc").body(Body::empty()).unwrap();
        let reset_abc = Request::builder().method("POST").uri("/server/abc/reset/10.0.0.5").body(Body::empty()).unwrap();

        for req in [get("/server/get/abc"), get("/server/list?limit=abc"), delete_abc, reset_abc] {
            let uri = req.uri().to_string();
            let (status, body) = send_json(&h.router, req).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert_eq!(body["statusCode"], 400, "{uri}");
            assert_eq!(body["status"], "BAD_REQUEST", "{uri}");
            assert!(!body["message"].as_str().unwrap().is_empty(), "{uri}");
        }
        assert_eq!(h.runner.calls.load(Ordering::SeqCst), 0);
    }
}
