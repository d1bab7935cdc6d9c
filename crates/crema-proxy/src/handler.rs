//! Request handlers: worker control routes and fetch interception.

use crate::server::AppState;
use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use crema_core::network::is_hop_by_hop;
use crema_core::{
    EventOutcome, FetchResult, Fetcher, NotificationClick, PushMessage, RequestDestination,
    RequestMode, WorkerError, WorkerEvent, WorkerRequest, WorkerResponse,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, warn};
use url::Url;

/// Response header naming where a proxied response came from.
pub const SOURCE_HEADER: &str = "x-crema-source";

/// Error body returned by every route.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Map a worker error onto an HTTP response.
fn error_response(err: &WorkerError) -> Response {
    let status = StatusCode::from_u16(err.to_http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        Json(ErrorBody {
            error: err.to_string(),
        }),
    )
        .into_response()
}

fn unexpected(outcome: EventOutcome) -> Response {
    error!("Unexpected event outcome: {:?}", outcome);
    error_response(&WorkerError::Other("unexpected event outcome".to_string()))
}

/// Health check endpoint.
pub async fn handle_health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

/// Active worker status and bucket statistics.
pub async fn handle_status(State(state): State<Arc<AppState>>) -> Response {
    let Some(worker) = state.host.active().await else {
        return Json(json!({
            "active": null,
            "pendingEvents": state.host.pending_events(),
        }))
        .into_response();
    };

    match worker.status() {
        Ok(status) => Json(json!({
            "active": status,
            "waiting": state.host.waiting().await.map(|w| w.version().to_string()),
            "pendingEvents": state.host.pending_events(),
        }))
        .into_response(),
        Err(e) => error_response(&e),
    }
}

/// Deliver a push message; the raw body is the payload.
pub async fn handle_push(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    match state.host.dispatch(WorkerEvent::Push(PushMessage::from_bytes(body))).await {
        Ok(EventOutcome::NotificationShown(notification)) => Json(notification).into_response(),
        Ok(other) => unexpected(other),
        Err(e) => error_response(&e),
    }
}

/// Deliver a notification click.
pub async fn handle_notification_click(
    State(state): State<Arc<AppState>>,
    Json(click): Json<NotificationClick>,
) -> Response {
    match state.host.dispatch(WorkerEvent::NotificationClick(click)).await {
        Ok(EventOutcome::Clicked(outcome)) => Json(outcome).into_response(),
        Ok(other) => unexpected(other),
        Err(e) => error_response(&e),
    }
}

/// Body of `POST /__worker/sync`.
#[derive(Debug, Deserialize)]
pub struct SyncRequest {
    pub tag: String,
}

/// Deliver a background sync event.
pub async fn handle_sync(State(state): State<Arc<AppState>>, Json(request): Json<SyncRequest>) -> Response {
    match state.host.dispatch(WorkerEvent::Sync { tag: request.tag }).await {
        Ok(EventOutcome::Synced(outcome)) => Json(json!({ "outcome": outcome })).into_response(),
        Ok(other) => unexpected(other),
        Err(e) => error_response(&e),
    }
}

/// Promote the waiting worker, if one is parked.
pub async fn handle_activate_waiting(State(state): State<Arc<AppState>>) -> Response {
    match state.host.activate_waiting().await {
        Ok(report) => Json(json!({ "activated": report })).into_response(),
        Err(e) => error_response(&e),
    }
}

/// Notifications currently shown.
pub async fn handle_notifications(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.notifications.visible())
}

/// Open client windows.
pub async fn handle_list_clients(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.clients.snapshot())
}

/// Body of `POST /__worker/clients`.
#[derive(Debug, Deserialize)]
pub struct AttachClientRequest {
    pub url: Url,
}

/// Register an open client window.
pub async fn handle_attach_client(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AttachClientRequest>,
) -> impl IntoResponse {
    (StatusCode::CREATED, Json(state.clients.attach(request.url)))
}

/// Every non-control request: run it through the worker's fetch handler.
pub async fn handle_fetch(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = to_worker_request(&state.config.origin, method, &uri, &headers, body);
    debug!(
        "{} {} ({}, {:?})",
        request.method,
        request.url,
        request.mode.as_str(),
        request.destination
    );

    match state.host.dispatch(WorkerEvent::Fetch(request.clone())).await {
        Ok(EventOutcome::Fetched(FetchResult::Respond(handled))) => {
            to_http_response(handled.response, handled.source.as_str())
        }
        Ok(EventOutcome::Fetched(FetchResult::Passthrough)) => pass_through(&state, &request).await,
        Ok(other) => unexpected(other),
        Err(WorkerError::NoActiveWorker) => {
            warn!("No active worker, passing {} through", request.url);
            pass_through(&state, &request).await
        }
        Err(e) => {
            warn!("Fetch of {} failed: {}", request.url, e);
            error_response(&e)
        }
    }
}

async fn pass_through(state: &AppState, request: &WorkerRequest) -> Response {
    match state.fetcher.fetch(request).await {
        Ok(response) => to_http_response(response, "bypass"),
        Err(e) => error_response(&e),
    }
}

/// Build the worker's view of an incoming request.
///
/// The path and query are placed on the configured origin; the fetch mode
/// and destination come from `Sec-Fetch-*` headers, with `GET` requests
/// accepting HTML treated as navigations when the headers are absent.
pub fn to_worker_request(
    origin: &Url,
    method: Method,
    uri: &Uri,
    headers: &HeaderMap,
    body: Bytes,
) -> WorkerRequest {
    let mut url = origin.clone();
    url.set_path(uri.path());
    url.set_query(uri.query());

    let header_str = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    let accepts_html = header_str(header::ACCEPT.as_str())
        .map(|accept| accept.contains("text/html"))
        .unwrap_or(false);

    let mode = header_str("sec-fetch-mode")
        .and_then(RequestMode::parse)
        .unwrap_or(if method == Method::GET && accepts_html {
            RequestMode::Navigate
        } else {
            RequestMode::Cors
        });
    let destination = match header_str("sec-fetch-dest") {
        Some(dest) => RequestDestination::parse(dest),
        None if mode == RequestMode::Navigate => RequestDestination::Document,
        None => RequestDestination::Empty,
    };

    let forwarded = headers
        .iter()
        .filter(|(name, _)| !is_hop_by_hop(name.as_str()))
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

    WorkerRequest {
        method,
        url,
        mode,
        destination,
        headers: forwarded,
        body,
    }
}

/// Turn a worker response into an HTTP response tagged with its source.
pub fn to_http_response(response: WorkerResponse, source: &str) -> Response {
    let status = StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut builder = Response::builder().status(status);
    for (name, value) in &response.headers {
        if !is_hop_by_hop(name) {
            builder = builder.header(name.as_str(), value.as_str());
        }
    }

    builder
        .header(SOURCE_HEADER, source)
        .body(Body::from(response.body))
        .unwrap_or_else(|e| {
            error!("Invalid upstream response for {}: {}", response.url, e);
            error_response(&WorkerError::Network {
                message: format!("invalid upstream response: {}", e),
                cause: None,
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn origin() -> Url {
        Url::parse("https://portal.example/").unwrap()
    }

    #[test]
    fn test_navigation_from_accept_header() {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("text/html,application/xhtml+xml"));
        let uri: Uri = "/schedule?week=3".parse().unwrap();

        let request = to_worker_request(&origin(), Method::GET, &uri, &headers, Bytes::new());
        assert_eq!(request.url.as_str(), "https://portal.example/schedule?week=3");
        assert!(request.is_navigation());
        assert_eq!(request.destination, RequestDestination::Document);
    }

    #[test]
    fn test_sec_fetch_headers_win() {
        let mut headers = HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("text/html"));
        headers.insert("sec-fetch-mode", HeaderValue::from_static("no-cors"));
        headers.insert("sec-fetch-dest", HeaderValue::from_static("image"));
        let uri: Uri = "/logo.png".parse().unwrap();

        let request = to_worker_request(&origin(), Method::GET, &uri, &headers, Bytes::new());
        assert_eq!(request.mode, RequestMode::NoCors);
        assert_eq!(request.destination, RequestDestination::Image);
    }

    #[test]
    fn test_path_cannot_escape_origin() {
        let uri: Uri = "//evil.example/api/x".parse().unwrap();
        let request = to_worker_request(&origin(), Method::GET, &uri, &HeaderMap::new(), Bytes::new());
        assert_eq!(request.url.host_str(), Some("portal.example"));
    }

    #[test]
    fn test_hop_by_hop_headers_dropped() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("localhost:8080"));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer t"));
        let uri: Uri = "/api/me".parse().unwrap();

        let request = to_worker_request(&origin(), Method::GET, &uri, &headers, Bytes::new());
        assert_eq!(request.headers, vec![("authorization".to_string(), "Bearer t".to_string())]);
    }

    #[test]
    fn test_response_is_tagged() {
        let response = WorkerResponse::new("https://portal.example/", 200, "ok")
            .with_header("content-type", "text/html")
            .with_header("connection", "keep-alive");
        let http = to_http_response(response, "cache");

        assert_eq!(http.status(), StatusCode::OK);
        assert_eq!(http.headers().get(SOURCE_HEADER).unwrap(), "cache");
        assert!(http.headers().get("connection").is_none());
    }

    #[test]
    fn test_error_status_mapping() {
        let response = error_response(&WorkerError::Timeout(std::time::Duration::from_secs(1)));
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    }
}
