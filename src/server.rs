//! Local reverse proxy that puts the worker in front of the origin.
//!
//! Every incoming request is rewritten against the configured origin and
//! handed to the worker, exactly as a page's request would be intercepted.

use axum::body::{to_bytes, Body};
use axum::extract::{Request as HttpRequest, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response as HttpResponse};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::Mutex;
use url::Url;

use crate::cache::CacheStorage;
use crate::health::{HealthCheckCache, HealthReport};
use crate::net::{is_hop_by_hop, Fetcher};
use crate::request::{Destination, Request, RequestMode, Response};
use crate::worker::{ServiceWorker, WorkerStatus};

/// Largest request body forwarded to the origin.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

pub const HEALTH_PATH: &str = "/__offline/health";

/// Shared state of the proxy.
pub struct AppState<S: CacheStorage, F: Fetcher> {
  worker: ServiceWorker<S, F>,
  health: Mutex<HealthCheckCache>,
}

impl<S: CacheStorage, F: Fetcher> AppState<S, F> {
  pub fn new(worker: ServiceWorker<S, F>, health: HealthCheckCache) -> Self {
    Self {
      worker,
      health: Mutex::new(health),
    }
  }
}

pub fn create_app<S, F>(state: Arc<AppState<S, F>>) -> Router
where
  S: CacheStorage + 'static,
  F: Fetcher + 'static,
{
  Router::new()
    .route(HEALTH_PATH, get(healthcheck::<S, F>))
    .fallback(intercept::<S, F>)
    .with_state(state)
}

/// Serve until the process is stopped.
pub async fn run<S, F>(listen: &str, state: Arc<AppState<S, F>>) -> Result<()>
where
  S: CacheStorage + 'static,
  F: Fetcher + 'static,
{
  let addr: SocketAddr = listen
    .parse()
    .map_err(|e| eyre!("Invalid listen address {}: {}", listen, e))?;
  let listener = tokio::net::TcpListener::bind(addr)
    .await
    .map_err(|e| eyre!("Failed to bind {}: {}", addr, e))?;

  tracing::info!("Starting HTTP server on {}", addr);
  axum::serve(listener, create_app(state))
    .await
    .map_err(|e| eyre!("Server error: {}", e))
}

async fn intercept<S, F>(State(state): State<Arc<AppState<S, F>>>, request: HttpRequest) -> HttpResponse
where
  S: CacheStorage + 'static,
  F: Fetcher + 'static,
{
  let request = match to_worker_request(state.worker.origin(), request).await {
    Ok(request) => request,
    Err(e) => return (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
  };

  match state.worker.handle_fetch(&request).await {
    Ok(response) => into_http_response(response),
    Err(e) => {
      tracing::warn!(url = %request.url, "request failed: {}", e);
      (StatusCode::BAD_GATEWAY, format!("Upstream unavailable: {}", e)).into_response()
    }
  }
}

#[derive(Debug, Serialize)]
struct HealthBody {
  #[serde(flatten)]
  report: HealthReport,
  worker: Option<WorkerStatus>,
}

async fn healthcheck<S, F>(State(state): State<Arc<AppState<S, F>>>) -> Json<HealthBody>
where
  S: CacheStorage + 'static,
  F: Fetcher + 'static,
{
  let now = Utc::now();
  // Held across the probe so concurrent checks share one request
  let mut health = state.health.lock().await;

  let report = match health.fresh(now) {
    Some(report) => report.clone(),
    None => {
      let probe = state.worker.probe_origin().await;
      if let Err(e) = &probe {
        tracing::debug!("origin probe failed: {}", e);
      }
      let report = HealthReport::from_probe(probe.as_ref().ok(), now);
      health.store(report.clone());
      report
    }
  };

  Json(HealthBody {
    report,
    worker: state.worker.status().ok(),
  })
}

/// Infer the request mode the way a browser would have set it.
fn request_mode(method: &Method, headers: &HeaderMap) -> RequestMode {
  let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

  match header("sec-fetch-mode") {
    Some("navigate") => RequestMode::Navigate,
    Some("cors") => RequestMode::Cors,
    Some("no-cors") => RequestMode::NoCors,
    Some(_) => RequestMode::SameOrigin,
    // Clients without fetch metadata: a GET asking for HTML is a page load
    None if *method == Method::GET
      && header("accept").is_some_and(|accept| accept.contains("text/html")) =>
    {
      RequestMode::Navigate
    }
    None => RequestMode::SameOrigin,
  }
}

async fn to_worker_request(origin: &Url, request: HttpRequest) -> Result<Request> {
  let (parts, body) = request.into_parts();

  // Only path and query are taken from the client, the origin stays fixed
  let mut url = origin.clone();
  url.set_path(parts.uri.path());
  url.set_query(parts.uri.query());

  let mode = request_mode(&parts.method, &parts.headers);
  let destination = parts
    .headers
    .get("sec-fetch-dest")
    .and_then(|v| v.to_str().ok())
    .map(Destination::from_fetch_dest)
    .unwrap_or_default();
  let headers = parts
    .headers
    .iter()
    .filter_map(|(name, value)| {
      value
        .to_str()
        .ok()
        .map(|v| (name.as_str().to_string(), v.to_string()))
    })
    .collect();
  let body = to_bytes(body, MAX_BODY_BYTES)
    .await
    .map_err(|e| eyre!("Failed to read request body: {}", e))?
    .to_vec();

  Ok(Request {
    method: parts.method.to_string(),
    url,
    mode,
    destination,
    headers,
    body,
  })
}

fn into_http_response(response: Response) -> HttpResponse {
  let mut builder = axum::http::Response::builder().status(response.status);
  for (name, value) in &response.headers {
    if !is_hop_by_hop(name) {
      builder = builder.header(name.as_str(), value.as_str());
    }
  }

  builder.body(Body::from(response.body)).unwrap_or_else(|e| {
    tracing::error!("Failed to build response: {}", e);
    StatusCode::INTERNAL_SERVER_ERROR.into_response()
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStorage;
  use crate::test_support::ScriptedNetwork;
  use crate::worker::tests::{test_worker, ORIGIN};
  use tower::ServiceExt;

  fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (name, value) in pairs {
      map.insert(*name, value.parse().unwrap());
    }
    map
  }

  #[test]
  fn test_request_mode_from_fetch_metadata() {
    assert_eq!(
      request_mode(&Method::GET, &headers(&[("sec-fetch-mode", "navigate")])),
      RequestMode::Navigate
    );
    assert_eq!(
      request_mode(&Method::GET, &headers(&[("sec-fetch-mode", "cors")])),
      RequestMode::Cors
    );
    // Fetch metadata wins over Accept
    assert_eq!(
      request_mode(
        &Method::GET,
        &headers(&[("sec-fetch-mode", "same-origin"), ("accept", "text/html")])
      ),
      RequestMode::SameOrigin
    );
  }

  #[test]
  fn test_request_mode_falls_back_to_accept() {
    assert_eq!(
      request_mode(&Method::GET, &headers(&[("accept", "text/html,application/xhtml+xml")])),
      RequestMode::Navigate
    );
    assert_eq!(
      request_mode(&Method::POST, &headers(&[("accept", "text/html")])),
      RequestMode::SameOrigin
    );
    assert_eq!(request_mode(&Method::GET, &HeaderMap::new()), RequestMode::SameOrigin);
  }

  #[tokio::test]
  async fn test_request_is_rewritten_against_origin() {
    let origin = Url::parse("https://site.example").unwrap();
    let request = axum::http::Request::builder()
      .method("GET")
      .uri("/fonts/a.woff2?v=2")
      .header("sec-fetch-dest", "font")
      .body(Body::empty())
      .unwrap();

    let converted = to_worker_request(&origin, request).await.unwrap();

    assert_eq!(converted.url.host_str(), Some("site.example"));
    assert_eq!(converted.url.query(), Some("v=2"));
    assert_eq!(converted.destination, Destination::Font);
    assert!(converted.body.is_empty());
  }

  #[tokio::test]
  async fn test_response_conversion_drops_hop_by_hop_headers() {
    let response = Response::new(503, "offline")
      .with_header("Content-Type", "application/json")
      .with_header("Transfer-Encoding", "chunked");

    let http = into_http_response(response);

    assert_eq!(http.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(http.headers().get("content-type").unwrap(), "application/json");
    assert!(http.headers().get("transfer-encoding").is_none());

    let body = to_bytes(http.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"offline");
  }

  fn proxy() -> (Arc<AppState<MemoryStorage, Arc<ScriptedNetwork>>>, Arc<ScriptedNetwork>) {
    let (worker, network) = test_worker();
    let health = HealthCheckCache::new(chrono::Duration::seconds(30));
    (Arc::new(AppState::new(worker, health)), network)
  }

  fn get_request(uri: &str) -> HttpRequest {
    axum::http::Request::builder()
      .method("GET")
      .uri(uri)
      .body(Body::empty())
      .unwrap()
  }

  #[tokio::test]
  async fn test_failed_fetch_without_fallback_is_bad_gateway() {
    let (state, network) = proxy();
    network.set_offline(true);

    let response = create_app(state)
      .oneshot(get_request("/static/app.js"))
      .await
      .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
  }

  #[tokio::test]
  async fn test_offline_api_passes_through_as_503() {
    let (state, network) = proxy();
    network.set_offline(true);

    let response = create_app(state)
      .oneshot(get_request("/api/fellows"))
      .await
      .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.headers().get("x-served-by").unwrap(), "sw-offline");
  }

  #[tokio::test]
  async fn test_health_report_is_reused_within_ttl() {
    let (state, network) = proxy();
    network.respond(&format!("{}/", ORIGIN), Response::new(200, "home"));

    let app = create_app(state);
    let first = app.clone().oneshot(get_request(HEALTH_PATH)).await.unwrap();
    let second = app.oneshot(get_request(HEALTH_PATH)).await.unwrap();

    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(network.calls(), 1);

    let body = to_bytes(second.into_body(), usize::MAX).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["origin_status"], 200);
    assert_eq!(body["worker"]["state"], "parsed");
  }
}
