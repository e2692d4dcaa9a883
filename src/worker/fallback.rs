//! Responses built locally when neither network nor cache can answer.

use serde_json::json;

use crate::request::Response;

pub const SERVED_BY: &str = "X-Served-By";
pub const SERVED_BY_CACHE: &str = "sw-cache";
pub const SERVED_BY_OFFLINE: &str = "sw-offline";

/// 503 JSON body for API calls that have never been cached.
pub fn offline_api() -> Response {
  let body = json!({
    "error": "Offline",
    "message": "This feature is not available offline",
  });

  Response::new(503, body.to_string())
    .with_header("Content-Type", "application/json")
    .with_header(SERVED_BY, SERVED_BY_OFFLINE)
}

/// Empty but valid stylesheet, so an uncached CSS file does not block rendering.
pub fn empty_stylesheet() -> Response {
  Response::new(200, "").with_header("Content-Type", "text/css; charset=utf-8")
}

/// Self-contained bilingual offline page with a retry button.
pub fn offline_page() -> Response {
  Response::new(200, OFFLINE_HTML).with_header("Content-Type", "text/html; charset=utf-8")
}

/// Mark a cached response as served from the cache.
pub fn mark_cached(mut response: Response) -> Response {
  response.set_header(SERVED_BY, SERVED_BY_CACHE);
  response
}

const OFFLINE_HTML: &str = r#"<!DOCTYPE html>
<html lang="ko">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>오프라인 | Offline - SNU Connectome</title>
  <style>
    body {
      margin: 0;
      min-height: 100vh;
      display: flex;
      align-items: center;
      justify-content: center;
      font-family: -apple-system, BlinkMacSystemFont, "Apple SD Gothic Neo", "Noto Sans KR", sans-serif;
      background: #0f172a;
      color: #e2e8f0;
      text-align: center;
    }
    .card { max-width: 28rem; padding: 2rem; }
    h1 { font-size: 1.5rem; margin: 0 0 0.5rem; }
    h2 { font-size: 1.1rem; font-weight: 400; margin: 0 0 1.5rem; color: #94a3b8; }
    p { line-height: 1.6; color: #cbd5e1; }
    button {
      margin-top: 1.5rem;
      padding: 0.75rem 1.5rem;
      border: 0;
      border-radius: 0.5rem;
      background: #3b82f6;
      color: #fff;
      font-size: 1rem;
      cursor: pointer;
    }
  </style>
</head>
<body>
  <div class="card">
    <h1>오프라인 상태입니다</h1>
    <h2>You're offline</h2>
    <p>인터넷 연결을 확인한 후 다시 시도해 주세요.<br>
       Check your internet connection and try again.</p>
    <button type="button" onclick="window.location.reload()">다시 시도 / Retry</button>
  </div>
</body>
</html>
"#;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_offline_api_shape() {
    let response = offline_api();
    assert_eq!(response.status, 503);
    assert_eq!(response.header("x-served-by"), Some("sw-offline"));

    let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(body["error"], "Offline");
    assert_eq!(body["message"], "This feature is not available offline");
  }

  #[test]
  fn test_offline_page_is_bilingual() {
    let response = offline_page();
    let html = String::from_utf8(response.body).unwrap();

    assert_eq!(response.status, 200);
    assert!(html.contains("오프라인"));
    assert!(html.contains("You're offline"));
    assert!(html.contains("<button"));
  }

  #[test]
  fn test_mark_cached_replaces_existing_marker() {
    let response = mark_cached(Response::new(200, "x").with_header("x-served-by", "origin"));
    assert_eq!(response.header(SERVED_BY), Some(SERVED_BY_CACHE));
    assert_eq!(response.headers.len(), 1);
  }
}
