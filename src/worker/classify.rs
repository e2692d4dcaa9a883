//! Request classification.

use crate::config::RoutesConfig;
use crate::request::{Request, RequestMode};

/// Which strategy handles a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
  StaticAsset,
  Api,
  ExternalResource,
  Navigation,
  Dynamic,
}

impl Category {
  pub fn as_str(&self) -> &'static str {
    match self {
      Category::StaticAsset => "static-asset",
      Category::Api => "api",
      Category::ExternalResource => "external-resource",
      Category::Navigation => "navigation",
      Category::Dynamic => "dynamic",
    }
  }
}

/// Route rules the classifier matches against.
#[derive(Debug, Clone)]
pub struct Classifier {
  routes: RoutesConfig,
}

impl Classifier {
  pub fn new(routes: RoutesConfig) -> Self {
    Self { routes }
  }

  /// Assign a request to exactly one category, or `None` when the worker
  /// must not intercept it (non-GET, non-http schemes).
  ///
  /// Rules are checked in priority order: static asset, api, external
  /// resource, navigation, and finally dynamic.
  pub fn classify(&self, request: &Request) -> Option<Category> {
    if !request.is_get() {
      return None;
    }
    if !matches!(request.url.scheme(), "http" | "https") {
      return None;
    }

    let path = request.url.path();

    if self.is_static_asset(path) {
      return Some(Category::StaticAsset);
    }

    if self
      .routes
      .api_prefixes
      .iter()
      .any(|prefix| path.starts_with(prefix.as_str()))
    {
      return Some(Category::Api);
    }

    if let Some(host) = request.url.host_str() {
      if self
        .routes
        .external_hosts
        .contains(&host.to_ascii_lowercase())
      {
        return Some(Category::ExternalResource);
      }
    }

    if request.mode == RequestMode::Navigate {
      return Some(Category::Navigation);
    }

    Some(Category::Dynamic)
  }

  fn is_static_asset(&self, path: &str) -> bool {
    self
      .routes
      .static_markers
      .iter()
      .any(|marker| path.contains(marker.as_str()))
      || self
        .routes
        .static_extensions
        .iter()
        .any(|ext| path.ends_with(ext.as_str()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test_support::url;

  fn classify(request: Request) -> Option<Category> {
    Classifier::new(RoutesConfig::default()).classify(&request)
  }

  fn get(s: &str) -> Request {
    Request::get(url(s))
  }

  #[test]
  fn test_non_get_is_not_intercepted() {
    let mut request = get("https://site.example/api/applications");
    request.method = "POST".to_string();
    assert_eq!(classify(request), None);
  }

  #[test]
  fn test_non_http_scheme_is_not_intercepted() {
    assert_eq!(classify(get("chrome-extension://abc/script.js")), None);
  }

  #[test]
  fn test_static_markers_and_extensions() {
    for s in [
      "https://site.example/_next/static/chunks/main.js",
      "https://site.example/static/logo.svg",
      "https://site.example/images/hero.png",
      "https://site.example/fonts/pretendard.otf",
      "https://site.example/styles/site.css",
      "https://site.example/bundle.js",
      "https://site.example/a.woff2",
      "https://site.example/a.woff",
    ] {
      assert_eq!(classify(get(s)), Some(Category::StaticAsset), "{}", s);
    }
  }

  #[test]
  fn test_extension_ignores_query_string() {
    assert_eq!(
      classify(get("https://site.example/page?file=x.css")),
      Some(Category::Dynamic)
    );
  }

  #[test]
  fn test_api_prefixes() {
    for s in [
      "https://site.example/api/auth/session",
      "https://site.example/api/applications",
      "https://site.example/api/fellows/3",
    ] {
      assert_eq!(classify(get(s)), Some(Category::Api), "{}", s);
    }
    assert_eq!(
      classify(get("https://site.example/api/health")),
      Some(Category::Dynamic)
    );
  }

  #[test]
  fn test_external_font_hosts() {
    assert_eq!(
      classify(get("https://fonts.googleapis.com/css2?family=Noto+Sans+KR")),
      Some(Category::ExternalResource)
    );
    // Static rules take priority over the host allow-list
    assert_eq!(
      classify(get("https://fonts.gstatic.com/s/noto/v1/a.woff2")),
      Some(Category::StaticAsset)
    );
  }

  #[test]
  fn test_navigation_and_dynamic() {
    assert_eq!(
      classify(Request::navigate(url("https://site.example/apply"))),
      Some(Category::Navigation)
    );
    assert_eq!(
      classify(get("https://site.example/apply")),
      Some(Category::Dynamic)
    );
  }

  #[test]
  fn test_api_wins_over_navigation() {
    assert_eq!(
      classify(Request::navigate(url("https://site.example/api/fellows"))),
      Some(Category::Api)
    );
  }
}
