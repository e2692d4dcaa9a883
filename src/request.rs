//! Request and response values that flow through the worker.
//!
//! The proxy converts HTTP traffic into these, and cache storage persists
//! responses as-is.

use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// How the request was issued by the page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RequestMode {
  /// Top-level document navigation
  Navigate,
  #[default]
  SameOrigin,
  NoCors,
  Cors,
}

/// What the page intends to do with the response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Destination {
  Document,
  Style,
  Script,
  Font,
  Image,
  #[default]
  Empty,
  Other,
}

impl Destination {
  /// Parse a `Sec-Fetch-Dest` header value.
  pub fn from_fetch_dest(value: &str) -> Self {
    match value.trim().to_ascii_lowercase().as_str() {
      "document" | "iframe" | "frame" => Destination::Document,
      "style" => Destination::Style,
      "script" | "worker" | "sharedworker" => Destination::Script,
      "font" => Destination::Font,
      "image" => Destination::Image,
      "" | "empty" => Destination::Empty,
      _ => Destination::Other,
    }
  }
}

/// An outgoing request, as seen by the worker.
#[derive(Debug, Clone)]
pub struct Request {
  pub method: String,
  pub url: Url,
  pub mode: RequestMode,
  pub destination: Destination,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl Request {
  /// A plain GET request with default mode and destination.
  pub fn get(url: Url) -> Self {
    Self {
      method: "GET".to_string(),
      url,
      mode: RequestMode::default(),
      destination: Destination::default(),
      headers: Vec::new(),
      body: Vec::new(),
    }
  }

  /// A top-level navigation to `url`.
  pub fn navigate(url: Url) -> Self {
    Self {
      mode: RequestMode::Navigate,
      destination: Destination::Document,
      ..Self::get(url)
    }
  }

  pub fn with_destination(mut self, destination: Destination) -> Self {
    self.destination = destination;
    self
  }

  pub fn is_get(&self) -> bool {
    self.method.eq_ignore_ascii_case("GET")
  }

  /// Whether the page asked for this as a stylesheet.
  pub fn is_stylesheet(&self) -> bool {
    self.destination == Destination::Style || self.url.path().ends_with(".css")
  }

  /// Identity used to key cache entries.
  pub fn key(&self) -> RequestKey {
    RequestKey::new(&self.method, &self.url)
  }
}

/// Cache identity of a request: method plus URL without its fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestKey {
  pub method: String,
  pub url: String,
}

impl RequestKey {
  pub fn new(method: &str, url: &Url) -> Self {
    let mut url = url.clone();
    url.set_fragment(None);

    Self {
      method: method.to_ascii_uppercase(),
      url: url.to_string(),
    }
  }
}

impl fmt::Display for RequestKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} {}", self.method, self.url)
  }
}

/// A response snapshot: status, headers and the full body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl Response {
  pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
    Self {
      status,
      headers: Vec::new(),
      body: body.into(),
    }
  }

  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self.set_header(name, value);
    self
  }

  /// Replace any existing header of the same name (case-insensitive).
  pub fn set_header(&mut self, name: &str, value: &str) {
    self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    self.headers.push((name.to_string(), value.to_string()));
  }

  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(n, _)| n.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }

  /// Only exact 200 responses are ever written through to a partition.
  pub fn is_cacheable(&self) -> bool {
    self.status == 200
  }
}
