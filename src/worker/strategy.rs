//! One caching strategy per request category.
//!
//! Write-through only ever happens for status 200. Any other network
//! response is handed back unchanged and never cached.

use color_eyre::Result;

use crate::cache::{CacheStorage, Partition};
use crate::net::Fetcher;
use crate::request::{Request, Response};

use super::fallback;
use super::ServiceWorker;

impl<S: CacheStorage, F: Fetcher> ServiceWorker<S, F> {
  /// Static assets: serve from the static partition without touching the
  /// network; on a miss fetch and keep a copy. An uncached stylesheet that
  /// cannot be fetched becomes an empty stylesheet.
  pub(super) async fn cache_first(&self, request: &Request) -> Result<Response> {
    match self.cache_then_network(request).await {
      Err(e) if request.is_stylesheet() => {
        tracing::warn!(url = %request.url, "serving empty stylesheet: {}", e);
        Ok(fallback::empty_stylesheet())
      }
      result => result,
    }
  }

  /// External font resources. Same as [`Self::cache_first`] but without a
  /// synthetic fallback: the browser's own font fallback takes over.
  pub(super) async fn cache_first_external(&self, request: &Request) -> Result<Response> {
    self.cache_then_network(request).await
  }

  async fn cache_then_network(&self, request: &Request) -> Result<Response> {
    let key = request.key();
    if let Some(cached) = self.cache.lookup(Partition::Static, &key) {
      return Ok(cached);
    }

    let response = self.network.fetch(request).await?;
    if response.is_cacheable() {
      self.cache.store(Partition::Static, &key, &response);
    }
    Ok(response)
  }

  /// API calls: network first. Offline, a cached copy is marked
  /// `X-Served-By: sw-cache`; with no copy the caller gets a 503 JSON body.
  pub(super) async fn network_first_api(&self, request: &Request) -> Result<Response> {
    let key = request.key();
    match self.network.fetch(request).await {
      Ok(response) => {
        if response.is_cacheable() {
          self.cache.store(Partition::Dynamic, &key, &response);
        }
        Ok(response)
      }
      Err(e) => {
        tracing::info!(url = %request.url, "api request failed, trying cache: {}", e);
        Ok(match self.cache.lookup(Partition::Dynamic, &key) {
          Some(cached) => fallback::mark_cached(cached),
          None => fallback::offline_api(),
        })
      }
    }
  }

  /// Navigations: network first, then the cached page, then the pre-cached
  /// `/offline` document, then the inline offline page. Never fails.
  pub(super) async fn network_first_navigation(&self, request: &Request) -> Result<Response> {
    let key = request.key();
    match self.network.fetch(request).await {
      Ok(response) => {
        if response.is_cacheable() {
          self.cache.store(Partition::Dynamic, &key, &response);
        }
        Ok(response)
      }
      Err(e) => {
        tracing::info!(url = %request.url, "navigation failed, serving offline copy: {}", e);
        if let Some(cached) = self.cache.lookup(Partition::Dynamic, &key) {
          return Ok(cached);
        }

        let offline = match self.offline_document_key() {
          Ok(offline_key) => self.cache.lookup_any(&offline_key),
          Err(e) => {
            tracing::warn!("cannot resolve offline document: {}", e);
            None
          }
        };
        Ok(offline.unwrap_or_else(fallback::offline_page))
      }
    }
  }

  /// Everything else: network first with a size-bounded dynamic partition.
  /// Offline without a cached copy, the network error is returned.
  pub(super) async fn network_first_bounded(&self, request: &Request) -> Result<Response> {
    let key = request.key();
    match self.network.fetch(request).await {
      Ok(response) => {
        if response.is_cacheable() {
          self.cache.store(Partition::Dynamic, &key, &response);
          self.cache.trim(Partition::Dynamic, self.max_dynamic_entries);
        }
        Ok(response)
      }
      Err(e) => match self.cache.lookup(Partition::Dynamic, &key) {
        Some(cached) => Ok(cached),
        None => Err(e),
      },
    }
  }
}
