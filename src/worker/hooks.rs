//! Background sync, push, notification clicks and page messages.

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::sync::atomic::Ordering;
use url::Url;

use crate::cache::CacheStorage;
use crate::net::Fetcher;

use super::ServiceWorker;

/// Sync tag registered by the application form for offline submissions.
pub const SYNC_APPLICATIONS: &str = "sync-applications";

const DEFAULT_TITLE: &str = "SNU Connectome";
const DEFAULT_BODY: &str = "새로운 알림이 있습니다. / You have a new notification.";
const NOTIFICATION_ICON: &str = "/icons/icon-192x192.png";

/// A notification to show for a push message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
  pub title: String,
  pub body: String,
  pub icon: String,
  pub badge: String,
  /// Page to open when the notification is clicked
  pub url: String,
}

#[derive(Debug, Default, Deserialize)]
struct PushPayload {
  title: Option<String>,
  body: Option<String>,
  url: Option<String>,
}

/// Messages a page can post to the worker.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerMessage {
  SkipWaiting,
  GetVersion,
  ClearCache,
}

/// Replies posted back to the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageReply {
  Ack,
  Version { version: String },
  CacheCleared { deleted: Vec<String> },
}

impl<S: CacheStorage, F: Fetcher> ServiceWorker<S, F> {
  /// Handle a background sync event. Returns whether the tag was recognized.
  pub fn sync(&self, tag: &str) -> bool {
    match tag {
      SYNC_APPLICATIONS => {
        // No submissions are queued while offline yet, so there is nothing to replay
        tracing::info!(tag, "background sync: no queued application submissions");
        true
      }
      _ => {
        tracing::debug!(tag, "ignoring unknown sync tag");
        false
      }
    }
  }

  /// Turn a push payload into a notification.
  ///
  /// JSON payloads may set `title`, `body` and `url`; any other text is used
  /// as the body.
  pub fn push(&self, payload: Option<&str>) -> Notification {
    let parsed = match payload.map(str::trim) {
      None | Some("") => PushPayload::default(),
      Some(text) => serde_json::from_str(text).unwrap_or_else(|_| PushPayload {
        body: Some(text.to_string()),
        ..PushPayload::default()
      }),
    };

    Notification {
      title: parsed.title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
      body: parsed.body.unwrap_or_else(|| DEFAULT_BODY.to_string()),
      icon: NOTIFICATION_ICON.to_string(),
      badge: NOTIFICATION_ICON.to_string(),
      url: parsed.url.unwrap_or_else(|| "/".to_string()),
    }
  }

  /// The page to focus or open for a clicked notification.
  pub fn notification_click(&self, notification: &Notification) -> Url {
    self.resolve(&notification.url).unwrap_or_else(|e| {
      tracing::warn!("bad notification url, opening home page: {}", e);
      self.origin().clone()
    })
  }

  /// Handle a message posted by a page.
  pub async fn message(&self, raw: &str) -> Result<MessageReply> {
    let message: WorkerMessage =
      serde_json::from_str(raw).map_err(|e| eyre!("Unrecognized message {}: {}", raw, e))?;

    tracing::debug!(?message, "worker message");
    match message {
      WorkerMessage::SkipWaiting => {
        self.skip_waiting.store(true, Ordering::SeqCst);
        Ok(MessageReply::Ack)
      }
      WorkerMessage::GetVersion => Ok(MessageReply::Version {
        version: self.partitions().version().to_string(),
      }),
      WorkerMessage::ClearCache => {
        let _gate = self.gate.write().await;
        let mut deleted = Vec::new();
        for name in self.partitions().current() {
          if self.storage().delete_partition(name)? {
            deleted.push(name.to_string());
          }
        }
        tracing::info!(?deleted, "cleared current partitions");
        Ok(MessageReply::CacheCleared { deleted })
      }
    }
  }
}
