//! Origin health reports, reused for a fixed time-to-live.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::request::Response;

/// Result of probing the origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
  pub status: HealthStatus,
  /// HTTP status of the probe, if the origin answered at all
  pub origin_status: Option<u16>,
  pub checked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
  /// Origin answered with a success status
  Healthy,
  /// Origin answered, but with an error status
  Degraded,
  /// Origin unreachable; requests are being served offline
  Offline,
}

impl HealthReport {
  /// Build a report from a probe response, `None` if the origin was unreachable.
  pub fn from_probe(probe: Option<&Response>, checked_at: DateTime<Utc>) -> Self {
    let (status, origin_status) = match probe {
      Some(response) if (200..400).contains(&response.status) => {
        (HealthStatus::Healthy, Some(response.status))
      }
      Some(response) => (HealthStatus::Degraded, Some(response.status)),
      None => (HealthStatus::Offline, None),
    };

    Self {
      status,
      origin_status,
      checked_at,
    }
  }
}

/// The last health report and when it stops being reusable.
///
/// The proxy owns one of these; callers pass `now` explicitly so freshness
/// is decided by the caller's clock.
#[derive(Debug)]
pub struct HealthCheckCache {
  ttl: Duration,
  last: Option<HealthReport>,
}

impl HealthCheckCache {
  pub fn new(ttl: Duration) -> Self {
    Self { ttl, last: None }
  }

  /// The cached report, if it is younger than the TTL at `now`.
  pub fn fresh(&self, now: DateTime<Utc>) -> Option<&HealthReport> {
    self
      .last
      .as_ref()
      .filter(|report| now - report.checked_at < self.ttl)
  }

  pub fn store(&mut self, report: HealthReport) {
    self.last = Some(report);
  }
}
