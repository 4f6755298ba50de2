use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Check-in or check-out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PunchType {
  PunchIn,
  PunchOut,
}

/// Latitude/longitude pair recorded with a punch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
  pub latitude: f64,
  pub longitude: f64,
}

/// A punch as handed to the queue by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PunchInput {
  /// Caller-supplied, unique per punch event
  pub id: String,
  pub worker_id: String,
  pub site_id: String,
  /// Stored as `YYYY-MM-DD`
  pub date: NaiveDate,
  #[serde(rename = "type")]
  pub punch_type: PunchType,

  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub punch_in_time: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub punch_out_time: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub punch_in_location: Option<GeoPoint>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub punch_out_location: Option<GeoPoint>,
  /// Data URL or remote URL
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub punch_in_photo: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub punch_out_photo: Option<String>,

  pub status: String,
  /// Whether the location was checked against the site geofence
  #[serde(default)]
  pub verified: bool,
}

impl PunchInput {
  /// Minimal punch with no optional fields set.
  pub fn new(
    id: impl Into<String>,
    worker_id: impl Into<String>,
    site_id: impl Into<String>,
    date: NaiveDate,
    punch_type: PunchType,
    status: impl Into<String>,
  ) -> Self {
    Self {
      id: id.into(),
      worker_id: worker_id.into(),
      site_id: site_id.into(),
      date,
      punch_type,
      punch_in_time: None,
      punch_out_time: None,
      punch_in_location: None,
      punch_out_location: None,
      punch_in_photo: None,
      punch_out_photo: None,
      status: status.into(),
      verified: false,
    }
  }

  /// Names of fields that belong to the other punch type but are set.
  pub fn foreign_fields(&self) -> Vec<&'static str> {
    let mut fields = Vec::new();
    match self.punch_type {
      PunchType::PunchIn => {
        if self.punch_out_time.is_some() {
          fields.push("punchOutTime");
        }
        if self.punch_out_location.is_some() {
          fields.push("punchOutLocation");
        }
        if self.punch_out_photo.is_some() {
          fields.push("punchOutPhoto");
        }
      }
      PunchType::PunchOut => {
        if self.punch_in_time.is_some() {
          fields.push("punchInTime");
        }
        if self.punch_in_location.is_some() {
          fields.push("punchInLocation");
        }
        if self.punch_in_photo.is_some() {
          fields.push("punchInPhoto");
        }
      }
    }
    fields
  }
}

/// A punch waiting in the offline queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedPunch {
  #[serde(flatten)]
  pub punch: PunchInput,
  /// When the punch was queued (epoch milliseconds)
  pub timestamp: i64,
}

impl QueuedPunch {
  pub fn id(&self) -> &str {
    &self.punch.id
  }
}
