use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use url::Url;

use crate::error::SyncError;
use crate::queue::{GeoPoint, PunchType, QueuedPunch};

/// Destination for queued punches.
#[async_trait]
pub trait PunchSink: Send + Sync {
  async fn submit(&self, punch: &QueuedPunch) -> Result<(), SyncError>;
}

/// Body of an attendance write.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceWrite<'a> {
  pub worker_id: &'a str,
  pub date: NaiveDate,
  pub status: &'a str,
  pub site_id: &'a str,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub check_in_time: Option<&'a str>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub check_out_time: Option<&'a str>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub location: Option<GeoPoint>,
  pub verified: bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub photo: Option<&'a str>,
}

impl<'a> From<&'a QueuedPunch> for AttendanceWrite<'a> {
  fn from(queued: &'a QueuedPunch) -> Self {
    let p = &queued.punch;
    let (check_in_time, check_out_time, location, photo) = match p.punch_type {
      PunchType::PunchIn => (
        p.punch_in_time.as_deref(),
        None,
        p.punch_in_location,
        p.punch_in_photo.as_deref(),
      ),
      PunchType::PunchOut => (
        None,
        p.punch_out_time.as_deref(),
        p.punch_out_location,
        p.punch_out_photo.as_deref(),
      ),
    };

    Self {
      worker_id: &p.worker_id,
      date: p.date,
      status: &p.status,
      site_id: &p.site_id,
      check_in_time,
      check_out_time,
      location,
      verified: p.verified,
      photo,
    }
  }
}

/// Attendance API client
#[derive(Clone)]
pub struct AttendanceClient {
  client: reqwest::Client,
  endpoint: Url,
  token: Option<String>,
}

impl AttendanceClient {
  pub fn new(base_url: &str, token: Option<String>) -> Result<Self, SyncError> {
    Ok(Self {
      client: reqwest::Client::new(),
      endpoint: attendance_endpoint(base_url)?,
      token,
    })
  }

  pub fn endpoint(&self) -> &Url {
    &self.endpoint
  }
}

#[async_trait]
impl PunchSink for AttendanceClient {
  async fn submit(&self, punch: &QueuedPunch) -> Result<(), SyncError> {
    let mut request = self
      .client
      .post(self.endpoint.clone())
      .json(&AttendanceWrite::from(punch));
    if let Some(token) = &self.token {
      request = request.bearer_auth(token);
    }

    let response = request.send().await?;
    let status = response.status();
    if status.is_success() {
      return Ok(());
    }

    let body = response.text().await.unwrap_or_default();
    Err(SyncError::Rejected {
      status: status.as_u16(),
      body,
    })
  }
}

/// `{base_url}/attendance`, tolerating a base with or without a trailing slash.
fn attendance_endpoint(base_url: &str) -> Result<Url, SyncError> {
  let mut base = base_url.trim().to_string();
  if !base.ends_with('/') {
    base.push('/');
  }
  Ok(Url::parse(&base)?.join("attendance")?)
}
