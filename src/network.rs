//! Network reachability signal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Shortest interval the background probe will run at.
pub const MIN_PROBE_INTERVAL: Duration = Duration::from_millis(100);

/// Advisory "are we online" signal. Reads never suspend.
pub trait NetworkStatus: Send + Sync {
  fn is_online(&self) -> bool;
}

/// Fixed answer, for tests and forced offline mode.
#[derive(Debug, Clone, Copy)]
pub struct StaticStatus(pub bool);

impl StaticStatus {
  pub fn online() -> Self {
    Self(true)
  }

  pub fn offline() -> Self {
    Self(false)
  }
}

impl NetworkStatus for StaticStatus {
  fn is_online(&self) -> bool {
    self.0
  }
}

/// Reachability flag kept fresh by a background probe task.
///
/// The task connects to `addr` over TCP every `interval` and records whether the
/// connection succeeded within `timeout`. It is aborted when the monitor drops.
/// Intervals below [`MIN_PROBE_INTERVAL`] are raised to it.
pub struct ConnectivityMonitor {
  online: Arc<AtomicBool>,
  task: JoinHandle<()>,
}

impl ConnectivityMonitor {
  /// Probe once, then keep probing in the background.
  pub async fn start(addr: String, interval: Duration, timeout: Duration) -> Self {
    let online = Arc::new(AtomicBool::new(probe(&addr, timeout).await));
    info!(addr = %addr, online = online.load(Ordering::Relaxed), "connectivity monitor started");

    let interval = interval.max(MIN_PROBE_INTERVAL);
    let flag = Arc::clone(&online);
    let task = tokio::spawn(async move {
      let mut ticker = tokio::time::interval(interval);
      // First tick completes immediately; the initial probe already ran.
      ticker.tick().await;
      loop {
        ticker.tick().await;
        let now_online = probe(&addr, timeout).await;
        let was_online = flag.swap(now_online, Ordering::Relaxed);
        if was_online != now_online {
          info!(addr = %addr, online = now_online, "connectivity changed");
        }
      }
    });

    Self { online, task }
  }
}

impl NetworkStatus for ConnectivityMonitor {
  fn is_online(&self) -> bool {
    self.online.load(Ordering::Relaxed)
  }
}

impl Drop for ConnectivityMonitor {
  fn drop(&mut self) {
    self.task.abort();
  }
}

/// Whether a TCP connection to `addr` can be opened within `timeout`.
pub async fn probe(addr: &str, timeout: Duration) -> bool {
  match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
    Ok(Ok(_)) => true,
    Ok(Err(e)) => {
      debug!(addr = %addr, error = %e, "probe failed");
      false
    }
    Err(_) => {
      debug!(addr = %addr, "probe timed out");
      false
    }
  }
}
