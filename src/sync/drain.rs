use tracing::{info, warn};

use crate::queue::OfflineQueue;
use crate::store::KeyValueStore;

use super::client::PunchSink;

/// Outcome of one drain attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
  pub attempted: usize,
  pub synced: usize,
  pub failed: usize,
  /// Set when the attempt was skipped because the device looked offline
  pub skipped_offline: bool,
}

/// Push every queued punch to `sink` in queue order.
///
/// Each accepted punch is removed from the queue right away. Rejected punches stay
/// queued for the next drain and do not stop the remaining ones.
pub async fn drain<K, P>(queue: &OfflineQueue<K>, sink: &P) -> DrainReport
where
  K: KeyValueStore,
  P: PunchSink + ?Sized,
{
  if !queue.is_connected() {
    info!("offline, skipping drain");
    return DrainReport {
      skipped_offline: true,
      ..DrainReport::default()
    };
  }

  let mut report = DrainReport::default();
  for punch in queue.get_all() {
    report.attempted += 1;
    match sink.submit(&punch).await {
      Ok(()) => {
        queue.remove_by_id(punch.id());
        report.synced += 1;
      }
      Err(e) => {
        warn!(id = %punch.id(), error = %e, "punch sync failed, leaving queued");
        report.failed += 1;
      }
    }
  }

  info!(
    attempted = report.attempted,
    synced = report.synced,
    failed = report.failed,
    "drain finished"
  );
  report
}
