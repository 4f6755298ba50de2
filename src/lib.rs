//! Local durability for construction-site attendance.
//!
//! Two independent stores run on the device:
//! - [`queue::OfflineQueue`]: ordered punches waiting for the server
//! - [`images::ImageCache`]: worker photos kept for a freshness window
//!
//! [`sync::drain`] pushes the queue to the attendance API when the device is
//! online.

pub mod clock;
pub mod config;
pub mod error;
pub mod images;
pub mod logging;
pub mod network;
pub mod queue;
pub mod store;
pub mod sync;
