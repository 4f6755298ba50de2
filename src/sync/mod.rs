//! Draining the offline queue into the attendance API.

mod client;
mod drain;

pub use client::{AttendanceClient, AttendanceWrite, PunchSink};
pub use drain::{drain, DrainReport};
