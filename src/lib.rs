// ABOUTME: Receiver-side clock sync, protocol state machine, and audio scheduler for a Sendspin player
// ABOUTME: sync::TimeFilter, protocol::client::ProtocolEngine, and scheduler::Scheduler are the three core components

pub mod audio;
pub mod config;
pub mod error;
pub mod protocol;
pub mod scheduler;
pub mod session;
pub mod state;
pub mod sync;

pub use config::Config;
pub use error::{Error, Result};
pub use session::Session;

/// Current wall-clock time in microseconds, the local-clock unit every
/// timestamp in this crate is expressed in (`T1`/`T4` of the NTP exchange,
/// scheduler deadlines, decoded-frame stamps).
pub fn now_us() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the Unix epoch")
        .as_micros() as i64
}
