//! The alert-to-task synchronization engine.

mod engine;
mod keyed;
pub mod occurrence;

pub use engine::SyncEngine;

use chrono::{DateTime, Utc};

/// Injectable time source so tests can freeze the occurrence timestamps
/// (re-merging is only idempotent under a frozen clock).
pub trait Clock: Send + Sync {
    fn now_utc(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
