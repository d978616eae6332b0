//! Cache entry state and staleness metadata.

use chrono::Utc;
use std::time::Duration;
use vitrine_core::{Fingerprint, NetworkError, Timestamp};

/// Payload stored per cache entry. Typed stores decode at their boundary.
pub type Payload = serde_json::Value;

/// Lifecycle state of one cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Never loaded, nothing cached.
    Absent,
    /// A request is in flight for this fingerprint.
    Loading,
    /// Payload present and authoritative as of `last_updated_at`.
    Ready,
    /// The most recent load failed. A previously good payload, if any,
    /// remains present and visible.
    Error,
}

/// One fingerprint's cached state.
///
/// Snapshots of this struct are what the mutation coordinator rolls back
/// to, so it is `Clone + PartialEq` in full: a rollback restores every
/// field exactly.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub fingerprint: Fingerprint,
    pub payload: Option<Payload>,
    pub status: CacheStatus,
    pub error: Option<NetworkError>,
    pub last_updated_at: Timestamp,
    pub stale_after: Duration,
    /// Set by `invalidate`; cleared by the next successful write.
    pub invalidated: bool,
}

impl CacheEntry {
    /// An entry that has never been loaded.
    pub fn absent(fingerprint: Fingerprint, stale_after: Duration) -> Self {
        Self {
            fingerprint,
            payload: None,
            status: CacheStatus::Absent,
            error: None,
            last_updated_at: Utc::now(),
            stale_after,
            invalidated: false,
        }
    }

    /// How long since this entry was last written.
    pub fn staleness(&self) -> Duration {
        let now = Utc::now();
        if now > self.last_updated_at {
            (now - self.last_updated_at).to_std().unwrap_or(Duration::ZERO)
        } else {
            Duration::ZERO
        }
    }

    /// Ready, not invalidated, and within its staleness window.
    pub fn is_fresh(&self) -> bool {
        self.status == CacheStatus::Ready
            && !self.invalidated
            && self.staleness() <= self.stale_after
    }

    /// Has a payload that can be served while a refetch runs.
    pub fn is_stale_but_present(&self) -> bool {
        self.payload.is_some() && !self.is_fresh()
    }
}
