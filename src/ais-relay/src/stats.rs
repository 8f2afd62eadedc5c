use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::normalizer::Rejection;

/// Process wide counters, shared by every session and the supervisor.
#[derive(Debug, Default)]
pub struct RelayStats {
    received: AtomicU64,
    decode_errors: AtomicU64,
    forwarded: AtomicU64,
    filtered: AtomicU64,
    unsupported: AtomicU64,
    missing_identity: AtomicU64,
    invalid_position: AtomicU64,
    malformed: AtomicU64,
    upstream_connects: AtomicU64,
    upstream_failures: AtomicU64,
    active_sessions: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub received: u64,
    pub decode_errors: u64,
    pub forwarded: u64,
    pub rejected: RejectionCounts,
    pub upstream_connects: u64,
    pub upstream_failures: u64,
    pub active_sessions: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectionCounts {
    pub filtered: u64,
    pub unsupported: u64,
    pub missing_identity: u64,
    pub invalid_position: u64,
    pub malformed: u64,
}

impl RelayStats {
    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_forwarded(&self) {
        self.forwarded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejection(&self, rejection: Rejection) {
        self.rejection_counter(rejection).fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_upstream_connect(&self) {
        self.upstream_connects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_upstream_failure(&self) {
        self.upstream_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_opened(&self) {
        self.active_sessions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_closed(&self) {
        // Saturating, a close without a matching open must not wrap around.
        let _ = self
            .active_sessions
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(1));
    }

    pub fn rejections(&self, rejection: Rejection) -> u64 {
        self.rejection_counter(rejection).load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            forwarded: self.forwarded.load(Ordering::Relaxed),
            rejected: RejectionCounts {
                filtered: self.rejections(Rejection::Filtered),
                unsupported: self.rejections(Rejection::Unsupported),
                missing_identity: self.rejections(Rejection::MissingIdentity),
                invalid_position: self.rejections(Rejection::InvalidPosition),
                malformed: self.rejections(Rejection::Malformed),
            },
            upstream_connects: self.upstream_connects.load(Ordering::Relaxed),
            upstream_failures: self.upstream_failures.load(Ordering::Relaxed),
            active_sessions: self.active_sessions.load(Ordering::Relaxed),
        }
    }

    fn rejection_counter(&self, rejection: Rejection) -> &AtomicU64 {
        match rejection {
            Rejection::Filtered => &self.filtered,
            Rejection::Unsupported => &self.unsupported,
            Rejection::MissingIdentity => &self.missing_identity,
            Rejection::InvalidPosition => &self.invalid_position,
            Rejection::Malformed => &self.malformed,
        }
    }
}
