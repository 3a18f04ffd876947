use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing session activity.
#[derive(Default)]
pub struct SessionMetrics {
    uploads_accepted: AtomicU64,
    uploads_rejected: AtomicU64,
    processing_completed: AtomicU64,
    queries_answered: AtomicU64,
    backend_failures: AtomicU64,
    credential_rejections: AtomicU64,
    stale_replies_dropped: AtomicU64,
    resets: AtomicU64,
}

impl SessionMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of an upload validation.
    pub fn record_upload(&self, accepted: bool) {
        let counter = if accepted {
            &self.uploads_accepted
        } else {
            &self.uploads_rejected
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a processing sequence that reached the chat state.
    pub fn record_processing_completed(&self) {
        self.processing_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a finished backend round trip; `failed` marks replies synthesized from an error.
    pub fn record_query(&self, failed: bool) {
        self.queries_answered.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.backend_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a query refused because no credential was configured.
    pub fn record_credential_rejection(&self) {
        self.credential_rejections.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a reply that arrived after the session it belonged to was reset.
    pub fn record_stale_reply(&self) {
        self.stale_replies_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a session reset.
    pub fn record_reset(&self) {
        self.resets.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uploads_accepted: self.uploads_accepted.load(Ordering::Relaxed),
            uploads_rejected: self.uploads_rejected.load(Ordering::Relaxed),
            processing_completed: self.processing_completed.load(Ordering::Relaxed),
            queries_answered: self.queries_answered.load(Ordering::Relaxed),
            backend_failures: self.backend_failures.load(Ordering::Relaxed),
            credential_rejections: self.credential_rejections.load(Ordering::Relaxed),
            stale_replies_dropped: self.stale_replies_dropped.load(Ordering::Relaxed),
            resets: self.resets.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of session counters used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    /// Uploads that passed validation.
    pub uploads_accepted: u64,
    /// Uploads rejected for type or size.
    pub uploads_rejected: u64,
    /// Processing sequences that reached the chat state.
    pub processing_completed: u64,
    /// Backend round trips that produced a transcript entry.
    pub queries_answered: u64,
    /// Round trips whose reply was synthesized from a backend failure.
    pub backend_failures: u64,
    /// Queries short-circuited by a missing credential.
    pub credential_rejections: u64,
    /// Replies discarded because the session was reset while they were pending.
    pub stale_replies_dropped: u64,
    /// Session resets.
    pub resets: u64,
}
