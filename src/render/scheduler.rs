//! Frame request coalescing.
//!
//! Reconciliations and load completions both ask for a redraw, often many
//! times between two display refreshes. The scheduler collapses them into a
//! single pending frame with an explicit flag: the first request sets it and
//! wakes the frame loop, later requests see it already set, and firing the
//! frame clears it.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::Notify;

/// Tracks whether a frame is pending and wakes whoever drives frames.
#[derive(Debug, Default)]
pub struct RenderScheduler {
    pending: AtomicBool,
    wake: Notify,
    requested: AtomicU64,
    fired: AtomicU64,
}

impl RenderScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask for a frame on the next display refresh.
    ///
    /// Returns `true` if this call scheduled a new frame, `false` if one was
    /// already pending.
    pub fn request_frame(&self) -> bool {
        let newly_pending = !self.pending.swap(true, Ordering::AcqRel);
        if newly_pending {
            self.requested.fetch_add(1, Ordering::Relaxed);
            self.wake.notify_one();
        }
        newly_pending
    }

    /// Claim the pending frame at fire time.
    ///
    /// Returns `true` if a frame was pending; the flag is cleared so the
    /// next request schedules a new frame.
    pub fn take_frame(&self) -> bool {
        let was_pending = self.pending.swap(false, Ordering::AcqRel);
        if was_pending {
            self.fired.fetch_add(1, Ordering::Relaxed);
        }
        was_pending
    }

    /// Whether a frame is waiting to fire.
    pub fn is_frame_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Wait until a frame is pending.
    ///
    /// Cancel-safe: a request made while nobody is waiting leaves a permit
    /// behind, so the wakeup is never lost.
    pub async fn wait_for_request(&self) {
        while !self.is_frame_pending() {
            self.wake.notified().await;
        }
    }

    /// Number of distinct frames scheduled so far.
    pub fn frames_requested(&self) -> u64 {
        self.requested.load(Ordering::Relaxed)
    }

    /// Number of frames fired so far.
    pub fn frames_fired(&self) -> u64 {
        self.fired.load(Ordering::Relaxed)
    }
}
