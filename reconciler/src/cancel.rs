//! Cooperative cancellation
//!
//! A cloneable token shared between the pipeline, discovery, and executor.
//! Every wait in the core races against `cancelled()`; nothing polls the flag
//! in a busy loop. The token records why it fired so the exit-code contract
//! can distinguish a user abort from a deadline.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Why a token was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    /// External signal (user interrupt, approval denied).
    User,
    /// The top-level reconciliation deadline elapsed.
    Deadline,
}

impl std::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CancelReason::User => write!(f, "user cancelled"),
            CancelReason::Deadline => write!(f, "deadline exceeded"),
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    // 0 = unset, 1 = user, 2 = deadline. First writer wins.
    reason: AtomicU8,
    notify: Notify,
}

/// Token for cooperative cancellation. Clone is cheap and shares state.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Request cancellation on behalf of the user.
    pub fn cancel(&self) {
        self.cancel_with(CancelReason::User);
    }

    /// Request cancellation with an explicit reason. The first reason to
    /// land wins; later calls are no-ops.
    pub fn cancel_with(&self, reason: CancelReason) {
        let code = match reason {
            CancelReason::User => 1,
            CancelReason::Deadline => 2,
        };
        let _ = self
            .inner
            .reason
            .compare_exchange(0, code, Ordering::SeqCst, Ordering::SeqCst);
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// The recorded reason, if cancelled.
    pub fn reason(&self) -> Option<CancelReason> {
        match self.inner.reason.load(Ordering::SeqCst) {
            1 => Some(CancelReason::User),
            2 => Some(CancelReason::Deadline),
            _ => None,
        }
    }

    /// Resolve once cancellation is requested. Safe to call repeatedly and
    /// from many tasks.
    pub async fn cancelled(&self) {
        loop {
            if self.is_cancelled() {
                return;
            }
            let notified = self.inner.notify.notified();
            // Re-check after registering so a cancel between the check and
            // the registration cannot be missed.
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}
