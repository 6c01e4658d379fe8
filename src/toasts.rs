//! Notification queue
//!
//! FIFO toasts that expire on their own. Expiry is evaluated against the
//! tokio clock whenever the queue is observed, so an expired toast is never
//! returned even if nobody has pruned it yet.

use serde::Serialize;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

pub const DEFAULT_TOAST_TIMEOUT: Duration = Duration::from_millis(3_500);
pub const ERROR_TOAST_TIMEOUT: Duration = Duration::from_millis(6_000);

pub type ToastId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastKind {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone)]
pub struct Toast {
    pub id: ToastId,
    pub kind: ToastKind,
    pub message: String,
    /// `None` for sticky toasts
    pub expires_at: Option<Instant>,
}

impl Toast {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }

    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        self.expires_at.map(|at| at.saturating_duration_since(now))
    }
}

struct QueueInner {
    next_id: ToastId,
    toasts: VecDeque<Toast>,
}

/// Shared handle to the toast queue
#[derive(Clone)]
pub struct ToastQueue {
    inner: Arc<Mutex<QueueInner>>,
}

impl Default for ToastQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ToastQueue {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(QueueInner {
                next_id: 1,
                toasts: VecDeque::new(),
            })),
        }
    }

    /// Append a toast; a zero timeout makes it sticky
    pub fn push(&self, kind: ToastKind, message: impl Into<String>, timeout: Duration) -> ToastId {
        let now = Instant::now();
        let mut inner = self.lock();
        prune(&mut inner.toasts, now);

        let id = inner.next_id;
        inner.next_id += 1;
        let expires_at = if timeout.is_zero() {
            None
        } else {
            now.checked_add(timeout)
        };
        let message = message.into();
        log::debug!("toast #{} [{:?}] {}", id, kind, message);
        inner.toasts.push_back(Toast {
            id,
            kind,
            message,
            expires_at,
        });
        id
    }

    pub fn info(&self, message: impl Into<String>) -> ToastId {
        self.push(ToastKind::Info, message, DEFAULT_TOAST_TIMEOUT)
    }

    pub fn success(&self, message: impl Into<String>) -> ToastId {
        self.push(ToastKind::Success, message, DEFAULT_TOAST_TIMEOUT)
    }

    /// Error toast with the default timeout
    pub fn error(&self, message: impl Into<String>) -> ToastId {
        self.push(ToastKind::Error, message, DEFAULT_TOAST_TIMEOUT)
    }

    /// Error toast that stays up longer, used for failed writes
    pub fn failure(&self, message: impl Into<String>) -> ToastId {
        self.push(ToastKind::Error, message, ERROR_TOAST_TIMEOUT)
    }

    /// Remove a toast early; returns whether it was still present
    pub fn dismiss(&self, id: ToastId) -> bool {
        let mut inner = self.lock();
        prune(&mut inner.toasts, Instant::now());
        let before = inner.toasts.len();
        inner.toasts.retain(|t| t.id != id);
        inner.toasts.len() != before
    }

    /// Live toasts in display order
    pub fn list(&self) -> Vec<Toast> {
        let mut inner = self.lock();
        prune(&mut inner.toasts, Instant::now());
        inner.toasts.iter().cloned().collect()
    }

    pub fn contains(&self, id: ToastId) -> bool {
        self.list().iter().any(|t| t.id == id)
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn prune(toasts: &mut VecDeque<Toast>, now: Instant) {
    toasts.retain(|t| t.is_live(now));
}
