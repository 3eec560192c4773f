//! Per-session query state machine.
//!
//! At most one query is outstanding at a time. Progress updates queue up in
//! arrival order; the socket loop pushes, consumers pop. Waiting is done
//! through a [`Notify`] so consumers never poll.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::warn;

use perplexity_protocol::{PendingEvent, QueryUpdate};

use crate::error::{ClientError, Result};

#[derive(Debug, Default)]
struct Inner {
    in_flight: bool,
    seq: u64,
    last_uuid: Option<String>,
    queue: VecDeque<QueryUpdate>,
    failure: Option<String>,
}

/// Shared state between the socket loop (producer) and the session
/// façade (consumer).
#[derive(Debug, Default)]
pub struct QueryState {
    inner: Mutex<Inner>,
    notify: Notify,
}

impl QueryState {
    /// Fresh, idle state with sequence tag 0.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the single query slot, returning the sequence tag the
    /// outgoing frame must carry.
    pub fn begin_query(&self) -> Result<u64> {
        let mut inner = self.inner.lock();
        if let Some(message) = &inner.failure {
            return Err(ClientError::UnhandledFrame {
                message: message.clone(),
            });
        }
        if inner.in_flight {
            return Err(ClientError::QueryInFlight);
        }
        inner.in_flight = true;
        Ok(inner.seq)
    }

    /// Release the slot after a send failure, without consuming the tag.
    pub fn abort_query(&self) {
        self.inner.lock().in_flight = false;
    }

    /// Sequence tag the next acknowledgement must carry.
    pub fn current_seq(&self) -> u64 {
        self.inner.lock().seq
    }

    /// Whether no query is outstanding.
    pub fn is_idle(&self) -> bool {
        !self.inner.lock().in_flight
    }

    /// Number of queued, unconsumed updates.
    pub fn queue_len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// Route one pending-channel update from the socket loop.
    pub fn on_pending(&self, event: PendingEvent, update: QueryUpdate) {
        let mut inner = self.inner.lock();
        if inner.failure.is_some() {
            return;
        }
        if !inner.in_flight {
            inner.failure = Some("pending frame while idle".to_owned());
            drop(inner);
            self.notify.notify_waiters();
            return;
        }
        // A "final" progress update that is not completed would make the
        // consumer stop before the real terminal payload arrives; drop it.
        if update.is_final() && !update.is_completed() {
            warn!(status = ?update.status, "suppressing final update with non-completed status");
        } else {
            inner.queue.push_back(update.clone());
        }
        if event == PendingEvent::QueryAnswered {
            inner.last_uuid = update.uuid.clone();
            inner.in_flight = false;
        }
        drop(inner);
        self.notify.notify_waiters();
    }

    /// Route one acknowledgement-channel payload from the socket loop.
    ///
    /// The tag always advances, but the payload is only queued when it is
    /// not a duplicate of the update that already closed this cycle.
    pub fn on_response(&self, update: QueryUpdate) {
        let mut inner = self.inner.lock();
        if inner.failure.is_some() {
            return;
        }
        let duplicate = match (&update.uuid, &inner.last_uuid) {
            (Some(incoming), Some(last)) => incoming == last,
            _ => false,
        };
        if !duplicate {
            inner.queue.push_back(update);
            inner.in_flight = false;
        }
        inner.seq += 1;
        inner.last_uuid = None;
        drop(inner);
        self.notify.notify_waiters();
    }

    /// Latch a fatal failure; the first message wins.
    pub fn fail(&self, message: impl Into<String>) {
        let mut inner = self.inner.lock();
        if inner.failure.is_none() {
            inner.failure = Some(message.into());
        }
        drop(inner);
        self.notify.notify_waiters();
    }

    /// The latched failure, if any.
    pub fn failure(&self) -> Option<String> {
        self.inner.lock().failure.clone()
    }

    /// Abandon the current cycle after a timeout: back to idle, queue
    /// cleared, sequence tag untouched.
    pub fn force_idle(&self) {
        let mut inner = self.inner.lock();
        inner.in_flight = false;
        inner.queue.clear();
        inner.last_uuid = None;
        drop(inner);
        self.notify.notify_waiters();
    }

    /// Pop the oldest queued update.
    pub fn pop_front(&self) -> Option<QueryUpdate> {
        self.inner.lock().queue.pop_front()
    }

    /// Take the newest queued update and drain the rest of the queue.
    pub fn take_last(&self) -> Option<QueryUpdate> {
        let mut inner = self.inner.lock();
        let last = inner.queue.pop_back();
        inner.queue.clear();
        last
    }

    /// Wait until the current cycle finishes (idle or failed), or the
    /// deadline passes. Returns `false` on deadline.
    pub async fn wait_finished(&self, deadline: Instant) -> bool {
        loop {
            let notified = self.notify.notified();
            {
                let inner = self.inner.lock();
                if !inner.in_flight || inner.failure.is_some() {
                    return true;
                }
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return false;
            }
        }
    }

    /// Wait until an update is queued, the cycle finishes, or the deadline
    /// passes. Returns `false` on deadline.
    pub async fn wait_progress(&self, deadline: Instant) -> bool {
        loop {
            let notified = self.notify.notified();
            {
                let inner = self.inner.lock();
                if !inner.queue.is_empty() || !inner.in_flight || inner.failure.is_some() {
                    return true;
                }
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return false;
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
