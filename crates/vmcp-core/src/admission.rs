//! Admission queue (spec §4.3): lets in-flight operations finish before a
//! session closes, without letting new operations start once close has begun.
//!
//! The tricky invariant (spec §9, I-ADM in the original numbering) is that the
//! "is the gate open" check and the "admit one more" increment must happen
//! in the same critical section. Checking then incrementing as two separate
//! steps lets a close() slip in between them and resurrect a ticket after
//! drain has already observed zero in-flight operations.

use std::sync::Arc;

use tokio::sync::{Mutex, Notify};

#[derive(Debug, Default)]
struct State {
    in_flight: u64,
    closed: bool,
}

/// Per-session admission gate. One instance lives inside
/// [`crate::multi_session::MultiSession`] and every dispatched operation must
/// hold a [`Ticket`] for its duration.
#[derive(Debug, Clone)]
pub struct AdmissionQueue {
    state: Arc<Mutex<State>>,
    drained: Arc<Notify>,
}

/// Proof that an operation was admitted. Dropping it releases the slot; there
/// is no explicit release call; release is structural, not something a
/// caller can forget.
pub struct Ticket {
    state: Arc<Mutex<State>>,
    drained: Arc<Notify>,
}

impl Drop for Ticket {
    fn drop(&mut self) {
        let state = self.state.clone();
        let drained = self.drained.clone();
        tokio::spawn(async move {
            let mut guard = state.lock().await;
            guard.in_flight = guard.in_flight.saturating_sub(1);
            if guard.closed && guard.in_flight == 0 {
                drained.notify_waiters();
            }
        });
    }
}

impl Default for AdmissionQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl AdmissionQueue {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            drained: Arc::new(Notify::new()),
        }
    }

    /// Attempts to admit one operation. Returns `None` once the queue is
    /// closed. The open-check and the increment happen under the same lock
    /// guard, so a concurrent `close_and_drain` can never observe zero
    /// in-flight operations while this call is mid-admission.
    pub async fn try_admit(&self) -> Option<Ticket> {
        let mut guard = self.state.lock().await;
        if guard.closed {
            return None;
        }
        guard.in_flight += 1;
        Some(Ticket {
            state: self.state.clone(),
            drained: self.drained.clone(),
        })
    }

    /// Marks the queue closed (no further admissions succeed) and waits for
    /// every already-admitted ticket to be dropped.
    pub async fn close_and_drain(&self) {
        // Registering interest before taking the lock (rather than after)
        // means a `notify_waiters` fired by a concurrently-dropping ticket
        // can never be missed, even if it races the lock below.
        let notified = self.drained.notified();
        let already_drained = {
            let mut guard = self.state.lock().await;
            guard.closed = true;
            guard.in_flight == 0
        };
        if already_drained {
            return;
        }
        notified.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn admits_while_open() {
        let queue = AdmissionQueue::new();
        let ticket = queue.try_admit().await;
        assert!(ticket.is_some());
    }

    #[tokio::test]
    async fn rejects_after_close() {
        let queue = AdmissionQueue::new();
        queue.close_and_drain().await;
        assert!(queue.try_admit().await.is_none());
    }

    #[tokio::test]
    async fn close_waits_for_in_flight_ticket_to_drop() {
        let queue = AdmissionQueue::new();
        let ticket = queue.try_admit().await.expect("admitted");

        let drain_queue = queue.clone();
        let drain = tokio::spawn(async move {
            drain_queue.close_and_drain().await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!drain.is_finished());

        drop(ticket);
        tokio::time::timeout(Duration::from_secs(1), drain)
            .await
            .expect("drain did not complete")
            .unwrap();
    }
}
