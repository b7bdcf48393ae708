// ── Request correlator ──
//
// Synchronous exchanges and unsolicited pushes share one byte stream.
// Every outbound request carries a fresh id; the device echoes it in its
// reply. Messages whose id matches nothing pending are pushes.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::task::{Context, Poll};

use tokio::sync::oneshot;
use tracing::trace;

use crate::error::Error;

/// Reserved id for the authentication exchange. The device's auth reply
/// carries no id, so it is matched by elimination.
pub const AUTH_REQUEST_ID: &str = "0";

/// Where an inbound message went.
#[derive(Debug, PartialEq, Eq)]
pub enum Dispatch {
    /// Completed the pending request with this id.
    Resolved(String),
    /// No pending request claimed it; hand it to the event decoder.
    Unsolicited(String),
}

/// Tracks one single-shot completion per outstanding request id.
#[derive(Debug)]
pub struct Correlator {
    counter: AtomicU64,
    pending: Mutex<HashMap<String, oneshot::Sender<String>>>,
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}

impl Correlator {
    pub fn new() -> Self {
        Self {
            counter: AtomicU64::new(0),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Issue the next request id (`"1"`, `"2"`, …) and register a completion
    /// for it.
    pub fn issue(&self) -> (String, PendingReply) {
        let id = (self.counter.fetch_add(1, Ordering::Relaxed) + 1).to_string();
        let reply = self.register(id.clone());
        (id, reply)
    }

    /// Occupy the reserved authentication slot.
    pub fn register_auth(&self) -> PendingReply {
        self.register(AUTH_REQUEST_ID.to_owned())
    }

    /// Route an inbound message.
    ///
    /// `id` is the request id extracted from the message, if any. A matching
    /// pending request wins; otherwise a waiting authentication exchange
    /// takes the message; otherwise it is unsolicited.
    pub fn dispatch(&self, id: Option<&str>, message: String) -> Dispatch {
        let mut pending = self.lock();

        let claimed = id
            .and_then(|id| pending.remove_entry(id))
            .or_else(|| pending.remove_entry(AUTH_REQUEST_ID));

        match claimed {
            Some((id, tx)) => {
                trace!(req_id = %id, "reply correlated");
                // Receiver may already be gone if the caller stopped waiting.
                let _ = tx.send(message);
                Dispatch::Resolved(id)
            }
            None => Dispatch::Unsolicited(message),
        }
    }

    /// Drop every pending completion. Waiters observe
    /// [`Error::Disconnected`]. Returns how many were failed.
    pub fn fail_all(&self) -> usize {
        let mut pending = self.lock();
        let count = pending.len();
        pending.clear();
        count
    }

    /// Stop waiting for `id`. A reply arriving later is treated as a push.
    /// Returns whether the id was still pending.
    pub fn forget(&self, id: &str) -> bool {
        let removed = self.lock().remove(id).is_some();
        if removed {
            trace!(req_id = %id, "pending reply abandoned");
        }
        removed
    }

    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }

    fn register(&self, id: String) -> PendingReply {
        let (tx, rx) = oneshot::channel();
        // Replacing an entry drops the old sender, failing its waiter.
        self.lock().insert(id.clone(), tx);
        PendingReply { id, rx }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, oneshot::Sender<String>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Awaitable reply to one request.
#[derive(Debug)]
pub struct PendingReply {
    id: String,
    rx: oneshot::Receiver<String>,
}

impl PendingReply {
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Future for PendingReply {
    type Output = Result<String, Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.map_err(|_| Error::Disconnected))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn ids_start_at_one_and_never_collide_with_auth() {
        let correlator = Correlator::new();
        let (first, _r1) = correlator.issue();
        let (second, _r2) = correlator.issue();
        assert_eq!(first, "1");
        assert_eq!(second, "2");
        assert_ne!(first, AUTH_REQUEST_ID);
    }

    #[test]
    fn concurrent_issues_yield_distinct_ids() {
        let correlator = std::sync::Arc::new(Correlator::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let c = std::sync::Arc::clone(&correlator);
                std::thread::spawn(move || (0..50).map(|_| c.issue().0).collect::<Vec<_>>())
            })
            .collect();

        let mut ids = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(ids.insert(id), "duplicate request id issued");
            }
        }
        assert_eq!(ids.len(), 400);
    }

    #[tokio::test]
    async fn matching_reply_resolves_once() {
        let correlator = Correlator::new();
        let (id, reply) = correlator.issue();

        let routed = correlator.dispatch(Some(&id), "reply".into());
        assert_eq!(routed, Dispatch::Resolved(id.clone()));
        assert_eq!(reply.await.unwrap(), "reply");

        // Second delivery with the same id is now a push.
        let again = correlator.dispatch(Some(&id), "dup".into());
        assert_eq!(again, Dispatch::Unsolicited("dup".into()));
    }

    #[tokio::test]
    async fn auth_slot_takes_id_less_reply() {
        let correlator = Correlator::new();
        let reply = correlator.register_auth();

        let routed = correlator.dispatch(None, "Accepted".into());
        assert_eq!(routed, Dispatch::Resolved(AUTH_REQUEST_ID.into()));
        assert_eq!(reply.await.unwrap(), "Accepted");
    }

    #[test]
    fn unknown_id_is_unsolicited() {
        let correlator = Correlator::new();
        let (_id, _reply) = correlator.issue();

        let routed = correlator.dispatch(Some("999"), "push".into());
        assert_eq!(routed, Dispatch::Unsolicited("push".into()));
        assert_eq!(correlator.pending_count(), 1);
    }

    #[tokio::test]
    async fn forgotten_id_releases_slot_and_late_reply_is_unsolicited() {
        let correlator = Correlator::new();
        let (id, reply) = correlator.issue();

        assert!(correlator.forget(&id));
        assert!(!correlator.forget(&id));
        assert_eq!(correlator.pending_count(), 0);
        assert!(matches!(reply.await, Err(Error::Disconnected)));

        let late = correlator.dispatch(Some(&id), "late".into());
        assert_eq!(late, Dispatch::Unsolicited("late".into()));
    }

    #[tokio::test]
    async fn fail_all_disconnects_waiters() {
        let correlator = Correlator::new();
        let (_a, first) = correlator.issue();
        let (_b, second) = correlator.issue();

        assert_eq!(correlator.fail_all(), 2);
        assert!(matches!(first.await, Err(Error::Disconnected)));
        assert!(matches!(second.await, Err(Error::Disconnected)));
        assert_eq!(correlator.pending_count(), 0);
    }
}
