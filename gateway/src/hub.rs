use std::collections::{HashMap, HashSet};

use engine::ServerFrame;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

pub type SessionId = Uuid;

/// Outbound queue depth per session. A client that cannot drain this many
/// frames starts losing pushes rather than blocking the rest of the system.
const OUTBOUND_QUEUE: usize = 256;

struct HubInner {
    sessions: HashMap<SessionId, mpsc::Sender<ServerFrame>>,
    /// request_id -> session, for answering requests.
    requests: HashMap<String, SessionId>,
    /// task_id -> session, for delivering async task results.
    tasks: HashMap<i64, SessionId>,
}

/// Session table plus the two correlation maps. Lookups are short and never
/// nest with the registry lock; actual sends happen outside the lock through
/// the per-session queue.
pub struct SessionHub {
    inner: Mutex<HubInner>,
}

impl Default for SessionHub {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionHub {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HubInner {
                sessions: HashMap::new(),
                requests: HashMap::new(),
                tasks: HashMap::new(),
            }),
        }
    }

    /// Registers a session and returns the receiving end of its outbound
    /// queue, to be drained by the session's write flow.
    pub fn register(&self, session_id: SessionId) -> mpsc::Receiver<ServerFrame> {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE);
        self.inner.lock().sessions.insert(session_id, tx);
        metrics::gauge!("gateway_sessions").increment(1.0);
        rx
    }

    /// Removes the session and purges every correlation entry pointing at
    /// it. Called from the disconnect path.
    pub fn unregister(&self, session_id: SessionId) {
        let mut inner = self.inner.lock();
        if inner.sessions.remove(&session_id).is_some() {
            metrics::gauge!("gateway_sessions").decrement(1.0);
        }
        inner.requests.retain(|_, sid| *sid != session_id);
        inner.tasks.retain(|_, sid| *sid != session_id);
    }

    /// Queues a frame for one session. Returns false when the session is
    /// gone or its queue is saturated; the frame is dropped, never blocked
    /// on.
    pub fn send(&self, session_id: SessionId, frame: ServerFrame) -> bool {
        let tx = match self.inner.lock().sessions.get(&session_id) {
            Some(tx) => tx.clone(),
            None => {
                debug!(%session_id, "Send to unknown session dropped");
                return false;
            }
        };

        match tx.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(%session_id, "Outbound queue full, frame dropped");
                metrics::counter!("gateway_frames_dropped").increment(1);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.unregister(session_id);
                false
            }
        }
    }

    /// Delivers one frame to many sessions. Per-session order is preserved
    /// by the outbound queues; a failing session never affects the others.
    pub fn broadcast(&self, session_ids: &HashSet<SessionId>, frame: &ServerFrame) {
        for session_id in session_ids {
            self.send(*session_id, frame.clone());
        }
        metrics::counter!("gateway_broadcasts").increment(1);
    }

    pub fn register_request(&self, request_id: String, session_id: SessionId) {
        self.inner.lock().requests.insert(request_id, session_id);
    }

    pub fn take_request_session(&self, request_id: &str) -> Option<SessionId> {
        self.inner.lock().requests.remove(request_id)
    }

    pub fn register_task(&self, task_id: i64, session_id: SessionId) {
        self.inner.lock().tasks.insert(task_id, session_id);
    }

    /// Looks up and clears the task correlation; unknown ids (session gone,
    /// or a task this gateway never created) return None.
    pub fn take_task_session(&self, task_id: i64) -> Option<SessionId> {
        self.inner.lock().tasks.remove(&task_id)
    }

    #[must_use]
    pub fn session_count(&self) -> usize {
        self.inner.lock().sessions.len()
    }

    #[cfg(test)]
    pub fn correlation_counts(&self) -> (usize, usize) {
        let inner = self.inner.lock();
        (inner.requests.len(), inner.tasks.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_queues_in_order() {
        let hub = SessionHub::new();
        let session = Uuid::new_v4();
        let mut rx = hub.register(session);

        assert!(hub.send(session, ServerFrame::ack(Some("r1".to_owned()))));
        assert!(hub.send(session, ServerFrame::pong()));

        assert_eq!(rx.recv().await.unwrap().kind, "ACK");
        assert_eq!(rx.recv().await.unwrap().kind, "PONG");
    }

    #[tokio::test]
    async fn test_unregister_purges_correlations() {
        let hub = SessionHub::new();
        let session = Uuid::new_v4();
        let other = Uuid::new_v4();
        let _rx = hub.register(session);
        let _other_rx = hub.register(other);

        hub.register_request("r1".to_owned(), session);
        hub.register_task(1, session);
        hub.register_task(2, other);

        hub.unregister(session);

        // No entry in either correlation map references the closed session.
        assert_eq!(hub.take_task_session(1), None);
        assert_eq!(hub.take_request_session("r1"), None);
        assert_eq!(hub.take_task_session(2), Some(other));
        assert_eq!(hub.session_count(), 1);
    }

    #[tokio::test]
    async fn test_send_to_closed_session_cleans_up() {
        let hub = SessionHub::new();
        let session = Uuid::new_v4();
        let rx = hub.register(session);
        drop(rx);

        assert!(!hub.send(session, ServerFrame::pong()));
        assert_eq!(hub.session_count(), 0);
    }
}
