//! WebSocket hub (§4.10): tracks connected clients and which sessions they
//! are subscribed to, and resolves approval responses. Grounded on the
//! concurrency model's "Hub client/session maps: guarded by a single RW
//! mutex; the hub's event loop is single-goroutine" — the maps here are
//! plain, guarded by one `std::sync::RwLock`, and every method is a short,
//! non-blocking critical section.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde_json::Value;
use tokio::sync::mpsc;

use mote::policy::ApprovalGate;

pub type ClientId = u64;

/// Per-client send buffer bound. A slow reader loses events rather than
/// back-pressuring the hub or the orchestrator emitting them.
const CLIENT_BUFFER: usize = 256;

struct HubInner {
    clients: HashMap<ClientId, mpsc::Sender<Value>>,
    subscriptions: HashMap<String, HashSet<ClientId>>,
}

pub struct Hub {
    inner: RwLock<HubInner>,
    next_id: AtomicU64,
    pub approvals: Arc<ApprovalGate>,
}

impl Hub {
    pub fn new(approvals: Arc<ApprovalGate>) -> Self {
        Self {
            inner: RwLock::new(HubInner {
                clients: HashMap::new(),
                subscriptions: HashMap::new(),
            }),
            next_id: AtomicU64::new(1),
            approvals,
        }
    }

    /// Registers a new client and returns its id plus the receiver its
    /// connection task forwards to the socket.
    pub fn register(&self) -> (ClientId, mpsc::Receiver<Value>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(CLIENT_BUFFER);
        self.inner.write().unwrap().clients.insert(id, tx);
        (id, rx)
    }

    /// Drops the client and removes it from every session it was subscribed to.
    pub fn unregister(&self, id: ClientId) {
        let mut inner = self.inner.write().unwrap();
        inner.clients.remove(&id);
        for clients in inner.subscriptions.values_mut() {
            clients.remove(&id);
        }
        inner.subscriptions.retain(|_, clients| !clients.is_empty());
    }

    pub fn subscribe(&self, session_id: &str, id: ClientId) {
        self.inner
            .write()
            .unwrap()
            .subscriptions
            .entry(session_id.to_string())
            .or_default()
            .insert(id);
    }

    pub fn unsubscribe(&self, session_id: &str, id: ClientId) {
        let mut inner = self.inner.write().unwrap();
        if let Some(clients) = inner.subscriptions.get_mut(session_id) {
            clients.remove(&id);
        }
    }

    /// Sends `frame` directly to one client, bypassing subscriptions. Used
    /// for replies scoped to the connection that asked (`ping`, the
    /// `approval_response` acknowledgement).
    pub fn send_to(&self, id: ClientId, frame: Value) {
        if let Some(tx) = self.inner.read().unwrap().clients.get(&id) {
            let _ = tx.try_send(frame);
        }
    }

    /// Broadcasts to every client subscribed to `session_id`. Clients with a
    /// full buffer silently drop the event.
    pub fn broadcast_session(&self, session_id: &str, frame: Value) {
        let inner = self.inner.read().unwrap();
        let Some(clients) = inner.subscriptions.get(session_id) else {
            return;
        };
        for client_id in clients {
            if let Some(tx) = inner.clients.get(client_id) {
                let _ = tx.try_send(frame.clone());
            }
        }
    }

    /// Broadcasts to every connected client regardless of subscription, used
    /// for hub-wide notices (`reload`).
    pub fn broadcast_all(&self, frame: Value) {
        let inner = self.inner.read().unwrap();
        for tx in inner.clients.values() {
            let _ = tx.try_send(frame.clone());
        }
    }

    pub fn resolve_approval(&self, request_id: &str, approved: bool) -> bool {
        self.approvals.resolve(request_id, approved)
    }

    #[cfg(test)]
    fn subscriber_count(&self, session_id: &str) -> usize {
        self.inner
            .read()
            .unwrap()
            .subscriptions
            .get(session_id)
            .map(|c| c.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn hub() -> Hub {
        Hub::new(Arc::new(ApprovalGate::new()))
    }

    #[test]
    fn subscribe_then_broadcast_reaches_only_subscribed_clients() {
        let hub = hub();
        let (a, mut a_rx) = hub.register();
        let (_b, mut b_rx) = hub.register();
        hub.subscribe("s1", a);

        hub.broadcast_session("s1", json!({"type": "stream", "delta": "hi"}));

        assert_eq!(a_rx.try_recv().unwrap()["delta"], "hi");
        assert!(b_rx.try_recv().is_err());
        assert_eq!(hub.subscriber_count("s1"), 1);
    }

    #[test]
    fn unregister_removes_client_from_every_subscription() {
        let hub = hub();
        let (a, _rx) = hub.register();
        hub.subscribe("s1", a);
        hub.subscribe("s2", a);
        hub.unregister(a);
        assert_eq!(hub.subscriber_count("s1"), 0);
        assert_eq!(hub.subscriber_count("s2"), 0);
    }

    #[test]
    fn unsubscribe_stops_further_delivery() {
        let hub = hub();
        let (a, mut rx) = hub.register();
        hub.subscribe("s1", a);
        hub.unsubscribe("s1", a);
        hub.broadcast_session("s1", json!({"type": "stream"}));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn resolve_approval_delegates_to_the_gate() {
        let hub = hub();
        let rx = hub.approvals.register("req-1");
        assert!(hub.resolve_approval("req-1", true));
        assert!(rx.await.unwrap());
    }
}
