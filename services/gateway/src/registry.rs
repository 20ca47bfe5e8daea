//! Connection registry and fan-out
//!
//! The one piece of in-process mutable shared state: a map from
//! authenticated user identity to live WebSocket connections. The registry
//! is the exclusive owner of the map; `register`, `unregister`, and `send`
//! are the only mutation points. One user may hold several simultaneous
//! connections (multi-device) and `send` fans out to all of them.
//!
//! Nothing here is persisted: the map is rebuilt purely from live
//! connections, and a reconnecting driver recovers any outstanding offer
//! from the store, not from here.

use async_trait::async_trait;
use dashmap::DashMap;
use dispatch_engine::ports::{Delivery, Notifier};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::debug;
use types::events::ServerEvent;
use types::ids::UserId;

struct ConnectionHandle {
    conn_id: u64,
    tx: mpsc::UnboundedSender<ServerEvent>,
}

#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<UserId, Vec<ConnectionHandle>>,
    next_conn_id: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection for an authenticated user. Returns the
    /// connection id (for unregister) and the event stream the socket's
    /// writer task drains.
    pub fn register(&self, user: UserId) -> (u64, mpsc::UnboundedReceiver<ServerEvent>) {
        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections
            .entry(user)
            .or_default()
            .push(ConnectionHandle { conn_id, tx });
        debug!(%user, conn_id, "connection registered");
        (conn_id, rx)
    }

    /// Drop one connection. Unconditional: called on every disconnect
    /// path, graceful or not, so stale entries cannot leak.
    pub fn unregister(&self, user: UserId, conn_id: u64) {
        if let Some(mut handles) = self.connections.get_mut(&user) {
            handles.retain(|h| h.conn_id != conn_id);
            let empty = handles.is_empty();
            drop(handles);
            if empty {
                self.connections.remove_if(&user, |_, v| v.is_empty());
            }
        }
        debug!(%user, conn_id, "connection unregistered");
    }

    /// Deliver an event to every live connection of one user. Zero
    /// connections is a signal, not an error; dead channels are pruned on
    /// the way through.
    pub fn push(&self, user: UserId, event: ServerEvent) -> Delivery {
        let Some(mut handles) = self.connections.get_mut(&user) else {
            return Delivery::NoConnection;
        };

        let mut delivered = false;
        handles.retain(|h| match h.tx.send(event.clone()) {
            Ok(()) => {
                delivered = true;
                true
            }
            // Receiver gone: the socket died without unregistering yet.
            Err(_) => false,
        });

        if delivered {
            Delivery::Delivered
        } else {
            Delivery::NoConnection
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.iter().map(|e| e.len()).sum()
    }

    pub fn user_count(&self) -> usize {
        self.connections.len()
    }
}

#[async_trait]
impl Notifier for ConnectionRegistry {
    async fn send(&self, user: UserId, event: ServerEvent) -> Delivery {
        self.push(user, event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::ids::AttemptId;

    fn event() -> ServerEvent {
        ServerEvent::OfferExpired {
            attempt_id: AttemptId::new(),
        }
    }

    #[test]
    fn test_send_reaches_all_devices_of_one_user() {
        let registry = ConnectionRegistry::new();
        let user = UserId::new();
        let (_id1, mut rx1) = registry.register(user);
        let (_id2, mut rx2) = registry.register(user);

        assert_eq!(registry.push(user, event()), Delivery::Delivered);
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn test_send_to_absent_user_is_no_connection() {
        let registry = ConnectionRegistry::new();
        assert_eq!(registry.push(UserId::new(), event()), Delivery::NoConnection);
    }

    #[test]
    fn test_unregister_removes_only_that_connection() {
        let registry = ConnectionRegistry::new();
        let user = UserId::new();
        let (id1, rx1) = registry.register(user);
        let (_id2, mut rx2) = registry.register(user);
        drop(rx1);

        registry.unregister(user, id1);
        assert_eq!(registry.connection_count(), 1);

        assert_eq!(registry.push(user, event()), Delivery::Delivered);
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn test_dead_channels_are_pruned_on_send() {
        let registry = ConnectionRegistry::new();
        let user = UserId::new();
        let (_id, rx) = registry.register(user);
        drop(rx);

        assert_eq!(registry.push(user, event()), Delivery::NoConnection);
        assert_eq!(registry.connection_count(), 0);
    }

    #[test]
    fn test_events_do_not_cross_users() {
        let registry = ConnectionRegistry::new();
        let a = UserId::new();
        let b = UserId::new();
        let (_ida, mut rxa) = registry.register(a);
        let (_idb, mut rxb) = registry.register(b);

        registry.push(a, event());
        assert!(rxa.try_recv().is_ok());
        assert!(rxb.try_recv().is_err());
    }
}
