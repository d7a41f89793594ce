use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::debug;
use uuid::Uuid;

use huddle_types::events::GatewayEvent;

/// Tracks every open live channel and fans events out to them.
///
/// Each channel is represented by the sending half of an unbounded queue;
/// the registry holds the only sender, so unregistering a channel also
/// closes its queue. Cloning the registry is cheap and every clone sees the
/// same membership.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    inner: Arc<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    channels: RwLock<HashMap<Uuid, mpsc::UnboundedSender<GatewayEvent>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a channel. Returns its id and the queue the connection task
    /// should drain; only events broadcast after this returns are delivered.
    pub async fn register(&self) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.channels.write().await.insert(conn_id, tx);
        (conn_id, rx)
    }

    /// Remove a channel. Unknown ids are ignored. Returns whether it was present.
    pub async fn unregister(&self, conn_id: Uuid) -> bool {
        self.inner.channels.write().await.remove(&conn_id).is_some()
    }

    /// Deliver `event` to every registered channel, best-effort.
    ///
    /// Channels whose receiving side is gone are pruned. Never fails; returns
    /// the number of channels the event was queued for.
    pub async fn broadcast(&self, event: GatewayEvent) -> usize {
        // The read guard is held for the whole pass, so an unregister that
        // completes before the pass starts is never delivered to, and one
        // that starts mid-pass waits for it.
        let (delivered, dead) = {
            let channels = self.inner.channels.read().await;
            let mut dead = Vec::new();
            let mut delivered = 0;
            for (conn_id, tx) in channels.iter() {
                if tx.send(event.clone()).is_ok() {
                    delivered += 1;
                } else {
                    dead.push(*conn_id);
                }
            }
            (delivered, dead)
        };

        if !dead.is_empty() {
            let mut channels = self.inner.channels.write().await;
            for conn_id in &dead {
                channels.remove(conn_id);
            }
            debug!("Pruned {} dead live channels during broadcast", dead.len());
        }

        delivered
    }

    /// Number of currently registered channels.
    pub async fn len(&self) -> usize {
        self.inner.channels.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::error::TryRecvError;

    #[tokio::test]
    async fn broadcast_with_no_channels_is_noop() {
        let registry = ConnectionRegistry::new();
        assert_eq!(registry.broadcast(GatewayEvent::MessagesCleared).await, 0);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn every_channel_sees_event_exactly_once() {
        let registry = ConnectionRegistry::new();
        let mut receivers = Vec::new();
        for _ in 0..5 {
            receivers.push(registry.register().await.1);
        }

        assert_eq!(registry.broadcast(GatewayEvent::MessagesCleared).await, 5);

        for rx in &mut receivers {
            assert_eq!(rx.try_recv().unwrap(), GatewayEvent::MessagesCleared);
            assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
        }
    }

    #[tokio::test]
    async fn unregister_is_idempotent_and_stops_delivery() {
        let registry = ConnectionRegistry::new();
        let (conn_id, mut rx) = registry.register().await;

        assert!(registry.unregister(conn_id).await);
        assert!(!registry.unregister(conn_id).await);
        assert!(!registry.unregister(Uuid::new_v4()).await);

        assert_eq!(registry.broadcast(GatewayEvent::MessagesCleared).await, 0);
        // The queue was closed by removal, nothing was delivered after it.
        assert_eq!(rx.try_recv(), Err(TryRecvError::Disconnected));
    }

    #[tokio::test]
    async fn dead_channel_is_pruned_without_affecting_others() {
        let registry = ConnectionRegistry::new();
        let (_, dead_rx) = registry.register().await;
        let (_, mut live_rx) = registry.register().await;
        drop(dead_rx);

        assert_eq!(registry.broadcast(GatewayEvent::MessagesCleared).await, 1);
        assert_eq!(live_rx.try_recv().unwrap(), GatewayEvent::MessagesCleared);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn late_registration_gets_no_backlog() {
        let registry = ConnectionRegistry::new();
        registry.broadcast(GatewayEvent::MessagesCleared).await;

        let (_, mut rx) = registry.register().await;
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test]
    async fn concurrent_unregister_during_broadcasts_does_not_panic() {
        let registry = ConnectionRegistry::new();
        let mut ids = Vec::new();
        let mut receivers = Vec::new();
        for _ in 0..50 {
            let (id, rx) = registry.register().await;
            ids.push(id);
            receivers.push(rx);
        }

        let broadcaster = {
            let registry = registry.clone();
            tokio::spawn(async move {
                for _ in 0..20 {
                    registry.broadcast(GatewayEvent::MessagesCleared).await;
                    tokio::task::yield_now().await;
                }
            })
        };
        let remover = {
            let registry = registry.clone();
            tokio::spawn(async move {
                for id in ids {
                    registry.unregister(id).await;
                    tokio::task::yield_now().await;
                }
            })
        };

        broadcaster.await.unwrap();
        remover.await.unwrap();
        assert!(registry.is_empty().await);

        // Every queue ends closed, having received at most one event per broadcast.
        for mut rx in receivers {
            let mut seen = 0;
            while let Ok(event) = rx.try_recv() {
                assert_eq!(event, GatewayEvent::MessagesCleared);
                seen += 1;
            }
            assert!(seen <= 20);
            assert_eq!(rx.try_recv(), Err(TryRecvError::Disconnected));
        }
    }
}
