//! Outbound event publishing
//!
//! The engine only knows it can publish an event; how observers are
//! addressed and transported is the gateway's business.

use super::types::GameEvent;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::debug;

/// Fan-out target for engine events
pub trait BroadcastGateway: Send + Sync {
    /// Deliver `event` to every current observer, in emission order
    fn publish(&self, event: GameEvent);
}

/// Tokio broadcast channel; each subscriber sees events in emission order
#[derive(Clone)]
pub struct ChannelGateway {
    tx: broadcast::Sender<GameEvent>,
}

impl ChannelGateway {
    pub fn new(buffer: usize) -> Self {
        let (tx, _rx) = broadcast::channel(buffer);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GameEvent> {
        self.tx.subscribe()
    }

    pub fn observer_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl BroadcastGateway for ChannelGateway {
    fn publish(&self, event: GameEvent) {
        let name = event.name();
        if self.tx.send(event).is_err() {
            debug!(event = name, "no observers for event");
        }
    }
}

/// Keeps every published event in memory
#[derive(Clone, Default)]
pub struct RecordingGateway {
    events: Arc<Mutex<Vec<GameEvent>>>,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<GameEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Drain recorded events
    pub fn take(&self) -> Vec<GameEvent> {
        std::mem::take(&mut *self.events.lock().unwrap_or_else(|e| e.into_inner()))
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events().iter().map(GameEvent::name).collect()
    }
}

impl BroadcastGateway for RecordingGateway {
    fn publish(&self, event: GameEvent) {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_gateway_preserves_order_per_observer() {
        let gateway = ChannelGateway::new(16);
        let mut first = gateway.subscribe();
        let mut second = gateway.subscribe();
        assert_eq!(gateway.observer_count(), 2);

        for time_left in (0..3).rev() {
            gateway.publish(GameEvent::CountdownUpdate { time_left });
        }

        for rx in [&mut first, &mut second] {
            for expected in (0..3).rev() {
                assert_eq!(rx.recv().await.unwrap(), GameEvent::CountdownUpdate { time_left: expected });
            }
        }
    }

    #[test]
    fn test_publish_without_observers_is_harmless() {
        let gateway = ChannelGateway::new(4);
        gateway.publish(GameEvent::CountdownStart { time_left: 5 });
        assert_eq!(gateway.observer_count(), 0);
    }

    #[test]
    fn test_recording_gateway_take_drains() {
        let gateway = RecordingGateway::new();
        gateway.publish(GameEvent::CountdownStart { time_left: 5 });
        assert_eq!(gateway.names(), vec!["countdown_start"]);
        assert_eq!(gateway.take().len(), 1);
        assert!(gateway.events().is_empty());
    }
}
