//! Event Bus Module
//!
//! In-process publish/subscribe channel that decouples the tracker from
//! its consumers (display fragments, wearable notifier).

pub mod message;

pub use message::{
    BusMessage, ChangeState, LifecycleRequest, LocationEvent, StatusEvent, TrackingState,
};

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc};

/// Default number of messages buffered per subscriber
pub const DEFAULT_BUS_CAPACITY: usize = 256;

/// Cloneable handle to the shared event bus
///
/// Every message is broadcast to subscribers, which may lag and lose the
/// oldest messages. Lifecycle requests are additionally queued on their own
/// unbounded channel for the tracker, so location traffic can never push
/// a `Stop` out of its queue.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BusMessage>,
    requests: mpsc::UnboundedSender<LifecycleRequest>,
    request_rx: Arc<Mutex<Option<mpsc::UnboundedReceiver<LifecycleRequest>>>>,
}

impl EventBus {
    /// Create a new bus with the default capacity
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUS_CAPACITY)
    }

    /// Create a new bus buffering `capacity` messages per subscriber
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        let (requests, request_rx) = mpsc::unbounded_channel();
        Self {
            tx,
            requests,
            request_rx: Arc::new(Mutex::new(Some(request_rx))),
        }
    }

    /// Post a message to every current subscriber
    ///
    /// Inbound lifecycle messages are also queued for the request consumer.
    /// Posting with no subscribers is not an error; the broadcast copy is
    /// dropped. Returns the number of subscribers the message was queued for.
    pub fn post(&self, message: BusMessage) -> usize {
        tracing::trace!("Posting {} to bus", message.type_name());
        if let Some(request) = message.as_request() {
            if self.requests.send(request).is_err() {
                tracing::warn!("{} posted after the request consumer closed", request.name());
            }
        }
        self.tx.send(message).unwrap_or(0)
    }

    /// Post a lifecycle request
    pub fn request(&self, request: LifecycleRequest) -> usize {
        self.post(request.into())
    }

    /// Subscribe to all messages posted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<BusMessage> {
        self.tx.subscribe()
    }

    /// Take the lifecycle request queue
    ///
    /// There is a single consumer; requests posted before this is called
    /// are already queued. Returns `None` once the queue has been taken.
    pub fn take_requests(&self) -> Option<mpsc::UnboundedReceiver<LifecycleRequest>> {
        self.request_rx.lock().take()
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_post_without_subscribers() {
        let bus = EventBus::new();
        assert_eq!(bus.request(LifecycleRequest::Start), 0);

        // Still queued for the tracker
        let mut requests = bus.take_requests().unwrap();
        assert_eq!(requests.try_recv().unwrap(), LifecycleRequest::Start);
    }

    #[tokio::test]
    async fn test_request_queue_taken_once() {
        let bus = EventBus::new();
        assert!(bus.take_requests().is_some());
        assert!(bus.clone().take_requests().is_none());
    }

    #[tokio::test]
    async fn test_outbound_flood_does_not_drop_requests() {
        let bus = EventBus::with_capacity(4);
        let mut rx = bus.subscribe();
        let mut requests = bus.take_requests().unwrap();

        bus.request(LifecycleRequest::Stop);
        for _ in 0..64 {
            bus.post(BusMessage::GpsStatus(StatusEvent {
                status: TrackingState::Started,
            }));
        }
        bus.post(BusMessage::ChangeRefreshInterval { interval_ms: 500 });

        assert!(matches!(
            rx.try_recv(),
            Err(broadcast::error::TryRecvError::Lagged(_))
        ));
        assert_eq!(requests.try_recv().unwrap(), LifecycleRequest::Stop);
        assert_eq!(
            requests.try_recv().unwrap(),
            LifecycleRequest::ChangeRefreshInterval(500)
        );
        assert!(requests.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_every_subscriber_receives() {
        let bus = EventBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();

        let delivered = bus.post(BusMessage::GpsStatus(StatusEvent {
            status: TrackingState::Started,
        }));
        assert_eq!(delivered, 2);

        for rx in [&mut a, &mut b] {
            match rx.recv().await.unwrap() {
                BusMessage::GpsStatus(event) => assert_eq!(event.status, TrackingState::Started),
                other => panic!("unexpected message {:?}", other),
            }
        }
    }
}
