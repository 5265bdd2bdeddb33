//! Event plumbing
//!
//! Outbound events go through an `EventSink`; the default sink is a
//! broadcast-based bus so several consumers can observe engine output.
//! Inbound events arrive on an mpsc queue the engine drains.

use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use super::types::{InboundEvent, LearningEvent};

/// Destination for events published by the engine
#[cfg_attr(test, mockall::automock)]
pub trait EventSink: Send + Sync {
    fn publish(&self, event: LearningEvent);
}

/// Sink that drops everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn publish(&self, _event: LearningEvent) {}
}

/// Sink that forwards events to a closure
pub struct CallbackSink<F> {
    callback: F,
}

impl<F> CallbackSink<F>
where
    F: Fn(LearningEvent) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> EventSink for CallbackSink<F>
where
    F: Fn(LearningEvent) + Send + Sync,
{
    fn publish(&self, event: LearningEvent) {
        (self.callback)(event);
    }
}

/// Event bus for broadcasting engine output to multiple subscribers
pub struct EventBus {
    sender: broadcast::Sender<LearningEvent>,
    capacity: usize,
}

impl EventBus {
    /// Create a new event bus with the given capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender, capacity }
    }

    pub fn sender(&self) -> broadcast::Sender<LearningEvent> {
        self.sender.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LearningEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl EventSink for EventBus {
    fn publish(&self, event: LearningEvent) {
        let name = event.name();
        match self.sender.send(event) {
            Ok(count) => {
                debug!("{} sent to {} receivers", name, count);
            }
            Err(_) => {
                // No receivers - this is fine during startup/shutdown
                debug!("No receivers for {}", name);
            }
        }
    }
}

impl<T: EventSink + ?Sized> EventSink for Arc<T> {
    fn publish(&self, event: LearningEvent) {
        (**self).publish(event);
    }
}

/// Subscriber that reads engine output from the bus
pub struct EventProcessor {
    receiver: broadcast::Receiver<LearningEvent>,
    name: String,
}

impl EventProcessor {
    pub fn new(bus: &EventBus, name: &str) -> Self {
        Self {
            receiver: bus.subscribe(),
            name: name.to_string(),
        }
    }

    /// Wait for the next event; `None` once the bus is closed
    pub async fn next(&mut self) -> Option<LearningEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    warn!(
                        "Event processor '{}' lagged by {} messages",
                        self.name, count
                    );
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed for processor '{}'", self.name);
                    return None;
                }
            }
        }
    }

    pub fn try_next(&mut self) -> Option<LearningEvent> {
        self.receiver.try_recv().ok()
    }
}

/// Spawn a task that feeds every bus event to `handler`
pub fn spawn_event_handler<F>(
    bus: &EventBus,
    name: &str,
    mut handler: F,
) -> tokio::task::JoinHandle<()>
where
    F: FnMut(LearningEvent) + Send + 'static,
{
    let mut processor = EventProcessor::new(bus, name);
    let name = name.to_string();

    tokio::spawn(async move {
        debug!("Event handler '{}' started", name);
        while let Some(event) = processor.next().await {
            handler(event);
        }
        debug!("Event handler '{}' stopped", name);
    })
}

/// Producer side of the inbound queue
#[derive(Clone)]
pub struct InboundSender {
    sender: mpsc::Sender<InboundEvent>,
}

impl InboundSender {
    /// Enqueue an event, waiting for room
    pub async fn send(&self, event: InboundEvent) -> bool {
        self.sender.send(event).await.is_ok()
    }

    /// Enqueue without waiting; false when full or closed
    pub fn try_send(&self, event: InboundEvent) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(event)) => {
                warn!("Inbound queue full, dropping {}", event.name());
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

/// Create the bounded inbound queue the engine drains
pub fn inbound_channel(capacity: usize) -> (InboundSender, mpsc::Receiver<InboundEvent>) {
    let (sender, receiver) = mpsc::channel(capacity);
    (InboundSender { sender }, receiver)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::types::LearningEvent;

    fn patterns_event(count: usize) -> LearningEvent {
        LearningEvent::PatternsDetected {
            count,
            pattern_ids: vec![],
        }
    }

    #[tokio::test]
    async fn test_event_bus_pubsub() {
        let bus = EventBus::new(10);
        let mut receiver = bus.subscribe();

        bus.publish(patterns_event(3));

        match receiver.recv().await.unwrap() {
            LearningEvent::PatternsDetected { count, .. } => assert_eq!(count, 3),
            other => panic!("Wrong event type: {}", other.name()),
        }
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = EventBus::new(10);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.publish(patterns_event(1));

        assert!(matches!(rx1.recv().await.unwrap(), LearningEvent::PatternsDetected { .. }));
        assert!(matches!(rx2.recv().await.unwrap(), LearningEvent::PatternsDetected { .. }));
    }

    #[test]
    fn test_processor_try_next() {
        let bus = EventBus::new(4);
        let mut processor = EventProcessor::new(&bus, "dashboard");
        assert!(processor.try_next().is_none());

        bus.publish(patterns_event(2));
        assert!(matches!(processor.try_next(), Some(LearningEvent::PatternsDetected { count: 2, .. })));
    }

    #[test]
    fn test_callback_sink() {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let captured = seen.clone();
        let sink = CallbackSink::new(move |event: LearningEvent| {
            captured.lock().push(event.name());
        });

        sink.publish(patterns_event(0));
        assert_eq!(seen.lock().as_slice(), &["learning.patterns_detected"]);
    }

    #[tokio::test]
    async fn test_inbound_queue_try_send_full() {
        let (tx, mut rx) = inbound_channel(1);
        let event = InboundEvent::BotDecision(Default::default());
        assert!(tx.try_send(event.clone()));
        assert!(!tx.try_send(event));
        assert!(rx.recv().await.is_some());
    }
}
