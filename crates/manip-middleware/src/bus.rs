//! Headless, topic-based publish/subscribe bus for control events.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every message without any single subscriber blocking
//! the others.
//!
//! # Topics
//!
//! | Topic | Typical traffic |
//! |---|---|
//! | [`Topic::ControlEvents`] | Mode changes, brake releases |
//! | [`Topic::SystemAlerts`] | Per-cycle faults reported by the control loop |

use manip_types::Event;
use tokio::sync::broadcast;
use tracing::warn;

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

/// Routing topics on the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Control-mode transitions and actuator setup events.
    ControlEvents,
    /// Faults that caused a cycle phase to be skipped.
    SystemAlerts,
}

/// Shared event bus. Clone it cheaply – all clones share the same underlying
/// broadcast channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    control_events: broadcast::Sender<Event>,
    system_alerts: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new bus with the given per-topic channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (control_events, _) = broadcast::channel(capacity);
        let (system_alerts, _) = broadcast::channel(capacity);
        Self {
            control_events,
            system_alerts,
        }
    }

    /// Publish `event` to the given [`Topic`] channel.
    ///
    /// Returns the number of active receivers that were handed the event;
    /// `0` when nobody is listening, which is a normal condition.
    pub fn publish_to(&self, topic: Topic, event: Event) -> usize {
        self.topic_sender(topic).send(event).unwrap_or(0)
    }

    /// Subscribe to a specific [`Topic`] channel.
    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            receiver: self.topic_sender(topic).subscribe(),
        }
    }

    fn topic_sender(&self, topic: Topic) -> &broadcast::Sender<Event> {
        match topic {
            Topic::ControlEvents => &self.control_events,
            Topic::SystemAlerts => &self.system_alerts,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// An async receiver bound to a single [`Topic`] channel.
///
/// Obtained via [`EventBus::subscribe_to`].
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Wait for the next event on this topic.
    ///
    /// Lagged subscribers skip the dropped events with a warning.  Returns
    /// `None` once the bus has shut down.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(topic = ?self.topic, lagged_by = n, "TopicReceiver lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`TopicReceiver::recv`]; `None` when no event
    /// is pending.
    pub fn try_recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!(topic = ?self.topic, lagged_by = n, "TopicReceiver lagged");
                    continue;
                }
                Err(_) => return None,
            }
        }
    }

    /// The [`Topic`] this receiver is bound to.
    pub fn topic(&self) -> Topic {
        self.topic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use manip_types::EventPayload;

    fn make_event(robot: &str) -> Event {
        Event::new(
            format!("manip-runtime::{robot}"),
            EventPayload::BrakesReleased {
                robot: robot.to_string(),
            },
        )
    }

    #[test]
    fn publish_without_subscribers_returns_zero() {
        let bus = EventBus::default();
        assert_eq!(bus.publish_to(Topic::ControlEvents, make_event("arm")), 0);
    }

    #[tokio::test]
    async fn topic_multiple_subscribers_receive_same_event() {
        let bus = EventBus::default();
        let mut sub1 = bus.subscribe_to(Topic::ControlEvents);
        let mut sub2 = bus.subscribe_to(Topic::ControlEvents);

        let event = make_event("arm");
        assert_eq!(bus.publish_to(Topic::ControlEvents, event.clone()), 2);

        assert_eq!(sub1.recv().await.expect("subscriber 1").id, event.id);
        assert_eq!(sub2.recv().await.expect("subscriber 2").id, event.id);
    }

    #[tokio::test]
    async fn topic_subscriber_does_not_receive_other_topic_events() {
        let bus = EventBus::default();
        let mut alerts = bus.subscribe_to(Topic::SystemAlerts);
        let _control = bus.subscribe_to(Topic::ControlEvents);

        bus.publish_to(Topic::ControlEvents, make_event("arm"));

        let result =
            tokio::time::timeout(std::time::Duration::from_millis(50), alerts.recv()).await;
        assert!(
            result.is_err(),
            "SystemAlerts subscriber must not receive a ControlEvents event"
        );
    }

    #[test]
    fn try_recv_skips_lag_and_drains() {
        let bus = EventBus::new(4);
        let mut sub = bus.subscribe_to(Topic::SystemAlerts);
        for _ in 0..10 {
            bus.publish_to(Topic::SystemAlerts, make_event("arm"));
        }
        let mut drained = 0;
        while sub.try_recv().is_some() {
            drained += 1;
        }
        assert_eq!(drained, 4);
        assert_eq!(sub.topic(), Topic::SystemAlerts);
    }
}
