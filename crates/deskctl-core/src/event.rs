// ── Published events ──
//
// Everything the session observes or reports fans out through one hub:
// a broadcast channel for async consumers plus synchronous observers.
// Neither kind of subscriber is required.

use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;
use tokio::sync::broadcast;

use deskctl_proto::{DisplayModel, KeyModuleModel, KeyRecord, LampColour, LampMode, ToneRecord};

use crate::assertions::AssertionFailure;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Lamp state change for one key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LampChange {
    pub key: i32,
    /// `None` for a mode code outside the known table.
    pub mode: Option<LampMode>,
    pub colour: Option<LampColour>,
}

/// Call-state change for one (device, index) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallChange {
    pub device: String,
    pub index: String,
    pub state: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
}

/// Events published by a session.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum PhoneEvent {
    Lamp(LampChange),
    Call(CallChange),
    Display(Arc<DisplayModel>),
    Key(KeyRecord),
    Tone(ToneRecord),
    KeyModule(Arc<KeyModuleModel>),
    /// First unsolicited event of the session arrived.
    Subscribed,
    Log(String),
    AssertionFailed(AssertionFailure),
    Traffic { direction: Direction, message: String },
}

/// Synchronous event observer.
///
/// Called on the session's reader task for decoded events, so
/// implementations must return quickly.
pub trait Observer: Send + Sync {
    fn on_event(&self, event: &PhoneEvent);
}

impl<F> Observer for F
where
    F: Fn(&PhoneEvent) + Send + Sync,
{
    fn on_event(&self, event: &PhoneEvent) {
        self(event);
    }
}

pub(crate) struct EventHub {
    tx: broadcast::Sender<Arc<PhoneEvent>>,
    observers: RwLock<Vec<Arc<dyn Observer>>>,
}

impl EventHub {
    pub(crate) fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            tx,
            observers: RwLock::new(Vec::new()),
        }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<Arc<PhoneEvent>> {
        self.tx.subscribe()
    }

    pub(crate) fn add_observer(&self, observer: Arc<dyn Observer>) {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    pub(crate) fn publish(&self, event: PhoneEvent) {
        // Observers may register further observers; call them on a copy.
        let observers = self
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for observer in &observers {
            observer.on_event(&event);
        }
        // No receivers is fine.
        let _ = self.tx.send(Arc::new(event));
    }

    pub(crate) fn log(&self, message: impl Into<String>) {
        self.publish(PhoneEvent::Log(message.into()));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[tokio::test]
    async fn events_reach_channel_and_observers() {
        let hub = EventHub::new();
        let mut rx = hub.subscribe();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        hub.add_observer(Arc::new(move |event: &PhoneEvent| {
            if let PhoneEvent::Log(msg) = event {
                sink.lock().unwrap().push(msg.clone());
            }
        }));

        hub.log("hello");

        let event = rx.recv().await.unwrap();
        assert!(matches!(&*event, PhoneEvent::Log(m) if m == "hello"));
        assert_eq!(*seen.lock().unwrap(), vec!["hello".to_owned()]);
    }

    #[test]
    fn observer_can_register_another_observer() {
        let hub = Arc::new(EventHub::new());
        let late_calls = Arc::new(Mutex::new(0));

        let registrar = Arc::downgrade(&hub);
        let counter = Arc::clone(&late_calls);
        let registered = Mutex::new(false);
        hub.add_observer(Arc::new(move |_: &PhoneEvent| {
            let mut done = registered.lock().unwrap();
            if *done {
                return;
            }
            *done = true;
            let counter = Arc::clone(&counter);
            registrar
                .upgrade()
                .unwrap()
                .add_observer(Arc::new(move |_: &PhoneEvent| {
                    *counter.lock().unwrap() += 1;
                }));
        }));

        hub.log("first");
        assert_eq!(*late_calls.lock().unwrap(), 0);
        hub.log("second");
        assert_eq!(*late_calls.lock().unwrap(), 1);
    }

    #[test]
    fn publishing_without_subscribers_is_harmless() {
        let hub = EventHub::new();
        hub.publish(PhoneEvent::Subscribed);
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let event = PhoneEvent::Call(CallChange {
            device: "1000".into(),
            index: "1".into(),
            state: "delivered".into(),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "call");
        assert_eq!(json["data"]["state"], "delivered");
    }
}
