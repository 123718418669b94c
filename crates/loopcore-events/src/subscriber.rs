//! Synchronous subscriber registry.
//!
//! Alongside the async [`crate::EventReceiver`], callers that want an
//! immediate callback (no polling, no await point) can register an
//! [`EventSubscriber`] with the bus's [`SubscriberRegistry`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::event::ExecutionEvent;

/// Identifies one registered synchronous subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

/// A synchronous event handler, invoked inline by the publishing thread.
///
/// Handlers must not block — the contract is fire-and-forget, matching a
/// plain `on(event) -> ()` callback rather than an async trait.
pub trait EventSubscriber: Send + Sync {
    /// Handle one event.
    fn on(&self, event: &Arc<ExecutionEvent>);
}

/// An [`EventSubscriber`] built from a closure and an [`EventFilter`],
/// invoking the closure only for events the filter accepts.
pub struct FilterSubscriber<F> {
    filter: EventFilter,
    handler: F,
}

impl<F> FilterSubscriber<F>
where
    F: Fn(&Arc<ExecutionEvent>) + Send + Sync,
{
    /// Build a subscriber that only forwards events matching `filter`.
    pub fn new(filter: EventFilter, handler: F) -> Self {
        Self { filter, handler }
    }
}

impl<F> EventSubscriber for FilterSubscriber<F>
where
    F: Fn(&Arc<ExecutionEvent>) + Send + Sync,
{
    fn on(&self, event: &Arc<ExecutionEvent>) {
        if self.filter.matches(event) {
            (self.handler)(event);
        }
    }
}

/// A predicate over an event's `event_type()`, used to scope a
/// [`FilterSubscriber`] to a subset of the stream.
#[derive(Clone)]
pub enum EventFilter {
    /// Accept every event.
    All,
    /// Accept only events whose type starts with this prefix (e.g. `"tool:"`).
    Prefix(String),
    /// Accept only events with exactly this type.
    Exact(String),
}

impl EventFilter {
    /// Whether `event` is accepted by this filter.
    #[must_use]
    pub fn matches(&self, event: &ExecutionEvent) -> bool {
        match self {
            Self::All => true,
            Self::Prefix(prefix) => event.event_type().starts_with(prefix.as_str()),
            Self::Exact(exact) => event.event_type() == exact.as_str(),
        }
    }
}

impl fmt::Debug for EventFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "EventFilter::All"),
            Self::Prefix(p) => write!(f, "EventFilter::Prefix({p:?})"),
            Self::Exact(e) => write!(f, "EventFilter::Exact({e:?})"),
        }
    }
}

struct Entry {
    id: SubscriberId,
    subscriber: Box<dyn EventSubscriber>,
}

/// Registry of synchronous subscribers, notified inline by
/// [`crate::EventBus::publish`].
#[derive(Default)]
pub struct SubscriberRegistry {
    next_id: AtomicU64,
    entries: Mutex<Vec<Entry>>,
}

impl fmt::Debug for SubscriberRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self.entries.lock().map(|e| e.len()).unwrap_or(0);
        f.debug_struct("SubscriberRegistry").field("count", &count).finish()
    }
}

impl SubscriberRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber and return an id that can later be passed to
    /// [`Self::unsubscribe`].
    pub fn subscribe(&self, subscriber: Box<dyn EventSubscriber>) -> SubscriberId {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut entries = self.entries.lock().expect("subscriber registry poisoned");
        entries.push(Entry { id, subscriber });
        id
    }

    /// Remove a previously registered subscriber. No-op if it is already
    /// gone — a subscriber may unsubscribe at any time, including from
    /// within its own callback on a re-entrant publish.
    pub fn unsubscribe(&self, id: SubscriberId) {
        let mut entries = self.entries.lock().expect("subscriber registry poisoned");
        entries.retain(|entry| entry.id != id);
    }

    /// Notify every registered subscriber, in registration order.
    pub fn notify(&self, event: &Arc<ExecutionEvent>) {
        let entries = self.entries.lock().expect("subscriber registry poisoned");
        for entry in entries.iter() {
            entry.subscriber.on(event);
        }
    }

    /// Number of currently registered subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().expect("subscriber registry poisoned").len()
    }

    /// Whether there are no registered subscribers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    use super::*;
    use crate::event::EventMetadata;

    struct CountingSubscriber(Arc<AtomicUsize>);

    impl EventSubscriber for CountingSubscriber {
        fn on(&self, _event: &Arc<ExecutionEvent>) {
            self.0.fetch_add(1, AtomicOrdering::Relaxed);
        }
    }

    #[test]
    fn notify_reaches_every_subscriber() {
        let registry = SubscriberRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));
        registry.subscribe(Box::new(CountingSubscriber(Arc::clone(&count))));
        registry.subscribe(Box::new(CountingSubscriber(Arc::clone(&count))));

        let event = Arc::new(ExecutionEvent::ExecutionStart {
            metadata: EventMetadata::new("test"),
        });
        registry.notify(&event);

        assert_eq!(count.load(AtomicOrdering::Relaxed), 2);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let registry = SubscriberRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));
        let id = registry.subscribe(Box::new(CountingSubscriber(Arc::clone(&count))));
        registry.unsubscribe(id);

        let event = Arc::new(ExecutionEvent::ExecutionStart {
            metadata: EventMetadata::new("test"),
        });
        registry.notify(&event);

        assert_eq!(count.load(AtomicOrdering::Relaxed), 0);
    }

    #[test]
    fn filter_subscriber_only_forwards_matching_prefix() {
        let registry = SubscriberRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&count);
        registry.subscribe(Box::new(FilterSubscriber::new(
            EventFilter::Prefix("tool:".to_string()),
            move |_event| {
                inner.fetch_add(1, AtomicOrdering::Relaxed);
            },
        )));

        registry.notify(&Arc::new(ExecutionEvent::ExecutionStart {
            metadata: EventMetadata::new("test"),
        }));
        assert_eq!(count.load(AtomicOrdering::Relaxed), 0);

        registry.notify(&Arc::new(ExecutionEvent::ToolExecuting {
            call_id: "call_1".to_string(),
            name: "bash".to_string(),
            metadata: EventMetadata::new("test"),
        }));
        assert_eq!(count.load(AtomicOrdering::Relaxed), 1);
    }
}
