//! Event bus and typed event stream for the agent execution core.
//!
//! This crate provides:
//! - The typed [`ExecutionEvent`] set emitted by a running execution
//! - A broadcast-based [`EventBus`] for async subscribers
//! - A [`SubscriberRegistry`] for synchronous, fire-and-forget handlers
//! - The [`ExecutionSnapshot`] subscribers can read for current state
//!
//! # Architecture
//!
//! Events are published to an [`EventBus`], which broadcasts them to every
//! subscriber. There are two ways to subscribe:
//!
//! 1. **Async receivers** — `bus.subscribe()` returns an [`EventReceiver`]
//!    that can be polled with `.recv().await`.
//! 2. **Synchronous subscribers** — register an [`EventSubscriber`] with
//!    `bus.registry()` for an inline, non-blocking callback.
//!
//! # Example
//!
//! ```rust
//! use loopcore_events::{EventBus, EventMetadata, ExecutionEvent};
//!
//! # async fn example() {
//! let bus = EventBus::new();
//! let mut receiver = bus.subscribe();
//!
//! bus.publish(ExecutionEvent::ExecutionStart {
//!     metadata: EventMetadata::new("engine"),
//! });
//!
//! let event = receiver.recv().await.unwrap();
//! assert_eq!(event.event_type(), "execution:start");
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod bus;
mod event;
mod snapshot;
mod subscriber;

pub use bus::{DEFAULT_CHANNEL_CAPACITY, EventBus, EventReceiver};
pub use event::{EventMetadata, ExecutionEvent, ExecutionState};
pub use snapshot::{
    ExecutionSnapshot, ExecutionStats, PHRASE_ROTATE_MAX, PHRASE_ROTATE_MIN, THINKING_PHRASES,
    TOOL_EXECUTING_PHRASES, ToolRecord, ToolRecordStatus, phrase_vocabulary_for,
};
pub use subscriber::{
    EventFilter, EventSubscriber, FilterSubscriber, SubscriberId, SubscriberRegistry,
};
