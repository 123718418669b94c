//! Commonly used types for convenient import.
//!
//! ```rust
//! use loopcore_events::prelude::*;
//!
//! # async fn example() {
//! let bus = EventBus::new();
//! let mut receiver = bus.subscribe();
//! bus.publish(ExecutionEvent::ExecutionStart {
//!     metadata: EventMetadata::new("engine"),
//! });
//! let event = receiver.recv().await.unwrap();
//! assert_eq!(event.event_type(), "execution:start");
//! # }
//! ```

pub use crate::{DEFAULT_CHANNEL_CAPACITY, EventBus, EventReceiver};
pub use crate::{EventMetadata, ExecutionEvent, ExecutionState};
pub use crate::{ExecutionSnapshot, ExecutionStats, ToolRecord, ToolRecordStatus};
pub use crate::{EventFilter, EventSubscriber, FilterSubscriber, SubscriberId, SubscriberRegistry};
