//! Topic-based message bus.
//!
//! Durable named topics with consumer groups and at-least-once delivery: a
//! claimed message that is not acknowledged within the visibility timeout is
//! handed out again to the same group.

mod config;
mod memory;
mod traits;

pub use config::BusConfig;
pub use memory::InMemoryBus;
pub use traits::{AckHandle, BusError, Delivery, Message, MessageBus, MessageId, Subscription};
