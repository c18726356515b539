//! Shared key-value state store.
//!
//! Records are hashes (`key -> field -> value`). Every mutation that more
//! than one worker can race on goes through one of the atomic primitives:
//! [`StateStore::set_if_absent`], [`StateStore::compare_and_set`] or
//! [`StateStore::increment`].

mod memory;
mod sqlite;
mod traits;

pub use memory::InMemoryStateStore;
pub use sqlite::SqliteStateStore;
pub use traits::{StateStore, StoreError};
