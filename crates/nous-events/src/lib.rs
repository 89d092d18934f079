//! Event persistence and live fan-out.
//!
//! [`EventStore`] is the ordered, append-only log addressed by 0-based
//! offset. [`EventJournal`] pairs a store with an [`EventStreamHub`] so
//! producers append once and subscribers see the same envelope live.

mod file;
mod journal;
mod memory;
mod store;
mod stream;

pub use file::{Durability, FileEventStore};
pub use journal::EventJournal;
pub use memory::InMemoryEventStore;
pub use store::{EventStore, ReadQuery};
pub use stream::{EnvelopeBridge, EventStreamHub};
