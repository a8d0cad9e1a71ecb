//! Storage traits and implementations
//!
//! The sync engine and the job service only see [`TrackerStore`]; SQLite
//! backs the real application and the in-memory store backs tests.

mod memory;
mod sqlite;
mod traits;

pub use memory::InMemoryTrackerStore;
pub use sqlite::SqliteTrackerStore;
pub use traits::TrackerStore;
