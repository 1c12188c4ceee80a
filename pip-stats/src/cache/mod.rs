//! Document store access, size ceiling and staleness policy

pub mod ceiling;
pub mod memory;
pub mod sqlite;
pub mod staleness;
pub mod store;

pub use ceiling::{fit_aggregate, fit_raw_author, serialized_size};
pub use memory::MemoryDocumentStore;
pub use sqlite::SqliteDocumentStore;
pub use staleness::{StalenessCheck, StalenessResolver};
pub use store::{prefix_end, CacheStore, END_SENTINEL};
