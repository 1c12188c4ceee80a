//! External collaborators: source provider, warehouse, push queue

pub mod queue;
pub mod source;
pub mod warehouse;

pub use queue::{PushQueue, QueueError, SqliteTaskQueue, TaskState, WorkQueue};
pub use source::{HttpSourceProvider, SourceError, SourceProvider};
pub use warehouse::{CandidateSource, CoauthorCandidateSource, StoreWarehouse, Warehouse, WarehouseRecord};
