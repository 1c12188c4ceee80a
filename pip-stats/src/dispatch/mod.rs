//! Refresh task dispatch and regional load spreading

pub mod dispatcher;
pub mod region;

pub use dispatcher::{sample_from_pool, sanitize_task_id, task_name, EnqueueOutcome, TaskDispatcher};
pub use region::{region_endpoint, select_region};
