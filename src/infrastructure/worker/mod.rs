pub mod in_process;

pub use in_process::{spawn_completion_router, InProcessWorker};
