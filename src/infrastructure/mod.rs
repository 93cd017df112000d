pub mod repositories;
pub mod worker;

pub use repositories::{InMemoryJobStore, SqliteJobStore};
pub use worker::InProcessWorker;
