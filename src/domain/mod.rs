pub mod entities;
pub mod error;
pub mod repositories;
pub mod stats;
pub mod value_objects;
pub mod workers;

pub use error::{CoreError, CoreResult};
