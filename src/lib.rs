pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod presentation;
pub mod workloads;

pub use application::algorithms;
pub use application::services;
pub use domain::entities;
pub use domain::stats;
pub use domain::value_objects;
