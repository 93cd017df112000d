pub mod algorithms;
pub mod services;

pub use algorithms::{AlgorithmRegistry, OptimizationAlgorithm};
pub use services::{ClientCoordinator, Scheduler};
