//! Pipeline stages after parsing, and the run that ties them together.
//!
//! - `run_build`: one full crawl-and-build run
//! - `IndexBuilder`: derived indexes and the manifest
//! - `CircuitBreaker`: aggregate publish guards
//! - `DiffCalculator`: change summary against the last good build

pub mod build;
pub mod circuit_breaker;
pub mod diff;
pub mod index;

pub use build::{BuildOptions, BuildOutcome, run_build, save_report};
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerResult};
pub use diff::{DiffCalculator, calculate_diff};
pub use index::{BuiltIndex, IndexBuilder, ManifestInfo, build_index};
