pub mod contract;
pub mod error;
pub mod fingerprint;
pub mod harness;
pub mod instructions;
pub mod report;
pub mod runner;
pub mod schema;

pub use error::{HarnessError, Result};
pub use harness::{measure, BenchmarkTarget, MeasureConfig, MeasurementResult};
pub use runner::{ProcessRunner, SubprocessRunner, TrialOutcome};
