//! The benchmark contract.
//!
//! A conforming target, run with no arguments:
//!
//! 1. fills its working set from a pure function of array indices,
//! 2. runs its kernel once with no required output,
//! 3. sums its final state, keeps the low 8 bits and exits with that value.
//!
//! The harness treats the resulting exit code as opaque. Comparing it to a
//! known-good value is an offline step.

use std::process::ExitCode;

pub mod gemm;
pub mod jacobi1d;

pub use gemm::Gemm;
pub use jacobi1d::Jacobi1d;

/// One benchmark program, split into its three phases.
pub trait Kernel {
    const NAME: &'static str;

    /// Deterministic initialization; no randomness, no environment.
    fn init(&mut self);

    /// The compute phase.
    fn compute(&mut self);

    /// Low 8 bits of the final state's sum.
    fn checksum(&self) -> u8;
}

/// Run the phases in order and return the checksum.
pub fn run_kernel<K: Kernel>(kernel: &mut K) -> u8 {
    kernel.init();
    kernel.compute();
    kernel.checksum()
}

/// `main` body for a contract binary.
pub fn exit_with_checksum<K: Kernel>(mut kernel: K) -> ExitCode {
    ExitCode::from(run_kernel(&mut kernel))
}

/// Wrapping 32-bit sum masked to 8 bits.
pub fn checksum_low_byte<'a>(values: impl IntoIterator<Item = &'a i32>) -> u8 {
    let sum = values.into_iter().fold(0i32, |acc, v| acc.wrapping_add(*v));
    (sum & 0xFF) as u8
}
