use contract_harness::contract::{exit_with_checksum, Jacobi1d};
use std::process::ExitCode;

fn main() -> ExitCode {
    exit_with_checksum(Jacobi1d::new())
}
