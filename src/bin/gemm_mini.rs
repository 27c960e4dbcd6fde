use contract_harness::contract::{exit_with_checksum, Gemm};
use std::process::ExitCode;

fn main() -> ExitCode {
    exit_with_checksum(Gemm::new())
}
