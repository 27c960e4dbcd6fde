use clap::Parser;
use contract_harness::fingerprint;
use contract_harness::harness::{
    measure_with_progress, BenchmarkTarget, MeasureConfig, Phase, DEFAULT_ASSUMED_GHZ,
    DEFAULT_ITERATIONS, DEFAULT_WARMUP, OVERHEAD_NOTE,
};
use contract_harness::instructions::InstructionTable;
use contract_harness::report;
use contract_harness::runner::SubprocessRunner;
use contract_harness::schema::{ContractReport, RunMeta};
use contract_harness::{HarnessError, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "contract-harness", version)]
#[command(about = "Times a checksum-contract benchmark over repeated subprocess runs (JSON summary on stdout)")]
#[command(
    after_help = "Results include process startup overhead.\nFor accurate cycle counts, measure with hardware performance counters."
)]
struct Args {
    /// Benchmark executable. Run with no arguments; its output is discarded.
    #[arg(value_name = "BENCHMARK")]
    benchmark: PathBuf,

    /// Number of timed trials.
    #[arg(value_name = "ITERATIONS", allow_negative_numbers = true)]
    iterations: Option<i64>,

    /// Discarded trials before timing starts.
    #[arg(long, default_value_t = DEFAULT_WARMUP)]
    warmup: u64,

    /// Assumed clock frequency used for the cycle estimate.
    #[arg(long, default_value_t = DEFAULT_ASSUMED_GHZ)]
    ghz: f64,

    /// TOML manifest of instruction counts (replaces the built-in table).
    #[arg(long, value_name = "FILE")]
    instructions: Option<PathBuf>,

    /// Kill any trial running longer than this. Unbounded when omitted.
    #[arg(long, value_name = "MS", value_parser = clap::value_parser!(u64).range(1..))]
    timeout_ms: Option<u64>,

    /// Keep every timed trial's exit code instead of only the last.
    #[arg(long, default_value_t = false)]
    record_exit_codes: bool,

    /// Also write the full JSON report to this file.
    #[arg(long, value_name = "FILE")]
    out: Option<PathBuf>,

    /// Log filter for diagnostics (RUST_LOG takes precedence).
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn report_error(path: &Path, source: std::io::Error) -> HarnessError {
    HarnessError::Report {
        path: path.to_path_buf(),
        source,
    }
}

fn run(args: &Args) -> Result<()> {
    // Every configuration check happens before the first spawn.
    let iterations = args.iterations.unwrap_or(DEFAULT_ITERATIONS as i64);
    let target = BenchmarkTarget::new(&args.benchmark, iterations)?;
    let cfg = MeasureConfig {
        warmup: args.warmup,
        assumed_ghz: args.ghz,
        record_exit_codes: args.record_exit_codes,
    };
    cfg.validate()?;
    let table = match &args.instructions {
        Some(path) => InstructionTable::load(path)?,
        None => InstructionTable::builtin(),
    };
    let mut runner = match args.timeout_ms {
        Some(ms) => SubprocessRunner::with_timeout(Duration::from_millis(ms)),
        None => SubprocessRunner::new(),
    };
    let report_file = match &args.out {
        Some(path) => Some((
            path.as_path(),
            File::create(path).map_err(|e| report_error(path, e))?,
        )),
        None => None,
    };

    eprintln!("{}", report::render_header(&target.name(), target.iterations()));

    let result = measure_with_progress(&target, &cfg, &mut runner, &table, |phase| match phase {
        Phase::WarmingUp => eprintln!("Warming up..."),
        Phase::Running => eprintln!("Running benchmark..."),
    })?;

    eprintln!();
    eprint!("{}", report::render_results(&result));

    println!("{}", result.summary().to_line()?);

    if let Some((path, file)) = report_file {
        let target_sha256 = match fingerprint::sha256_hex(target.path()) {
            Ok(hex) => Some(hex),
            Err(e) => {
                warn!(error = %e, "could not fingerprint target");
                None
            }
        };
        let full = ContractReport {
            run: RunMeta::current(),
            target_sha256,
            measurement: result,
            note: OVERHEAD_NOTE.to_string(),
        };
        let json = serde_json::to_string_pretty(&full)?;
        let mut writer = BufWriter::new(file);
        writer
            .write_all(json.as_bytes())
            .and_then(|_| writer.flush())
            .map_err(|e| report_error(path, e))?;
    }

    Ok(())
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            // --help and --version are not failures.
            let code = if e.use_stderr() { 1 } else { 0 };
            let _ = e.print();
            return ExitCode::from(code);
        }
    };

    init_logging(&args.log_level);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}
