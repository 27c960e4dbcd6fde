use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{HarnessError, Result};
use crate::instructions::InstructionTable;
use crate::runner::{ProcessRunner, TrialOutcome};
use crate::schema::SummaryRecord;

/// Discarded trials before timing starts.
pub const DEFAULT_WARMUP: u64 = 10;

/// Timed trials when the caller does not say.
pub const DEFAULT_ITERATIONS: u64 = 1_000;

/// Assumed core clock, used only to turn nanoseconds into an estimated cycle count.
pub const DEFAULT_ASSUMED_GHZ: f64 = 3.5;

/// Disclosure attached to every summary.
pub const OVERHEAD_NOTE: &str = "includes process overhead";

/// Upper bound on the exit-code buffer reserved before the timed batch;
/// larger runs grow it as trials complete.
const MAX_RESERVED_EXIT_CODES: u64 = 1 << 16;

/// A validated executable plus the number of timed trials to run against it.
#[derive(Clone, Debug)]
pub struct BenchmarkTarget {
    path: PathBuf,
    iterations: u64,
}

impl BenchmarkTarget {
    /// Pre-flight checks. Nothing is spawned if this fails.
    pub fn new(path: impl Into<PathBuf>, iterations: i64) -> Result<Self> {
        let path = path.into();
        if iterations < 1 {
            return Err(HarnessError::NonPositiveIterations(iterations));
        }
        if !is_executable(&path) {
            return Err(HarnessError::NotExecutable(path));
        }
        Ok(Self {
            path,
            iterations: iterations as u64,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The path as given, used for reporting and instruction lookup.
    ///
    /// Bytes that are not valid UTF-8 are replaced with U+FFFD, so for such
    /// paths the name differs from [`path`](Self::path); spawning always
    /// uses the exact path.
    pub fn name(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }

    pub fn iterations(&self) -> u64 {
        self.iterations
    }
}

/// Regular file the current user may execute (`access(2)` with `X_OK`).
#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use rustix::fs::{access, Access};
    fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
        && access(path, Access::EXEC_OK).is_ok()
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
}

#[derive(Clone, Debug)]
pub struct MeasureConfig {
    pub warmup: u64,
    pub assumed_ghz: f64,
    /// Keep every timed trial's exit code, not just the last.
    pub record_exit_codes: bool,
}

impl Default for MeasureConfig {
    fn default() -> Self {
        Self {
            warmup: DEFAULT_WARMUP,
            assumed_ghz: DEFAULT_ASSUMED_GHZ,
            record_exit_codes: false,
        }
    }
}

impl MeasureConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.assumed_ghz.is_finite() && self.assumed_ghz > 0.0) {
            return Err(HarnessError::InvalidFrequency(self.assumed_ghz));
        }
        Ok(())
    }
}

/// Progress markers surfaced to the caller between phases.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    WarmingUp,
    Running,
}

/// Raw output of one warmup + timed batch.
#[derive(Clone, Debug)]
pub struct TimedBatch {
    pub iters: u64,
    pub warmup_iters: u64,
    pub total_ns: u128,
    pub ns_per_iter: f64,
    pub last: TrialOutcome,
    pub exit_codes: Option<Vec<i32>>,
    /// Timed trials that did not run to completion.
    pub incomplete: u64,
}

/// Run `warmup_iters` discarded trials, then time `iters` trials as a single
/// interval. No per-trial timestamps are taken.
pub fn time_trials(
    iters: u64,
    warmup_iters: u64,
    record_exit_codes: bool,
    mut on_phase: impl FnMut(Phase),
    mut trial: impl FnMut() -> TrialOutcome,
) -> TimedBatch {
    on_phase(Phase::WarmingUp);
    for _ in 0..warmup_iters {
        trial();
    }

    on_phase(Phase::Running);
    let mut exit_codes = record_exit_codes.then(|| Vec::with_capacity(reserved_exit_codes(iters)));
    let mut last = TrialOutcome::Exited(0);
    let mut incomplete = 0;

    // Instant carries the platform's tick-to-nanosecond conversion.
    let start = Instant::now();
    for _ in 0..iters {
        last = trial();
        if !last.completed() {
            incomplete += 1;
        }
        if let Some(codes) = exit_codes.as_mut() {
            codes.push(last.exit_code());
        }
    }
    let elapsed = start.elapsed();

    let total_ns = elapsed.as_nanos();
    let denom = iters.max(1) as f64;
    let ns_per_iter = (total_ns as f64) / denom;

    TimedBatch {
        iters,
        warmup_iters,
        total_ns,
        ns_per_iter,
        last,
        exit_codes,
        incomplete,
    }
}

fn reserved_exit_codes(iters: u64) -> usize {
    iters.min(MAX_RESERVED_EXIT_CODES) as usize
}

/// Derived, read-only summary of one harness invocation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MeasurementResult {
    pub name: String,
    pub iterations: u64,
    pub warmup: u64,

    pub total_ns: u128,
    pub avg_ns: f64,
    pub avg_us: f64,
    pub avg_ms: f64,

    pub assumed_ghz: f64,
    pub est_cycles: f64,
    pub instructions: u64,
    /// Table pattern that supplied `instructions`; `None` means the fallback
    /// was used and `cpi` carries no information.
    pub instruction_pattern: Option<String>,
    pub cpi: f64,

    /// Exit code of the chronologically last timed trial.
    pub exit_code: i32,
    pub exit_codes: Option<Vec<i32>>,
    pub incomplete_trials: u64,
}

impl MeasurementResult {
    pub fn total_ms(&self) -> f64 {
        self.total_ns as f64 / 1_000_000.0
    }

    pub fn summary(&self) -> SummaryRecord {
        SummaryRecord {
            name: self.name.clone(),
            iterations: self.iterations,
            avg_ms: self.avg_ms,
            exit_code: self.exit_code,
            note: OVERHEAD_NOTE.to_string(),
        }
    }
}

pub fn measure<R: ProcessRunner + ?Sized>(
    target: &BenchmarkTarget,
    cfg: &MeasureConfig,
    runner: &mut R,
    table: &InstructionTable,
) -> Result<MeasurementResult> {
    measure_with_progress(target, cfg, runner, table, |_| {})
}

/// Warmup, timed batch, derived metrics. Per-trial failures never abort
/// the run; they only show up in the exit codes.
pub fn measure_with_progress<R: ProcessRunner + ?Sized>(
    target: &BenchmarkTarget,
    cfg: &MeasureConfig,
    runner: &mut R,
    table: &InstructionTable,
    mut on_phase: impl FnMut(Phase),
) -> Result<MeasurementResult> {
    cfg.validate()?;

    let name = target.name();
    let path = target.path();

    let batch = time_trials(
        target.iterations(),
        cfg.warmup,
        cfg.record_exit_codes,
        |phase| {
            info!(benchmark = %name, ?phase, "phase start");
            on_phase(phase);
        },
        || runner.run_once(path),
    );

    if batch.incomplete > 0 {
        warn!(
            benchmark = %name,
            incomplete = batch.incomplete,
            "some timed trials did not run to completion"
        );
    }

    let avg_ns = batch.ns_per_iter;
    let est_cycles = avg_ns * cfg.assumed_ghz;
    let lookup = table.lookup(&name);
    if lookup.is_fallback() {
        warn!(
            benchmark = %name,
            instructions = lookup.instructions,
            "no instruction count known; CPI is not meaningful"
        );
    }
    let cpi = est_cycles / lookup.instructions as f64;

    info!(
        benchmark = %name,
        total_ns = %batch.total_ns,
        avg_ns,
        exit_code = batch.last.exit_code(),
        "measurement complete"
    );

    Ok(MeasurementResult {
        name,
        iterations: batch.iters,
        warmup: batch.warmup_iters,
        total_ns: batch.total_ns,
        avg_ns,
        avg_us: avg_ns / 1_000.0,
        avg_ms: avg_ns / 1_000_000.0,
        assumed_ghz: cfg.assumed_ghz,
        est_cycles,
        instructions: lookup.instructions,
        instruction_pattern: lookup.pattern,
        cpi,
        exit_code: batch.last.exit_code(),
        exit_codes: batch.exit_codes,
        incomplete_trials: batch.incomplete,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{ABNORMAL_EXIT, LAUNCH_FAILED_EXIT};
    use std::collections::VecDeque;
    use tempfile::tempdir;

    /// Replays scripted outcomes and records every launch.
    struct ScriptedRunner {
        outcomes: VecDeque<TrialOutcome>,
        default: TrialOutcome,
        launches: Vec<PathBuf>,
    }

    impl ScriptedRunner {
        fn constant(outcome: TrialOutcome) -> Self {
            Self {
                outcomes: VecDeque::new(),
                default: outcome,
                launches: Vec::new(),
            }
        }

        fn sequence(outcomes: impl IntoIterator<Item = TrialOutcome>) -> Self {
            Self {
                outcomes: outcomes.into_iter().collect(),
                default: TrialOutcome::Exited(0),
                launches: Vec::new(),
            }
        }
    }

    impl ProcessRunner for ScriptedRunner {
        fn run_once(&mut self, path: &Path) -> TrialOutcome {
            self.launches.push(path.to_path_buf());
            self.outcomes.pop_front().unwrap_or(self.default)
        }
    }

    #[cfg(unix)]
    fn executable(dir: &Path, name: &str) -> PathBuf {
        crate::runner::tests::write_script(dir, name, "exit 0")
    }

    #[cfg(not(unix))]
    fn executable(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, b"").unwrap();
        path
    }

    #[test]
    fn test_launch_count_is_warmup_plus_trials() {
        let dir = tempdir().unwrap();
        let path = executable(dir.path(), "bench");
        for trials in [1_i64, 5, 37] {
            let target = BenchmarkTarget::new(&path, trials).unwrap();
            let mut runner = ScriptedRunner::constant(TrialOutcome::Exited(0));
            let result = measure(
                &target,
                &MeasureConfig::default(),
                &mut runner,
                &InstructionTable::builtin(),
            )
            .unwrap();
            assert_eq!(runner.launches.len() as u64, DEFAULT_WARMUP + trials as u64);
            assert!(runner.launches.iter().all(|p| p == &path));
            assert_eq!(result.iterations, trials as u64);
            assert_eq!(result.warmup, DEFAULT_WARMUP);
        }
    }

    #[test]
    fn test_reports_last_timed_exit_code() {
        let dir = tempdir().unwrap();
        let path = executable(dir.path(), "bench");
        let target = BenchmarkTarget::new(&path, 3).unwrap();

        let mut outcomes = vec![TrialOutcome::Exited(9); DEFAULT_WARMUP as usize];
        outcomes.extend([
            TrialOutcome::Abnormal,
            TrialOutcome::Exited(1),
            TrialOutcome::Exited(5),
        ]);
        let mut runner = ScriptedRunner::sequence(outcomes);
        let result = measure(
            &target,
            &MeasureConfig::default(),
            &mut runner,
            &InstructionTable::builtin(),
        )
        .unwrap();

        assert_eq!(result.exit_code, 5);
        assert_eq!(result.incomplete_trials, 1);
        assert!(result.exit_codes.is_none());
    }

    #[test]
    fn test_single_trial_ignores_warmup_codes() {
        let dir = tempdir().unwrap();
        let path = executable(dir.path(), "bench");
        let target = BenchmarkTarget::new(&path, 1).unwrap();

        let mut outcomes = vec![TrialOutcome::LaunchFailed; DEFAULT_WARMUP as usize];
        outcomes.push(TrialOutcome::Exited(77));
        let mut runner = ScriptedRunner::sequence(outcomes);
        let result = measure(
            &target,
            &MeasureConfig::default(),
            &mut runner,
            &InstructionTable::builtin(),
        )
        .unwrap();

        assert_eq!(result.exit_code, 77);
        assert_eq!(result.incomplete_trials, 0);
    }

    #[test]
    fn test_sentinel_flows_through_when_last() {
        let dir = tempdir().unwrap();
        let path = executable(dir.path(), "bench");
        let target = BenchmarkTarget::new(&path, 2).unwrap();

        let mut runner = ScriptedRunner::constant(TrialOutcome::LaunchFailed);
        let result = measure(
            &target,
            &MeasureConfig::default(),
            &mut runner,
            &InstructionTable::builtin(),
        )
        .unwrap();
        assert_eq!(result.exit_code, LAUNCH_FAILED_EXIT);
        assert_eq!(result.incomplete_trials, 2);
    }

    #[test]
    fn test_record_exit_codes_keeps_timed_trials_only() {
        let dir = tempdir().unwrap();
        let path = executable(dir.path(), "bench");
        let target = BenchmarkTarget::new(&path, 4).unwrap();

        let mut outcomes = vec![TrialOutcome::Exited(200); 2];
        outcomes.extend([
            TrialOutcome::Exited(1),
            TrialOutcome::Exited(2),
            TrialOutcome::Abnormal,
            TrialOutcome::Exited(4),
        ]);
        let mut runner = ScriptedRunner::sequence(outcomes);
        let cfg = MeasureConfig {
            warmup: 2,
            record_exit_codes: true,
            ..Default::default()
        };
        let result = measure(&target, &cfg, &mut runner, &InstructionTable::builtin()).unwrap();

        assert_eq!(runner.launches.len(), 6);
        assert_eq!(result.exit_codes, Some(vec![1, 2, ABNORMAL_EXIT, 4]));
        assert_eq!(result.exit_code, 4);
    }

    #[test]
    fn test_derived_metrics_are_consistent() {
        let dir = tempdir().unwrap();
        let path = executable(dir.path(), "dependency_chain");
        let target = BenchmarkTarget::new(&path, 8).unwrap();
        let mut runner = ScriptedRunner::constant(TrialOutcome::Exited(0));
        let cfg = MeasureConfig {
            assumed_ghz: 2.0,
            ..Default::default()
        };
        let result = measure(&target, &cfg, &mut runner, &InstructionTable::builtin()).unwrap();

        let avg_ns = result.total_ns as f64 / 8.0;
        assert!((result.avg_ns - avg_ns).abs() < 1e-6);
        assert!((result.avg_ms - result.total_ms() / 8.0).abs() < 1e-9);
        assert!((result.avg_us * 1_000.0 - result.avg_ns).abs() < 1e-6);
        assert!((result.est_cycles - avg_ns * 2.0).abs() < 1e-6);
        assert_eq!(result.instructions, 24);
        assert_eq!(result.instruction_pattern.as_deref(), Some("dependency_chain"));
        assert!((result.cpi - result.est_cycles / 24.0).abs() < 1e-9);
    }

    #[test]
    fn test_phases_are_ordered() {
        let dir = tempdir().unwrap();
        let path = executable(dir.path(), "bench");
        let target = BenchmarkTarget::new(&path, 2).unwrap();
        let mut runner = ScriptedRunner::constant(TrialOutcome::Exited(0));
        let mut phases = Vec::new();
        measure_with_progress(
            &target,
            &MeasureConfig::default(),
            &mut runner,
            &InstructionTable::builtin(),
            |p| phases.push(p),
        )
        .unwrap();
        assert_eq!(phases, vec![Phase::WarmingUp, Phase::Running]);
    }

    #[test]
    fn test_time_trials_marks_running_after_warmup() {
        let log = std::cell::RefCell::new(Vec::new());
        let batch = time_trials(
            2,
            3,
            false,
            |p| log.borrow_mut().push(format!("{p:?}")),
            || {
                log.borrow_mut().push("trial".to_string());
                TrialOutcome::Exited(0)
            },
        );
        let events = log.into_inner();
        assert_eq!(
            events,
            vec!["WarmingUp", "trial", "trial", "trial", "Running", "trial", "trial"]
        );
        assert_eq!(batch.iters, 2);
        assert_eq!(batch.warmup_iters, 3);
    }

    #[test]
    fn test_exit_code_reservation_is_capped() {
        assert_eq!(reserved_exit_codes(3), 3);
        assert_eq!(
            reserved_exit_codes(4_611_686_018_427_387_904),
            MAX_RESERVED_EXIT_CODES as usize
        );
        assert_eq!(reserved_exit_codes(u64::MAX), MAX_RESERVED_EXIT_CODES as usize);
    }

    #[test]
    fn test_recorded_codes_grow_past_reservation() {
        let iters = MAX_RESERVED_EXIT_CODES + 5;
        let mut n = 0;
        let batch = time_trials(iters, 0, true, |_| {}, || {
            n += 1;
            TrialOutcome::Exited(n % 256)
        });
        let codes = batch.exit_codes.unwrap();
        assert_eq!(codes.len() as u64, iters);
        assert_eq!(*codes.last().unwrap(), ((iters as i32) % 256));
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let dir = tempdir().unwrap();
        let path = executable(dir.path(), "bench");
        assert!(matches!(
            BenchmarkTarget::new(&path, 0),
            Err(HarnessError::NonPositiveIterations(0))
        ));
        assert!(matches!(
            BenchmarkTarget::new(&path, -3),
            Err(HarnessError::NonPositiveIterations(-3))
        ));
    }

    #[test]
    fn test_missing_target_rejected() {
        let dir = tempdir().unwrap();
        let err = BenchmarkTarget::new(dir.path().join("missing"), 5).unwrap_err();
        assert!(matches!(err, HarnessError::NotExecutable(_)));
        assert!(err.to_string().starts_with("cannot execute"));
    }

    #[test]
    fn test_directory_target_rejected() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            BenchmarkTarget::new(dir.path(), 5),
            Err(HarnessError::NotExecutable(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_non_executable_file_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.bin");
        fs::write(&path, b"not a program").unwrap();
        assert!(matches!(
            BenchmarkTarget::new(&path, 5),
            Err(HarnessError::NotExecutable(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_execute_bit_for_other_users_only_is_rejected() {
        use std::os::unix::fs::PermissionsExt;

        // root passes access(X_OK) whenever any execute bit is set.
        if rustix::process::geteuid().is_root() {
            return;
        }
        let dir = tempdir().unwrap();
        let path = executable(dir.path(), "group_only");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o654)).unwrap();
        assert!(matches!(
            BenchmarkTarget::new(&path, 1),
            Err(HarnessError::NotExecutable(_))
        ));

        fs::set_permissions(&path, fs::Permissions::from_mode(0o700)).unwrap();
        assert!(BenchmarkTarget::new(&path, 1).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_name_of_non_utf8_path_is_lossy() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempdir().unwrap();
        let script = executable(dir.path(), "plain");
        let odd = dir.path().join(OsStr::from_bytes(b"bench_\xff"));
        fs::rename(&script, &odd).unwrap();

        let target = BenchmarkTarget::new(&odd, 1).unwrap();
        assert_eq!(target.path(), odd.as_path());
        assert!(target.name().ends_with("bench_\u{fffd}"));
    }

    #[test]
    fn test_invalid_frequency_spawns_nothing() {
        let dir = tempdir().unwrap();
        let path = executable(dir.path(), "bench");
        let target = BenchmarkTarget::new(&path, 5).unwrap();
        let mut runner = ScriptedRunner::constant(TrialOutcome::Exited(0));
        let cfg = MeasureConfig {
            assumed_ghz: 0.0,
            ..Default::default()
        };
        let err = measure(&target, &cfg, &mut runner, &InstructionTable::builtin()).unwrap_err();
        assert!(matches!(err, HarnessError::InvalidFrequency(_)));
        assert!(runner.launches.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_real_processes_exit_42() {
        use crate::runner::SubprocessRunner;

        let dir = tempdir().unwrap();
        let path = crate::runner::tests::write_script(dir.path(), "answer", "exit 42");
        let target = BenchmarkTarget::new(&path, 5).unwrap();
        let cfg = MeasureConfig {
            warmup: 2,
            ..Default::default()
        };
        let result = measure(
            &target,
            &cfg,
            &mut SubprocessRunner::new(),
            &InstructionTable::builtin(),
        )
        .unwrap();

        assert_eq!(result.iterations, 5);
        assert_eq!(result.exit_code, 42);
        assert!(result.avg_ms > 0.0);
        assert!(result.instruction_pattern.is_none());
        assert_eq!(result.instructions, 1);
    }
}
