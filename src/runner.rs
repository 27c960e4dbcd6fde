//! Process runner: one trial is one child process.
//!
//! Every call spawns a fresh OS process with stdout/stderr sent to the null
//! device and waits for it to finish. Process creation and teardown are
//! included in anything timed around these calls and dominate the cost of
//! small benchmarks.

use std::io;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

/// Exit code reported when the target could not be launched.
pub const LAUNCH_FAILED_EXIT: i32 = 127;

/// Exit code reported when the target was killed by a signal or crashed.
pub const ABNORMAL_EXIT: i32 = -1;

/// Exit code reported when an opt-in timeout expired and the child was killed.
pub const TIMED_OUT_EXIT: i32 = -2;

const FIRST_POLL: Duration = Duration::from_micros(50);
const MAX_POLL: Duration = Duration::from_millis(10);

/// How a single trial ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrialOutcome {
    /// The process ran to completion and returned this status.
    Exited(i32),
    /// The process could not be spawned or exec'd.
    LaunchFailed,
    /// The process terminated without an exit status (signal, crash).
    Abnormal,
    /// The opt-in wait bound expired.
    TimedOut,
}

impl TrialOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            TrialOutcome::Exited(code) => *code,
            TrialOutcome::LaunchFailed => LAUNCH_FAILED_EXIT,
            TrialOutcome::Abnormal => ABNORMAL_EXIT,
            TrialOutcome::TimedOut => TIMED_OUT_EXIT,
        }
    }

    /// True when the process ran to completion, whatever its status.
    pub fn completed(&self) -> bool {
        matches!(self, TrialOutcome::Exited(_))
    }
}

/// Spawn, redirect, wait. The only seam between timing logic and the OS.
pub trait ProcessRunner {
    fn run_once(&mut self, path: &Path) -> TrialOutcome;
}

/// [`ProcessRunner`] backed by `std::process`.
#[derive(Clone, Debug, Default)]
pub struct SubprocessRunner {
    timeout: Option<Duration>,
}

impl SubprocessRunner {
    /// Unbounded waits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill and reap any trial that outlives `timeout`.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

impl ProcessRunner for SubprocessRunner {
    fn run_once(&mut self, path: &Path) -> TrialOutcome {
        let mut child = match Command::new(path)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "launch failed");
                return TrialOutcome::LaunchFailed;
            }
        };

        let waited = match self.timeout {
            None => child.wait().map(Some),
            Some(limit) => wait_bounded(&mut child, limit),
        };

        let outcome = match waited {
            Ok(Some(status)) => outcome_of(status),
            Ok(None) => {
                // Reap so the killed child does not linger as a zombie.
                if let Err(e) = child.kill().and_then(|_| child.wait().map(|_| ())) {
                    warn!(pid = child.id(), error = %e, "failed to reap timed-out trial");
                }
                TrialOutcome::TimedOut
            }
            Err(e) => {
                warn!(pid = child.id(), error = %e, "wait failed");
                TrialOutcome::Abnormal
            }
        };

        debug!(pid = child.id(), exit_code = outcome.exit_code(), "trial finished");
        outcome
    }
}

fn outcome_of(status: ExitStatus) -> TrialOutcome {
    match status.code() {
        Some(code) => TrialOutcome::Exited(code),
        None => TrialOutcome::Abnormal,
    }
}

/// Poll with exponential backoff until the child exits or `limit` passes.
/// `Ok(None)` means the deadline expired first.
fn wait_bounded(child: &mut Child, limit: Duration) -> io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + limit;
    let mut pause = FIRST_POLL;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }
        thread::sleep(pause.min(deadline - now));
        pause = (pause * 2).min(MAX_POLL);
    }
}
