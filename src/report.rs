//! Human-readable diagnostics. None of this is meant to be parsed.

use std::fmt;

use crate::harness::MeasurementResult;

/// Lines printed before the run starts.
pub fn render_header(name: &str, iterations: u64) -> String {
    format!("Benchmark: {name}\nIterations: {iterations}\n")
}

/// The results block.
pub fn render_results(r: &MeasurementResult) -> String {
    ResultsBlock(r).to_string()
}

struct ResultsBlock<'a>(&'a MeasurementResult);

impl fmt::Display for ResultsBlock<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = self.0;
        writeln!(f, "Results:")?;
        writeln!(f, "  Total time:     {:.3} ms", r.total_ms())?;
        writeln!(
            f,
            "  Per iteration:  {:.3} ms ({:.3} us, includes process launch overhead)",
            r.avg_ms, r.avg_us
        )?;
        writeln!(
            f,
            "  Est. cycles:    {:.0} (at an assumed {} GHz; dominated by process startup)",
            r.est_cycles, r.assumed_ghz
        )?;
        match &r.instruction_pattern {
            Some(pattern) => {
                writeln!(
                    f,
                    "  Instructions:   {} (benchmark only, matched '{}')",
                    r.instructions, pattern
                )?;
                writeln!(f, "  Est. CPI:       {:.1}", r.cpi)?;
            }
            None => {
                writeln!(
                    f,
                    "  Instructions:   {} (unknown benchmark, fallback value)",
                    r.instructions
                )?;
                writeln!(f, "  Est. CPI:       n/a (no instruction count)")?;
            }
        }
        writeln!(f, "  Exit code:      {} (last trial)", r.exit_code)?;
        if r.incomplete_trials > 0 {
            writeln!(
                f,
                "  Incomplete:     {} of {} timed trials did not run to completion",
                r.incomplete_trials, r.iterations
            )?;
        }
        if let Some(codes) = &r.exit_codes {
            let distinct = distinct_codes(codes);
            writeln!(f, "  Exit codes:     {distinct:?} (distinct, all timed trials)")?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "Note: every trial is a fresh process; timings include launch and teardown."
        )?;
        writeln!(
            f,
            "For meaningful CPI, measure actual CPU cycles with hardware counters."
        )
    }
}

fn distinct_codes(codes: &[i32]) -> Vec<i32> {
    let mut distinct = codes.to_vec();
    distinct.sort_unstable();
    distinct.dedup();
    distinct
}
