//! `%time` and `%timeit`.

use std::fmt;
use std::time::{Duration, Instant};

use crate::capture::capture;
use crate::context::ExecutionContext;
use crate::dispatch::run_code;
use crate::error::{Error, Result};
use crate::eval::Evaluator;
use crate::payload::ResultPayload;

/// A batch must run at least this long before its loop count is accepted.
const AUTORANGE_TARGET: Duration = Duration::from_millis(200);

/// Upper bound on the loop count, for statements too fast to measure.
const MAX_LOOPS: u64 = 10_000_000;

/// Number of timed batches.
const REPEATS: usize = 5;

/// Run `code` through the plain-code path and append its wall time.
pub(super) fn time(ctx: &mut ExecutionContext, code: &str) -> ResultPayload {
    let start = Instant::now();
    let mut payload = run_code(ctx, code);
    let label = format!("Wall time: {:.2} ms", start.elapsed().as_secs_f64() * 1000.0);

    let content = &mut payload.output.content;
    if content.is_empty() {
        *content = label;
    } else {
        content.push('\n');
        content.push_str(&label);
    }
    payload
}

/// Time repeated runs of `code` and report the median per-loop time.
///
/// Output printed by the timed code is discarded. Assignments it makes do
/// not persist.
pub(super) fn timeit(ctx: &mut ExecutionContext, code: &str) -> ResultPayload {
    if code.trim().is_empty() {
        return ResultPayload::error("timeit: no code to time");
    }

    let captured = capture(ctx.evaluator(), |ev| measure(ev, code));
    match captured.outcome {
        Ok(report) => ResultPayload::text(report.to_string()),
        Err(e) => ResultPayload::from_error(&e),
    }
}

fn measure(ev: &mut dyn Evaluator, code: &str) -> Result<TimeitReport> {
    let loops = autorange(ev, code)?;

    let mut samples = Vec::with_capacity(REPEATS);
    for _ in 0..REPEATS {
        let elapsed = ev.time_statements(code, loops)?;
        samples.push(elapsed.as_secs_f64() / loops as f64);
    }

    TimeitReport::from_samples(&samples, loops)
}

/// Find the smallest loop count in 1, 2, 5, 10, 20, 50, ... whose batch
/// takes at least [`AUTORANGE_TARGET`].
fn autorange(ev: &mut dyn Evaluator, code: &str) -> Result<u64> {
    let mut base = 1u64;
    loop {
        for multiplier in [1, 2, 5] {
            let loops = base * multiplier;
            let elapsed = ev.time_statements(code, loops)?;
            if elapsed >= AUTORANGE_TARGET || loops >= MAX_LOOPS {
                return Ok(loops);
            }
        }
        base *= 10;
    }
}

/// Summary statistics of a timeit run, per loop, in seconds.
#[derive(Debug, Clone, PartialEq)]
struct TimeitReport {
    median: f64,
    std_dev: f64,
    runs: usize,
    loops: u64,
}

impl TimeitReport {
    fn from_samples(samples: &[f64], loops: u64) -> Result<Self> {
        if samples.is_empty() {
            return Err(Error::InvalidArgument("no timing samples".to_string()));
        }

        let mut sorted = samples.to_vec();
        sorted.sort_by(f64::total_cmp);
        let mid = sorted.len() / 2;
        let median = if sorted.len() % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        };

        let n = samples.len() as f64;
        let mean = samples.iter().sum::<f64>() / n;
        let variance = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;

        Ok(Self {
            median,
            std_dev: variance.sqrt(),
            runs: samples.len(),
            loops,
        })
    }
}

impl fmt::Display for TimeitReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ± {} per loop (median ± std. dev. of {} runs, {} {} each)",
            format_seconds(self.median),
            format_seconds(self.std_dev),
            self.runs,
            self.loops,
            if self.loops == 1 { "loop" } else { "loops" }
        )
    }
}

/// Render seconds in the largest unit that keeps the value at or above 1.
fn format_seconds(secs: f64) -> String {
    if secs < 1e-6 {
        format!("{:.2} ns", secs * 1e9)
    } else if secs < 1e-3 {
        format!("{:.2} µs", secs * 1e6)
    } else if secs < 1.0 {
        format!("{:.2} ms", secs * 1e3)
    } else {
        format!("{:.2} s", secs)
    }
}
