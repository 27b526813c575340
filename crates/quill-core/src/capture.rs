//! Scoped stream capture and result shaping.
//!
//! [`capture`] runs a unit of work with the evaluator's stdout/stderr
//! redirected into fresh buffers. The redirection is released by a guard, so
//! the previous bindings come back on every exit path, including panics.
//! [`shape_result`] turns what was captured into a [`ResultPayload`].

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::error::Result;
use crate::eval::{CapturedStreams, Evaluator};
use crate::payload::ResultPayload;

/// Everything observed while a unit of work ran.
#[derive(Debug)]
pub struct Captured<T> {
    /// What the work itself returned.
    pub outcome: Result<T>,
    /// Text written to the redirected streams.
    pub streams: CapturedStreams,
    /// Pending graphical output as PNG bytes.
    pub plot: Option<Vec<u8>>,
}

/// Redirection guard. Dropping it restores the previous stream bindings.
struct StreamRedirect<'a> {
    evaluator: &'a mut dyn Evaluator,
    restored: bool,
}

impl<'a> StreamRedirect<'a> {
    fn acquire(evaluator: &'a mut dyn Evaluator) -> Result<Self> {
        evaluator.begin_capture()?;
        Ok(Self {
            evaluator,
            restored: false,
        })
    }

    fn release(mut self) -> CapturedStreams {
        self.finish()
    }

    fn finish(&mut self) -> CapturedStreams {
        if self.restored {
            return CapturedStreams::default();
        }
        self.restored = true;
        match self.evaluator.end_capture() {
            Ok(streams) => streams,
            Err(e) => {
                tracing::warn!("failed to restore output streams: {}", e);
                CapturedStreams::default()
            }
        }
    }
}

impl Drop for StreamRedirect<'_> {
    fn drop(&mut self) {
        self.finish();
    }
}

/// Run `work` with output redirected, then collect streams and pending plot.
///
/// If the redirection cannot be established the work is not run and the
/// failure is reported as the outcome.
pub fn capture<T>(
    evaluator: &mut dyn Evaluator,
    work: impl FnOnce(&mut dyn Evaluator) -> Result<T>,
) -> Captured<T> {
    let mut guard = match StreamRedirect::acquire(evaluator) {
        Ok(guard) => guard,
        Err(e) => {
            return Captured {
                outcome: Err(e),
                streams: CapturedStreams::default(),
                plot: None,
            };
        }
    };

    let outcome = work(&mut *guard.evaluator);
    let streams = guard.release();

    let plot = match evaluator.take_pending_plot() {
        Ok(plot) => plot,
        Err(e) => {
            tracing::warn!("failed to collect pending plot: {}", e);
            None
        }
    };

    Captured {
        outcome,
        streams,
        plot,
    }
}

/// Build the payload for a plain-code run.
///
/// Exceptions win outright. A plot carries stdout as its content. Otherwise
/// stdout and stderr each contribute a line, and the expression value is
/// shown only when nothing was printed to stdout.
pub fn shape_result(captured: Captured<Option<String>>) -> ResultPayload {
    let value = match captured.outcome {
        Ok(value) => value,
        Err(e) => return ResultPayload::from_error(&e),
    };

    if let Some(png) = captured.plot {
        return ResultPayload::plot(captured.streams.stdout, BASE64.encode(png));
    }

    let stdout = captured.streams.stdout.trim_end();
    let stderr = captured.streams.stderr.trim_end();

    let mut parts: Vec<&str> = Vec::new();
    if !stdout.is_empty() {
        parts.push(stdout);
    }
    if !stderr.is_empty() {
        parts.push(stderr);
    }
    if stdout.is_empty()
        && let Some(value) = value.as_deref()
    {
        parts.push(value);
    }

    ResultPayload::text(parts.join("\n"))
}
