//! Cell dispatch.
//!
//! Routes a cell to one of four paths, first match wins:
//! 1. `!cmd` shell escape (`!pip ...` goes to the pip handler)
//! 2. `%%name` cell magic
//! 3. `%name` line magic
//! 4. plain code
//!
//! A magic the registry does not know falls through to plain code with the
//! original text.

use crate::capture::{capture, shape_result};
use crate::classify::{CodeShape, classify};
use crate::context::ExecutionContext;
use crate::error::Error;
use crate::magic::{self, MagicCommand, MagicRegistry};
use crate::payload::ResultPayload;
use crate::shell;

/// Execute one cell and return its payload.
///
/// Clears the interrupt flag first. The execution counter advances once for
/// a successful route; a plain-code cell that raised, a shell escape that
/// timed out or failed to start, and anything that reset the namespace do
/// not advance it. Empty input returns an empty text payload.
pub fn dispatch(ctx: &mut ExecutionContext, registry: &MagicRegistry, code: &str) -> ResultPayload {
    ctx.interrupt_handle().clear();

    let code = code.trim();
    if code.is_empty() {
        return ResultPayload::text("");
    }

    let generation = ctx.generation();
    let (payload, counts) = route(ctx, registry, code);

    if counts && ctx.generation() == generation {
        ctx.bump_execution_count();
    }
    payload
}

fn route(ctx: &mut ExecutionContext, registry: &MagicRegistry, code: &str) -> (ResultPayload, bool) {
    if let Some(command) = code.strip_prefix('!') {
        return shell_escape(ctx, command.trim());
    }

    if let Some(magic) = MagicCommand::parse(code) {
        if let Some(payload) = registry.handle(ctx, &magic) {
            return (payload, true);
        }
        tracing::debug!(name = %magic.name, "unknown magic, running as code");
    }

    tracing::debug!("running plain code");
    execute_code(ctx, code)
}

fn shell_escape(ctx: &mut ExecutionContext, command: &str) -> (ResultPayload, bool) {
    if command == "pip" || command.starts_with("pip ") {
        let args = command.strip_prefix("pip").unwrap_or_default();
        return (magic::pip_install(ctx, args.trim()), true);
    }

    let timeout = ctx.config().shell_timeout;
    match shell::run_shell(command, ctx.working_directory(), ctx.env(), timeout) {
        Ok(output) => {
            let combined = output.combined();
            let content = combined.trim_end();
            let content = if content.is_empty() { "(no output)" } else { content };
            (ResultPayload::text(content), true)
        }
        Err(Error::Timeout(limit)) => (magic::timed_out(limit.as_secs()), false),
        Err(e) => (ResultPayload::from_error(&e), false),
    }
}

/// Run `code` as plain code: classify, capture, shape.
///
/// This is the path `%%python` and `%time` reuse.
pub fn run_code(ctx: &mut ExecutionContext, code: &str) -> ResultPayload {
    execute_code(ctx, code).0
}

fn execute_code(ctx: &mut ExecutionContext, code: &str) -> (ResultPayload, bool) {
    let evaluator = ctx.evaluator();
    let shape = classify(code, |line| evaluator.is_expression(line));

    let captured = capture(evaluator, |ev| match &shape {
        CodeShape::Statements => ev.run_statements(code).map(|()| None),
        CodeShape::Expression { prefix, expression } => {
            if let Some(prefix) = prefix {
                ev.run_statements(prefix)?;
            }
            ev.eval_expression(expression)
        }
    });

    let ok = captured.outcome.is_ok();
    (shape_result(captured), ok)
}
