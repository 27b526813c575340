//! Built-in cell magics (`%%name args` followed by a body).

use crate::context::ExecutionContext;
use crate::dispatch::run_code;
use crate::error::Error;
use crate::payload::ResultPayload;
use crate::shell;

use super::line::timed_out;
use super::timing;
use super::{MagicCommand, MagicHandler, MagicKind, MagicRegistry};

pub(super) fn register(registry: &mut MagicRegistry) {
    let handlers: [(&str, MagicHandler); 11] = [
        ("bash", bash),
        ("sh", bash),
        ("python", python),
        ("python3", python),
        ("capture", python),
        ("writefile", writefile),
        ("time", time),
        ("timeit", timeit),
        ("html", html),
        ("javascript", javascript),
        ("js", javascript),
    ];
    for (name, handler) in handlers {
        registry.register(MagicKind::Cell, name, handler);
    }
}

fn bash(ctx: &mut ExecutionContext, magic: &MagicCommand<'_>) -> ResultPayload {
    let timeout = ctx.config().shell_timeout;
    match shell::run_shell(magic.body, ctx.working_directory(), ctx.env(), timeout) {
        Ok(output) => {
            let combined = output.combined();
            if combined.is_empty() {
                ResultPayload::text("(no output)")
            } else {
                ResultPayload::text(combined)
            }
        }
        Err(Error::Timeout(limit)) => timed_out(limit.as_secs()),
        Err(e) => ResultPayload::from_error(&e),
    }
}

// `%%capture` runs like `%%python`; binding its output to a variable is not
// supported.
fn python(ctx: &mut ExecutionContext, magic: &MagicCommand<'_>) -> ResultPayload {
    run_code(ctx, magic.body)
}

fn writefile(ctx: &mut ExecutionContext, magic: &MagicCommand<'_>) -> ResultPayload {
    if magic.args.is_empty() {
        return ResultPayload::error("writefile: missing file path");
    }
    let path = ctx.resolve_path(magic.args);

    let written = path
        .parent()
        .map_or(Ok(()), std::fs::create_dir_all)
        .and_then(|()| std::fs::write(&path, magic.body));

    match written {
        Ok(()) => ResultPayload::text(format!("Writing {}", magic.args)),
        Err(e) => ResultPayload::error(format!("{}: {}", path.display(), e)),
    }
}

fn time(ctx: &mut ExecutionContext, magic: &MagicCommand<'_>) -> ResultPayload {
    timing::time(ctx, magic.body)
}

fn timeit(ctx: &mut ExecutionContext, magic: &MagicCommand<'_>) -> ResultPayload {
    timing::timeit(ctx, magic.body)
}

fn html(_ctx: &mut ExecutionContext, magic: &MagicCommand<'_>) -> ResultPayload {
    ResultPayload::html(magic.body)
}

fn javascript(_ctx: &mut ExecutionContext, magic: &MagicCommand<'_>) -> ResultPayload {
    ResultPayload::text(format!("JavaScript:\n{}", magic.body))
}
