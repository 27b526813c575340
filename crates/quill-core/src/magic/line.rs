//! Built-in line magics (`%name args`).

use std::path::Path;

use crate::capture::capture;
use crate::context::ExecutionContext;
use crate::error::Error;
use crate::namespace;
use crate::payload::ResultPayload;
use crate::shell;

use super::timing;
use super::{MagicCommand, MagicKind, MagicRegistry};

pub(super) fn register(registry: &mut MagicRegistry) {
    let handlers: [(&str, super::MagicHandler); 14] = [
        ("pip", pip),
        ("cd", cd),
        ("pwd", pwd),
        ("ls", ls),
        ("cat", cat),
        ("load", load),
        ("run", run),
        ("time", time),
        ("timeit", timeit),
        ("who", who),
        ("whos", whos),
        ("reset", reset),
        ("env", env),
        ("matplotlib", matplotlib),
    ];
    for (name, handler) in handlers {
        registry.register(MagicKind::Line, name, handler);
    }
}

/// Run `<python> -m pip <args>` in the working directory.
///
/// Shared with the `!pip` shell escape.
pub(crate) fn pip_install(ctx: &mut ExecutionContext, args: &str) -> ResultPayload {
    let python = match ctx.config().python_executable() {
        Ok(python) => python,
        Err(e) => return ResultPayload::from_error(&e),
    };
    let mut argv = vec!["-m", "pip"];
    argv.extend(args.split_whitespace());

    let timeout = ctx.config().pip_timeout;
    match shell::run_program(&python, &argv, ctx.working_directory(), ctx.env(), timeout) {
        Ok(output) => ResultPayload::text(output.combined()),
        Err(Error::Timeout(limit)) => timed_out(limit.as_secs()),
        Err(e) => ResultPayload::from_error(&e),
    }
}

pub(crate) fn timed_out(secs: u64) -> ResultPayload {
    ResultPayload::error(format!("Command timed out ({}s)", secs))
}

fn pip(ctx: &mut ExecutionContext, magic: &MagicCommand<'_>) -> ResultPayload {
    pip_install(ctx, magic.args)
}

fn cd(ctx: &mut ExecutionContext, magic: &MagicCommand<'_>) -> ResultPayload {
    let target = if magic.args.is_empty() {
        match dirs::home_dir() {
            Some(home) => home.to_string_lossy().into_owned(),
            None => return ResultPayload::error("cd: could not determine home directory"),
        }
    } else {
        magic.args.to_string()
    };

    if ctx.set_working_directory(&target) {
        pwd(ctx, magic)
    } else {
        ResultPayload::error(format!("cd: no such directory: {}", target))
    }
}

fn pwd(ctx: &mut ExecutionContext, _magic: &MagicCommand<'_>) -> ResultPayload {
    ResultPayload::text(ctx.working_directory().display().to_string())
}

fn ls(ctx: &mut ExecutionContext, magic: &MagicCommand<'_>) -> ResultPayload {
    let raw = if magic.args.is_empty() { "." } else { magic.args };
    let dir = ctx.resolve_path(raw);

    let entries = match std::fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(e) => return io_error(&dir, e),
    };

    let mut items: Vec<(bool, String)> = Vec::new();
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => return io_error(&dir, e),
        };
        // Follow symlinks so a link to a directory lists as one.
        let is_dir = entry.path().is_dir();
        items.push((is_dir, entry.file_name().to_string_lossy().into_owned()));
    }
    if items.is_empty() {
        return ResultPayload::text("(empty)");
    }

    items.sort_by_cached_key(|(is_dir, name)| (!*is_dir, name.to_lowercase()));
    let lines: Vec<String> = items
        .into_iter()
        .map(|(is_dir, name)| format!("{}{}", if is_dir { "d " } else { "f " }, name))
        .collect();
    ResultPayload::text(lines.join("\n"))
}

fn read_file(ctx: &ExecutionContext, raw: &str) -> Result<(String, String), ResultPayload> {
    if raw.is_empty() {
        return Err(ResultPayload::error("missing file path"));
    }
    let path = ctx.resolve_path(raw);
    match std::fs::read_to_string(&path) {
        Ok(content) => Ok((path.display().to_string(), content)),
        Err(e) => Err(io_error(&path, e)),
    }
}

fn io_error(path: &Path, e: std::io::Error) -> ResultPayload {
    ResultPayload::error(format!("{}: {}", path.display(), e))
}

fn cat(ctx: &mut ExecutionContext, magic: &MagicCommand<'_>) -> ResultPayload {
    match read_file(ctx, magic.args) {
        Ok((_, content)) => ResultPayload::text(content),
        Err(payload) => payload,
    }
}

fn load(ctx: &mut ExecutionContext, magic: &MagicCommand<'_>) -> ResultPayload {
    match read_file(ctx, magic.args) {
        Ok((_, content)) => ResultPayload::text(format!("# %load {}\n{}", magic.args, content)),
        Err(payload) => payload,
    }
}

fn run(ctx: &mut ExecutionContext, magic: &MagicCommand<'_>) -> ResultPayload {
    let (path, code) = match read_file(ctx, magic.args) {
        Ok(file) => file,
        Err(payload) => return payload,
    };

    let captured = capture(ctx.evaluator(), |ev| ev.run_isolated(&code, &path));
    if let Err(e) = captured.outcome {
        return ResultPayload::from_error(&e);
    }

    let output = format!("{}{}", captured.streams.stdout, captured.streams.stderr);
    let output = output.trim_end();
    if output.is_empty() {
        ResultPayload::text(format!("Executed {}", path))
    } else {
        ResultPayload::text(output)
    }
}

fn time(ctx: &mut ExecutionContext, magic: &MagicCommand<'_>) -> ResultPayload {
    timing::time(ctx, magic.code())
}

fn timeit(ctx: &mut ExecutionContext, magic: &MagicCommand<'_>) -> ResultPayload {
    timing::timeit(ctx, magic.code())
}

fn who(ctx: &mut ExecutionContext, _magic: &MagicCommand<'_>) -> ResultPayload {
    match ctx.evaluator().bindings() {
        Ok(bindings) => ResultPayload::text(namespace::format_who(&bindings)),
        Err(e) => ResultPayload::from_error(&e),
    }
}

fn whos(ctx: &mut ExecutionContext, _magic: &MagicCommand<'_>) -> ResultPayload {
    match ctx.evaluator().bindings() {
        Ok(bindings) => ResultPayload::text(namespace::format_whos(&bindings)),
        Err(e) => ResultPayload::from_error(&e),
    }
}

fn reset(ctx: &mut ExecutionContext, _magic: &MagicCommand<'_>) -> ResultPayload {
    match ctx.reset() {
        Ok(()) => ResultPayload::text("Namespace reset."),
        Err(e) => ResultPayload::from_error(&e),
    }
}

fn env(ctx: &mut ExecutionContext, magic: &MagicCommand<'_>) -> ResultPayload {
    if let Some((key, value)) = magic.args.split_once('=') {
        let (key, value) = (key.trim(), value.trim());
        if key.is_empty() {
            return ResultPayload::error("env: missing variable name");
        }
        return match ctx.set_env_var(key, value) {
            Ok(()) => ResultPayload::text(format!("{}={}", key, value)),
            Err(e) => ResultPayload::from_error(&e),
        };
    }

    if !magic.args.is_empty() {
        return ResultPayload::text(ctx.env_var(magic.args).unwrap_or_default());
    }

    let lines: Vec<String> = ctx
        .env()
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect();
    ResultPayload::text(lines.join("\n"))
}

fn matplotlib(_ctx: &mut ExecutionContext, magic: &MagicCommand<'_>) -> ResultPayload {
    if magic.args.contains("inline") {
        ResultPayload::text("Matplotlib backend: inline (default)")
    } else {
        ResultPayload::text(format!("Matplotlib args: {}", magic.args))
    }
}
