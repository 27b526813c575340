//! Magic commands.
//!
//! A cell whose first line starts with `%name` is a line magic and one
//! starting with `%%name` is a cell magic. Handlers live in a
//! [`MagicRegistry`] built once at startup. A name the registry does not
//! know is a miss, and the dispatcher runs the cell as plain code.

mod cell;
mod line;
mod timing;

pub(crate) use line::{pip_install, timed_out};

use rustc_hash::FxHashMap;

use crate::context::ExecutionContext;
use crate::payload::ResultPayload;

/// Whether a magic applies to its line or to the whole cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MagicKind {
    Line,
    Cell,
}

/// A parsed magic directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagicCommand<'a> {
    pub kind: MagicKind,
    /// Lowercased magic name.
    pub name: String,
    /// Trailing text on the directive line, trimmed.
    pub args: &'a str,
    /// Everything after the directive line, verbatim.
    pub body: &'a str,
}

impl<'a> MagicCommand<'a> {
    /// Parse the first line of `code` as a magic directive.
    ///
    /// Returns `None` when the cell is not a magic.
    pub fn parse(code: &'a str) -> Option<Self> {
        let (first, body) = match code.split_once('\n') {
            Some((first, rest)) => (first, rest),
            None => (code, ""),
        };
        let first = first.trim();

        let (kind, rest) = if let Some(rest) = first.strip_prefix("%%") {
            (MagicKind::Cell, rest)
        } else if let Some(rest) = first.strip_prefix('%') {
            (MagicKind::Line, rest)
        } else {
            return None;
        };

        let name_end = rest
            .find(|c: char| !(c.is_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        if name_end == 0 {
            return None;
        }

        Some(Self {
            kind,
            name: rest[..name_end].to_lowercase(),
            args: rest[name_end..].trim(),
            body,
        })
    }

    /// The code a timing magic applies to: its arguments, else its body.
    pub fn code(&self) -> &'a str {
        if self.args.is_empty() {
            self.body
        } else {
            self.args
        }
    }
}

/// Signature of every magic handler.
pub type MagicHandler = fn(&mut ExecutionContext, &MagicCommand<'_>) -> ResultPayload;

/// Mapping from magic names to handlers, one table per kind.
#[derive(Clone)]
pub struct MagicRegistry {
    line: FxHashMap<String, MagicHandler>,
    cell: FxHashMap<String, MagicHandler>,
}

impl MagicRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            line: FxHashMap::default(),
            cell: FxHashMap::default(),
        }
    }

    /// A registry holding every built-in magic.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        line::register(&mut registry);
        cell::register(&mut registry);
        registry
    }

    /// Register (or replace) a handler. Names are case-insensitive.
    pub fn register(&mut self, kind: MagicKind, name: &str, handler: MagicHandler) {
        let table = match kind {
            MagicKind::Line => &mut self.line,
            MagicKind::Cell => &mut self.cell,
        };
        table.insert(name.to_lowercase(), handler);
    }

    pub fn lookup(&self, kind: MagicKind, name: &str) -> Option<MagicHandler> {
        let table = match kind {
            MagicKind::Line => &self.line,
            MagicKind::Cell => &self.cell,
        };
        table.get(&name.to_lowercase()).copied()
    }

    /// Run the handler for `magic`, or `None` on a registry miss.
    pub fn handle(
        &self,
        ctx: &mut ExecutionContext,
        magic: &MagicCommand<'_>,
    ) -> Option<ResultPayload> {
        let handler = self.lookup(magic.kind, &magic.name)?;
        tracing::debug!(name = %magic.name, kind = ?magic.kind, "running magic");
        Some(handler(ctx, magic))
    }

    /// Registered names of one kind, sorted.
    pub fn names(&self, kind: MagicKind) -> Vec<&str> {
        let table = match kind {
            MagicKind::Line => &self.line,
            MagicKind::Cell => &self.cell,
        };
        let mut names: Vec<&str> = table.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for MagicRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl std::fmt::Debug for MagicRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MagicRegistry")
            .field("line", &self.names(MagicKind::Line))
            .field("cell", &self.names(MagicKind::Cell))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_line_magic() {
        let magic = MagicCommand::parse("  %CD  /tmp  \nrest").unwrap();
        assert_eq!(magic.kind, MagicKind::Line);
        assert_eq!(magic.name, "cd");
        assert_eq!(magic.args, "/tmp");
        assert_eq!(magic.body, "rest");
    }

    #[test]
    fn test_parse_cell_magic_keeps_body_verbatim() {
        let magic = MagicCommand::parse("%%writefile out/a.txt\n  line one\n\nline three\n").unwrap();
        assert_eq!(magic.kind, MagicKind::Cell);
        assert_eq!(magic.name, "writefile");
        assert_eq!(magic.args, "out/a.txt");
        assert_eq!(magic.body, "  line one\n\nline three\n");
    }

    #[test]
    fn test_parse_name_stops_at_non_word() {
        let magic = MagicCommand::parse("%env HOME=/x").unwrap();
        assert_eq!(magic.name, "env");
        assert_eq!(magic.args, "HOME=/x");

        let magic = MagicCommand::parse("%%html").unwrap();
        assert_eq!(magic.args, "");
        assert_eq!(magic.body, "");
    }

    #[test]
    fn test_not_magic() {
        assert_eq!(MagicCommand::parse("x % 2"), None);
        assert_eq!(MagicCommand::parse("%"), None);
        assert_eq!(MagicCommand::parse("%% just text"), None);
        assert_eq!(MagicCommand::parse("print('%time')"), None);
    }

    #[test]
    fn test_code_prefers_args() {
        let magic = MagicCommand::parse("%timeit sum(range(10))\nignored").unwrap();
        assert_eq!(magic.code(), "sum(range(10))");
        let magic = MagicCommand::parse("%%timeit\nsum(range(10))").unwrap();
        assert_eq!(magic.code(), "sum(range(10))");
    }

    #[test]
    fn test_builtin_names() {
        let registry = MagicRegistry::with_builtins();
        let line = registry.names(MagicKind::Line);
        for name in [
            "pip", "cd", "pwd", "ls", "cat", "load", "run", "time", "timeit", "who", "whos",
            "reset", "env", "matplotlib",
        ] {
            assert!(line.contains(&name), "missing line magic {name}");
        }
        let cell = registry.names(MagicKind::Cell);
        for name in [
            "bash", "sh", "python", "python3", "writefile", "time", "timeit", "html",
            "javascript", "js", "capture",
        ] {
            assert!(cell.contains(&name), "missing cell magic {name}");
        }
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let registry = MagicRegistry::default();
        assert!(registry.lookup(MagicKind::Cell, "HTML").is_some());
        assert!(registry.lookup(MagicKind::Line, "html").is_none());
        assert!(registry.lookup(MagicKind::Cell, "nosuchmagic").is_none());
    }
}
