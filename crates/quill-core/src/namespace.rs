//! Views of the user namespace: `%who`, `%whos` and the variable listing.

use serde::{Deserialize, Serialize};

use crate::eval::Binding;

/// Names every fresh namespace carries; never shown to the user.
pub const BOOTSTRAP_NAMES: &[&str] = &[
    "__builtins__",
    "__name__",
    "__doc__",
    "__package__",
    "__file__",
    "np",
    "pd",
    "plt",
    "In",
    "Out",
];

/// Module names additionally hidden from the variable listing.
pub const HIDDEN_MODULE_NAMES: &[&str] = &[
    "sys",
    "io",
    "os",
    "base64",
    "matplotlib",
    "json",
    "numpy",
    "pandas",
];

const VALUE_LIMIT: usize = 100;
const WHOS_INFO_LIMIT: usize = 30;

/// A user variable as shown in the editor's variable panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub value: String,
    pub size: Option<String>,
}

fn is_user_name(name: &str) -> bool {
    !name.starts_with('_') && !BOOTSTRAP_NAMES.contains(&name)
}

fn truncate_chars(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// User variables in namespace order.
///
/// Skips private and bootstrap names, common modules, and callables that
/// are not types.
pub fn variables(bindings: &[Binding]) -> Vec<Variable> {
    bindings
        .iter()
        .filter(|b| is_user_name(&b.name) && !HIDDEN_MODULE_NAMES.contains(&b.name.as_str()))
        .filter(|b| !b.callable || b.is_type)
        .map(|b| {
            let size = b
                .shape
                .clone()
                .or_else(|| b.len.map(|len| format!("{} items", len)));
            let value = if b.repr.chars().count() > VALUE_LIMIT {
                format!("{}...", truncate_chars(&b.repr, VALUE_LIMIT))
            } else {
                b.repr.clone()
            };
            Variable {
                name: b.name.clone(),
                type_name: b.type_name.clone(),
                value,
                size,
            }
        })
        .collect()
}

/// `%who`: sorted names separated by two spaces.
pub fn format_who(bindings: &[Binding]) -> String {
    let mut names: Vec<&str> = bindings
        .iter()
        .map(|b| b.name.as_str())
        .filter(|name| is_user_name(name))
        .collect();
    if names.is_empty() {
        return "No variables defined".to_string();
    }
    names.sort_unstable();
    names.join("  ")
}

/// `%whos`: a table of name, type and a short representation.
pub fn format_whos(bindings: &[Binding]) -> String {
    let mut rows: Vec<&Binding> = bindings.iter().filter(|b| is_user_name(&b.name)).collect();
    rows.sort_by(|a, b| a.name.cmp(&b.name));

    let mut lines = vec!["Variable   Type       Data/Info".to_string(), "-".repeat(40)];
    for b in rows {
        lines.push(format!(
            "{:<10} {:<10} {}",
            b.name,
            b.type_name,
            truncate_chars(&b.repr, WHOS_INFO_LIMIT)
        ));
    }
    lines.join("\n")
}
