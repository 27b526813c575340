//! Expression-vs-statement classification for auto-display.
//!
//! Decides whether the final significant line of a cell is an expression
//! whose value should be shown. Cheap textual checks run first; only a line
//! that passes them is handed to the evaluator's syntax-only probe.

/// Statement keywords that rule out an expression, matched as whole words.
const STATEMENT_KEYWORDS: &[&str] = &[
    "if", "for", "while", "def", "class", "with", "try", "except", "return", "import", "from",
    "raise", "assert", "del", "pass", "break", "continue", "global", "nonlocal",
];

/// Characters that turn a following `=` into an operator rather than an
/// assignment (`==`, `!=`, `<=`, `>=`, `+=`, `//=`, `:=`, `>>=`, ...).
const OPERATOR_PREFIXES: &[char] = &[
    '=', '!', '<', '>', '+', '-', '*', '/', '%', '&', '|', '^', '@', ':',
];

/// How a cell should be executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeShape {
    /// Run the whole block for side effects only.
    Statements,
    /// Run `prefix` (if any) as statements, then evaluate `expression` and
    /// display its value.
    Expression {
        prefix: Option<String>,
        expression: String,
    },
}

fn is_significant(line: &str) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty() && !trimmed.starts_with('#')
}

/// Classify `code`, consulting `probe` for lines that pass the textual
/// checks.
///
/// `probe` must only check grammar; it is never called for lines already
/// ruled out.
pub fn classify(code: &str, mut probe: impl FnMut(&str) -> bool) -> CodeShape {
    let lines: Vec<&str> = code.lines().collect();
    let Some(last) = lines.iter().rposition(|line| is_significant(line)) else {
        return CodeShape::Statements;
    };

    let line = lines[last];
    // An indented final line belongs to an enclosing block.
    if line.starts_with(char::is_whitespace) {
        return CodeShape::Statements;
    }

    // The final line continues a statement started above it.
    if last > 0 && lines[last - 1].trim_end().ends_with('\\') {
        return CodeShape::Statements;
    }

    let expression = line.trim();
    if looks_like_statement(expression) || !probe(expression) {
        return CodeShape::Statements;
    }

    let prefix = lines[..last].join("\n");
    CodeShape::Expression {
        prefix: (!prefix.trim().is_empty()).then_some(prefix),
        expression: expression.to_string(),
    }
}

/// Textual checks that rule a line out as an expression.
///
/// True for a bare assignment, a leading statement keyword or `print`, or a
/// trailing block-opening colon.
pub fn looks_like_statement(line: &str) -> bool {
    let line = line.trim();
    has_bare_assignment(line) || starts_with_keyword(line) || line.ends_with(':')
}

fn has_bare_assignment(line: &str) -> bool {
    let chars: Vec<char> = line.chars().collect();
    let mut quote: Option<char> = None;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match quote {
            Some(q) => {
                if c == '\\' {
                    i += 1;
                } else if c == q {
                    quote = None;
                }
            }
            None => match c {
                '\'' | '"' => quote = Some(c),
                '#' => return false,
                '=' => {
                    let next = chars.get(i + 1).copied();
                    let prev = i.checked_sub(1).map(|p| chars[p]);
                    if next == Some('=') {
                        // Comparison; skip its second half.
                        i += 1;
                    } else if !prev.is_some_and(|p| OPERATOR_PREFIXES.contains(&p)) {
                        return true;
                    }
                }
                _ => {}
            },
        }
        i += 1;
    }

    false
}

fn starts_with_keyword(line: &str) -> bool {
    let word_end = line
        .find(|c: char| !(c.is_alphanumeric() || c == '_'))
        .unwrap_or(line.len());
    let word = &line[..word_end];

    if STATEMENT_KEYWORDS.contains(&word) {
        return true;
    }

    if word == "print" {
        let rest = &line[word_end..];
        return rest.is_empty() || rest.starts_with('(') || rest.starts_with(char::is_whitespace);
    }

    false
}
