//! Jupyter notebook (.ipynb) format.
//!
//! [`encode`] turns a [`Notebook`] into an nbformat 4.5 document and
//! [`decode`] turns a document (ours or a foreign one) back into a notebook.
//! Each code cell carries at most one output.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use quill_core::payload::MIME_HTML;
use quill_core::{Output, OutputKind};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::{SyncError, SyncResult};
use crate::notebook::{Cell, CellStatus, CellType, DEFAULT_TITLE, Notebook};

const MIME_PLAIN: &str = "text/plain";

/// Keyed output data (MIME type -> payload).
pub type MimeBundle = BTreeMap<String, Value>;

/// A Jupyter notebook document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpynbDocument {
    /// Notebook metadata
    #[serde(default)]
    pub metadata: IpynbMetadata,

    /// Format version (always 4)
    pub nbformat: u32,

    /// Minor format version
    pub nbformat_minor: u32,

    /// Notebook cells
    #[serde(default)]
    pub cells: Vec<IpynbCell>,
}

/// Notebook-level metadata.
///
/// Title and timestamps live here; unknown keys are kept as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IpynbMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kernelspec: Option<KernelSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_info: Option<LanguageInfo>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Kernel specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelSpec {
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    pub name: String,
}

/// Language information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_extension: Option<String>,
}

/// A Jupyter cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cell_type", rename_all = "lowercase")]
pub enum IpynbCell {
    Code {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(default)]
        metadata: Map<String, Value>,
        #[serde(default)]
        source: MultilineString,
        #[serde(default)]
        execution_count: Option<u32>,
        #[serde(default)]
        outputs: Vec<IpynbOutput>,
    },
    Markdown {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(default)]
        metadata: Map<String, Value>,
        #[serde(default)]
        source: MultilineString,
    },
    /// Raw cells are read as markdown.
    Raw {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        #[serde(default)]
        metadata: Map<String, Value>,
        #[serde(default)]
        source: MultilineString,
    },
}

impl IpynbCell {
    fn id(&self) -> Option<&str> {
        match self {
            IpynbCell::Code { id, .. } | IpynbCell::Markdown { id, .. } | IpynbCell::Raw { id, .. } => {
                id.as_deref()
            }
        }
    }

    fn source(&self) -> &MultilineString {
        match self {
            IpynbCell::Code { source, .. }
            | IpynbCell::Markdown { source, .. }
            | IpynbCell::Raw { source, .. } => source,
        }
    }
}

/// Cell output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "output_type", rename_all = "snake_case")]
pub enum IpynbOutput {
    /// Standard output/error
    Stream { name: String, text: MultilineString },

    /// Value of the last expression (foreign notebooks)
    ExecuteResult {
        #[serde(default)]
        execution_count: Option<u32>,
        data: MimeBundle,
        #[serde(default)]
        metadata: Map<String, Value>,
    },

    /// Rich display data
    DisplayData {
        data: MimeBundle,
        #[serde(default)]
        metadata: Map<String, Value>,
    },

    /// Error output
    Error {
        ename: String,
        evalue: String,
        traceback: Vec<String>,
    },
}

/// nbformat's "multiline string": one string, or a list of lines each
/// keeping its trailing newline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MultilineString {
    Single(String),
    Lines(Vec<String>),
}

impl Default for MultilineString {
    fn default() -> Self {
        MultilineString::Lines(Vec::new())
    }
}

impl MultilineString {
    /// Split text into newline-terminated lines.
    pub fn from_text(text: &str) -> Self {
        MultilineString::Lines(text.split_inclusive('\n').map(String::from).collect())
    }

    /// Reassemble the text.
    ///
    /// Well-formed line lists are concatenated. Lists whose lines lack
    /// their newlines are joined with `\n`.
    pub fn to_text(&self) -> String {
        match self {
            MultilineString::Single(text) => text.clone(),
            MultilineString::Lines(lines) => {
                let terminated = lines
                    .iter()
                    .take(lines.len().saturating_sub(1))
                    .all(|line| line.ends_with('\n'));
                if terminated {
                    lines.concat()
                } else {
                    lines.join("\n")
                }
            }
        }
    }

    fn from_value(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}

impl IpynbDocument {
    /// Read a document from a file.
    pub fn read_from_file(path: impl AsRef<Path>) -> SyncResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| SyncError::ReadError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let document: Self = serde_json::from_str(&content)?;
        if document.nbformat != 4 {
            return Err(SyncError::InvalidNotebook(format!(
                "unsupported nbformat {}",
                document.nbformat
            )));
        }
        Ok(document)
    }

    /// Write the document to a file as pretty-printed JSON.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> SyncResult<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|e| SyncError::WriteError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(())
    }
}

/// Convert a notebook into an nbformat 4.5 document.
pub fn encode(notebook: &Notebook) -> IpynbDocument {
    let metadata = IpynbMetadata {
        kernelspec: Some(KernelSpec {
            display_name: "Python 3".to_string(),
            language: Some("python".to_string()),
            name: "python3".to_string(),
        }),
        language_info: Some(LanguageInfo {
            name: "python".to_string(),
            version: None,
            file_extension: Some(".py".to_string()),
        }),
        title: Some(notebook.title.clone()),
        created: notebook.created.clone(),
        modified: notebook.modified.clone(),
        extra: Map::new(),
    };

    IpynbDocument {
        metadata,
        nbformat: 4,
        nbformat_minor: 5,
        cells: notebook.cells.iter().map(encode_cell).collect(),
    }
}

fn encode_cell(cell: &Cell) -> IpynbCell {
    let id = Some(cell.id.clone());
    let source = MultilineString::from_text(&cell.content);
    match cell.cell_type {
        CellType::Markdown => IpynbCell::Markdown {
            id,
            metadata: Map::new(),
            source,
        },
        CellType::Code => IpynbCell::Code {
            id,
            metadata: Map::new(),
            source,
            execution_count: cell.execution_count,
            outputs: cell.output.iter().map(encode_output).collect(),
        },
    }
}

fn encode_output(output: &Output) -> IpynbOutput {
    match output.kind {
        OutputKind::Error => {
            let (ename, evalue) = exception_summary(&output.content);
            IpynbOutput::Error {
                ename,
                evalue,
                traceback: output.content.split('\n').map(String::from).collect(),
            }
        }
        OutputKind::Plot | OutputKind::Html => {
            let mut data = output.data.clone().unwrap_or_default();
            if !output.content.is_empty() {
                let plain = serde_json::to_value(MultilineString::from_text(&output.content))
                    .unwrap_or_else(|_| Value::String(output.content.clone()));
                data.insert(MIME_PLAIN.to_string(), plain);
            }
            IpynbOutput::DisplayData {
                data,
                metadata: Map::new(),
            }
        }
        OutputKind::Text => IpynbOutput::Stream {
            name: "stdout".to_string(),
            text: MultilineString::from_text(&output.content),
        },
    }
}

/// Exception name and message from the last line of a trace
/// (`ValueError: bad input` -> `("ValueError", "bad input")`).
fn exception_summary(trace: &str) -> (String, String) {
    let Some(last) = trace.lines().rev().find(|line| !line.trim().is_empty()) else {
        return ("Error".to_string(), String::new());
    };
    let last = last.trim();

    let is_name = |s: &str| {
        !s.is_empty() && s.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '.')
    };

    match last.split_once(':') {
        Some((name, message)) if is_name(name) => (name.to_string(), message.trim().to_string()),
        None if is_name(last) => (last.to_string(), String::new()),
        _ => ("Error".to_string(), String::new()),
    }
}

/// Convert a document into a notebook with the given id.
///
/// Cells without a persisted id get one derived from their source; outputs
/// beyond the first are dropped.
pub fn decode(id: &str, document: &IpynbDocument) -> Notebook {
    let mut seen: FxHashMap<String, u32> = FxHashMap::default();

    let cells = document
        .cells
        .iter()
        .map(|cell| {
            let content = cell.source().to_text();
            let id = match cell.id() {
                Some(id) => id.to_string(),
                None => derived_id(&content, &mut seen),
            };

            match cell {
                IpynbCell::Code {
                    execution_count,
                    outputs,
                    ..
                } => Cell {
                    id,
                    cell_type: CellType::Code,
                    content,
                    execution_count: *execution_count,
                    output: outputs.first().map(decode_output),
                    status: CellStatus::Idle,
                },
                IpynbCell::Markdown { .. } | IpynbCell::Raw { .. } => Cell {
                    id,
                    cell_type: CellType::Markdown,
                    content,
                    execution_count: None,
                    output: None,
                    status: CellStatus::Idle,
                },
            }
        })
        .collect();

    Notebook {
        id: id.to_string(),
        title: document
            .metadata
            .title
            .clone()
            .unwrap_or_else(|| DEFAULT_TITLE.to_string()),
        created: document.metadata.created.clone(),
        modified: document.metadata.modified.clone(),
        cells,
    }
}

/// First 8 hex digits of the source's SHA-256, suffixed `-2`, `-3`, ...
/// for repeated sources.
fn derived_id(content: &str, seen: &mut FxHashMap<String, u32>) -> String {
    let digest = format!("{:x}", Sha256::digest(content.as_bytes()));
    let base = digest[..8].to_string();
    let count = seen.entry(base.clone()).or_insert(0);
    *count += 1;
    if *count == 1 {
        base
    } else {
        format!("{}-{}", base, count)
    }
}

fn decode_output(output: &IpynbOutput) -> Output {
    match output {
        IpynbOutput::Error { traceback, .. } => Output {
            kind: OutputKind::Error,
            content: traceback.join("\n"),
            data: None,
        },
        IpynbOutput::Stream { text, .. } => Output {
            kind: OutputKind::Text,
            content: text.to_text(),
            data: None,
        },
        IpynbOutput::DisplayData { data, .. } => decode_bundle(data, OutputKind::Plot),
        IpynbOutput::ExecuteResult { data, .. } => decode_bundle(data, OutputKind::Text),
    }
}

/// Kind from the bundle's MIME keys; `fallback` when neither an image nor
/// HTML is present.
fn decode_bundle(bundle: &MimeBundle, fallback: OutputKind) -> Output {
    let mut data = bundle.clone();
    let content = data
        .remove(MIME_PLAIN)
        .and_then(|value| MultilineString::from_value(&value))
        .map(|text| text.to_text())
        .unwrap_or_default();

    let kind = if data.keys().any(|mime| mime.starts_with("image/")) {
        OutputKind::Plot
    } else if data.contains_key(MIME_HTML) {
        OutputKind::Html
    } else {
        fallback
    };

    Output {
        kind,
        content,
        data: (!data.is_empty()).then_some(data),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multiline_split_and_join() {
        let text = "a = 1\n\nprint(a)\n";
        let lines = MultilineString::from_text(text);
        assert_eq!(
            lines,
            MultilineString::Lines(vec![
                "a = 1\n".to_string(),
                "\n".to_string(),
                "print(a)\n".to_string()
            ])
        );
        assert_eq!(lines.to_text(), text);
        assert_eq!(MultilineString::from_text("").to_text(), "");
    }

    #[test]
    fn test_unterminated_lines_are_joined() {
        // Lines written without their newlines.
        let lines = MultilineString::Lines(vec!["x = 1".into(), "".into(), "x".into()]);
        assert_eq!(lines.to_text(), "x = 1\n\nx");
        assert_eq!(MultilineString::Single("y".into()).to_text(), "y");
    }

    #[test]
    fn test_exception_summary() {
        let trace = "Traceback (most recent call last):\n  File \"<cell>\", line 1\nZeroDivisionError: division by zero";
        assert_eq!(
            exception_summary(trace),
            ("ZeroDivisionError".to_string(), "division by zero".to_string())
        );
        assert_eq!(
            exception_summary("Traceback...\nKeyboardInterrupt\n"),
            ("KeyboardInterrupt".to_string(), String::new())
        );
        assert_eq!(
            exception_summary("cd: no such directory: /x"),
            ("cd".to_string(), "no such directory: /x".to_string())
        );
        assert_eq!(
            exception_summary("Command timed out (120s)"),
            ("Error".to_string(), String::new())
        );
    }

    #[test]
    fn test_error_output_shape() {
        let output = Output {
            kind: OutputKind::Error,
            content: "line one\nValueError: bad".to_string(),
            data: None,
        };
        let json = serde_json::to_value(encode_output(&output)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "output_type": "error",
                "ename": "ValueError",
                "evalue": "bad",
                "traceback": ["line one", "ValueError: bad"]
            })
        );
    }

    #[test]
    fn test_plot_output_shape() {
        let output = quill_core::ResultPayload::plot("fig\n", "AAAA".to_string()).output;
        let json = serde_json::to_value(encode_output(&output)).unwrap();
        assert_eq!(json["output_type"], "display_data");
        assert_eq!(json["data"]["image/png"], "AAAA");
        assert_eq!(json["data"]["text/plain"], serde_json::json!(["fig\n"]));

        let back = decode_output(&encode_output(&output));
        assert_eq!(back, output);
    }

    #[test]
    fn test_execute_result_decodes_as_text() {
        let raw = r#"{"output_type": "execute_result", "execution_count": 3,
                      "data": {"text/plain": "42"}, "metadata": {}}"#;
        let output: IpynbOutput = serde_json::from_str(raw).unwrap();
        let decoded = decode_output(&output);
        assert_eq!(decoded.kind, OutputKind::Text);
        assert_eq!(decoded.content, "42");
        assert_eq!(decoded.data, None);
    }

    #[test]
    fn test_display_data_without_image_is_plot() {
        let output = Output {
            kind: OutputKind::Plot,
            content: "fig".to_string(),
            data: None,
        };
        assert_eq!(decode_output(&encode_output(&output)), output);

        let html = quill_core::ResultPayload::html("<i>x</i>").output;
        assert_eq!(decode_output(&encode_output(&html)).kind, OutputKind::Html);
    }

    #[test]
    fn test_derived_ids_are_stable_and_distinct() {
        let mut seen = FxHashMap::default();
        let first = derived_id("x = 1", &mut seen);
        let second = derived_id("x = 1", &mut seen);
        let other = derived_id("y = 2", &mut seen);

        assert_eq!(first.len(), 8);
        assert_eq!(second, format!("{}-2", first));
        assert_ne!(first, other);

        let mut fresh = FxHashMap::default();
        assert_eq!(derived_id("x = 1", &mut fresh), first);
    }
}
