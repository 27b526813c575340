//! In-memory notebook model, as exchanged with the editor.

use quill_core::{Output, ResultPayload};
use serde::{Deserialize, Serialize};

/// Default title for notebooks that do not carry one.
pub const DEFAULT_TITLE: &str = "Untitled";

/// A notebook: ordered cells plus descriptive metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notebook {
    pub id: String,
    pub title: String,
    /// RFC 3339 creation time, verbatim.
    #[serde(default)]
    pub created: Option<String>,
    /// RFC 3339 modification time, verbatim.
    #[serde(default)]
    pub modified: Option<String>,
    #[serde(default)]
    pub cells: Vec<Cell>,
}

impl Notebook {
    /// Create an empty notebook.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            created: None,
            modified: None,
            cells: Vec::new(),
        }
    }

    /// Code cells in order.
    pub fn code_cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells.iter().filter(|c| c.cell_type == CellType::Code)
    }

    pub fn summary(&self) -> NotebookSummary {
        NotebookSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            created: self.created.clone(),
            modified: self.modified.clone(),
        }
    }
}

/// Kind of cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellType {
    Code,
    Markdown,
}

/// Execution state of a cell, as shown in the editor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellStatus {
    #[default]
    Idle,
    Running,
    Success,
    Error,
}

/// A single notebook cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cell {
    /// Stable identifier.
    pub id: String,
    #[serde(rename = "type")]
    pub cell_type: CellType,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_count: Option<u32>,
    /// Last-known output (code cells only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Output>,
    #[serde(default)]
    pub status: CellStatus,
}

impl Cell {
    fn new(cell_type: CellType, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            cell_type,
            content: content.into(),
            execution_count: None,
            output: None,
            status: CellStatus::Idle,
        }
    }

    /// A new code cell with a fresh id.
    pub fn code(content: impl Into<String>) -> Self {
        Self::new(CellType::Code, content)
    }

    /// A new markdown cell with a fresh id.
    pub fn markdown(content: impl Into<String>) -> Self {
        Self::new(CellType::Markdown, content)
    }

    /// Record the result of running this cell.
    pub fn record(&mut self, payload: ResultPayload, execution_count: u32) {
        self.status = if payload.is_error() {
            CellStatus::Error
        } else {
            CellStatus::Success
        };
        self.output = Some(payload.output);
        self.execution_count = Some(execution_count);
    }
}

/// Listing entry for a stored notebook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotebookSummary {
    pub id: String,
    pub title: String,
    pub created: Option<String>,
    pub modified: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::OutputKind;

    #[test]
    fn test_cells_get_unique_ids() {
        let a = Cell::code("x = 1");
        let b = Cell::code("x = 1");
        assert_ne!(a.id, b.id);
        assert_eq!(uuid::Uuid::parse_str(&a.id).unwrap().get_version_num(), 4);
    }

    #[test]
    fn test_editor_json_uses_camel_case() {
        let mut cell = Cell::code("1 + 1");
        cell.id = "c1".to_string();
        cell.record(ResultPayload::text("2"), 3);

        let json = serde_json::to_value(&cell).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": "c1",
                "type": "code",
                "content": "1 + 1",
                "executionCount": 3,
                "output": {"type": "text", "content": "2"},
                "status": "success"
            })
        );
    }

    #[test]
    fn test_record_error_sets_status() {
        let mut cell = Cell::code("1 / 0");
        cell.record(ResultPayload::error("ZeroDivisionError"), 1);
        assert_eq!(cell.status, CellStatus::Error);
        assert_eq!(cell.output.as_ref().unwrap().kind, OutputKind::Error);
    }

    #[test]
    fn test_status_defaults_to_idle() {
        let cell: Cell =
            serde_json::from_str(r##"{"id": "a", "type": "markdown", "content": "# Hi"}"##).unwrap();
        assert_eq!(cell.status, CellStatus::Idle);
        assert_eq!(cell.cell_type, CellType::Markdown);
    }
}
