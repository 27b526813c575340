//! Notebook management commands: list, show, delete, new.

use std::process::ExitCode;

use quill_sync::{Cell, CellType, DEFAULT_TITLE, Notebook, NotebookStore};

use crate::colors;
use crate::output::print_output;

pub fn list(store: &NotebookStore) -> anyhow::Result<ExitCode> {
    let notebooks = store.list()?;
    if notebooks.is_empty() {
        println!(
            "{}No notebooks in {}{}",
            colors::YELLOW,
            store.dir().display(),
            colors::RESET
        );
        return Ok(ExitCode::SUCCESS);
    }

    for summary in notebooks {
        println!(
            "{}{:<24}{} {:<32} {}{}{}",
            colors::BOLD,
            summary.id,
            colors::RESET,
            summary.title,
            colors::DIM,
            summary.modified.as_deref().unwrap_or("-"),
            colors::RESET
        );
    }
    Ok(ExitCode::SUCCESS)
}

pub fn show(store: &NotebookStore, id: &str) -> anyhow::Result<ExitCode> {
    let Some(notebook) = store.load(id)? else {
        anyhow::bail!("Notebook not found: {}", id);
    };

    println!("\n{}{}{} ({})", colors::BOLD, notebook.title, colors::RESET, id);
    println!("{}", "─".repeat(50));

    for cell in &notebook.cells {
        match cell.cell_type {
            CellType::Markdown => {
                println!("{}{}{}", colors::DIM, cell.content, colors::RESET);
            }
            CellType::Code => {
                let count = cell
                    .execution_count
                    .map_or_else(|| " ".to_string(), |n| n.to_string());
                println!("{}In [{}]:{}", colors::CYAN, count, colors::RESET);
                println!("{}", cell.content);
                if let Some(output) = &cell.output {
                    print_output(output);
                }
            }
        }
        println!();
    }
    Ok(ExitCode::SUCCESS)
}

pub fn delete(store: &NotebookStore, id: &str) -> anyhow::Result<ExitCode> {
    if !store.delete(id)? {
        anyhow::bail!("Notebook not found: {}", id);
    }
    println!("Deleted notebook {}", id);
    Ok(ExitCode::SUCCESS)
}

/// Create a notebook holding one empty code cell.
pub fn create(store: &NotebookStore, id: &str, title: Option<&str>) -> anyhow::Result<ExitCode> {
    if store.load(id)?.is_some() {
        anyhow::bail!("Notebook {} already exists", id);
    }

    let mut notebook = Notebook::new(id, title.unwrap_or(DEFAULT_TITLE));
    notebook.cells.push(Cell::code(""));
    let path = store.save(id, &mut notebook)?;

    println!("Created new notebook: {}", path.display());
    Ok(ExitCode::SUCCESS)
}
