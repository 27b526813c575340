//! Run command: execute a stored notebook headlessly.
//!
//! Code cells run in order through one kernel. Each cell records its output,
//! execution count and status, and the notebook is saved back. Ctrl-C
//! interrupts the running cell and stops the run after it.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use quill_core::{Kernel, KernelConfig};
use quill_sync::{CellType, NotebookStore};

use crate::colors;
use crate::output::print_output;

pub async fn execute(store: &NotebookStore, config: KernelConfig, id: &str) -> anyhow::Result<ExitCode> {
    let start = Instant::now();

    let Some(mut notebook) = store.load(id)? else {
        anyhow::bail!("Notebook not found: {}", id);
    };

    println!(
        "\n{}Running{} {} ({})",
        colors::BOLD,
        colors::RESET,
        notebook.title,
        id
    );
    println!("{}", "─".repeat(50));

    let kernel = Arc::new(Kernel::python(config)?);
    let mut executed = 0;
    let mut failed = 0;
    let mut interrupted = false;

    for cell in notebook.cells.iter_mut() {
        if cell.cell_type != CellType::Code {
            continue;
        }

        let code = cell.content.clone();
        let worker = Arc::clone(&kernel);
        let mut task = tokio::task::spawn_blocking(move || {
            let payload = worker.execute(&code);
            (payload, worker.execution_count())
        });

        let (payload, count) = loop {
            tokio::select! {
                result = &mut task => break result?,
                _ = tokio::signal::ctrl_c() => {
                    eprintln!("{}Interrupting...{}", colors::YELLOW, colors::RESET);
                    interrupted = true;
                    kernel.request_interrupt();
                }
            }
        };

        println!("{}In [{}]:{}", colors::CYAN, count, colors::RESET);
        print_output(&payload.output);

        executed += 1;
        if payload.is_error() {
            failed += 1;
        }
        cell.record(payload, count);

        if interrupted {
            break;
        }
    }

    let path = store.save(id, &mut notebook)?;

    println!("\n{}", "─".repeat(50));
    let (color, label) = if failed == 0 && !interrupted {
        (colors::GREEN, "Completed")
    } else {
        (colors::RED, if interrupted { "Interrupted" } else { "Completed with errors" })
    };
    println!(
        "{}{}{} {} cells ({} failed) in {:.2}s, saved to {}",
        color,
        label,
        colors::RESET,
        executed,
        failed,
        start.elapsed().as_secs_f64(),
        path.display()
    );

    Ok(if failed == 0 && !interrupted {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
