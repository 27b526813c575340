//! Exec command: dispatch one cell and print its payload.

use std::io::Read;
use std::process::ExitCode;

use quill_core::{Kernel, KernelConfig};

use crate::output::print_output;

/// Execute `code` (`-` reads stdin) in a fresh kernel.
pub fn execute(config: KernelConfig, code: &str, json: bool) -> anyhow::Result<ExitCode> {
    let code = if code == "-" {
        let mut buffer = String::new();
        std::io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        code.to_string()
    };

    let kernel = Kernel::python(config)?;
    let payload = kernel.execute(&code);

    if json {
        println!("{}", serde_json::to_string(&payload)?);
    } else {
        print_output(&payload.output);
    }

    Ok(if payload.is_error() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
