//! Terminal rendering of cell outputs.

use quill_core::payload::{MIME_HTML, MIME_PNG};
use quill_core::{Output, OutputKind};

use crate::colors;

/// Print an output. Errors go to stderr.
pub fn print_output(output: &Output) {
    match output.kind {
        OutputKind::Error => {
            eprintln!("{}{}{}", colors::RED, output.content, colors::RESET);
        }
        OutputKind::Text => {
            if !output.content.is_empty() {
                println!("{}", output.content);
            }
        }
        OutputKind::Html => {
            let html = data_str(output, MIME_HTML).unwrap_or(&output.content);
            println!("{}[html]{} {}", colors::DIM, colors::RESET, html);
        }
        OutputKind::Plot => {
            if !output.content.is_empty() {
                println!("{}", output.content);
            }
            let size = data_str(output, MIME_PNG).map_or(0, str::len);
            println!(
                "{}[plot: image/png, {} base64 bytes]{}",
                colors::DIM,
                size,
                colors::RESET
            );
        }
    }
}

fn data_str<'a>(output: &'a Output, key: &str) -> Option<&'a str> {
    output.data.as_ref()?.get(key)?.as_str()
}
