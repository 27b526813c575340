//! IPC protocol messages for the Python worker process.
//!
//! Uses length-prefixed JSON messages over the worker's private pipes.
//! Format: 4-byte length (u32 LE) + JSON-encoded message.

use std::io::{Read, Write};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::Preload;
use crate::error::{Error, Result};
use crate::eval::Binding;

/// Largest frame either side will accept (100MB).
pub const MAX_MESSAGE_LEN: usize = 100 * 1024 * 1024;

/// Command sent from the kernel to the worker process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum WorkerCommand {
    /// Ping to check if the worker is alive.
    Ping,

    /// Execute statements in the persistent namespace.
    Exec { code: String },

    /// Evaluate an expression in the persistent namespace.
    Eval { code: String },

    /// Compile-only check of expression grammar.
    Probe { code: String },

    /// Redirect stdout/stderr into buffers.
    CaptureBegin,

    /// Restore stdout/stderr and return the buffers.
    CaptureEnd,

    /// Render and clear pending figures.
    Plot,

    /// Run file contents in a fresh namespace and merge the results back.
    RunFile { code: String, path: String },

    /// Time `number` executions of the code.
    Time { code: String, number: u64 },

    /// List the namespace.
    Bindings,

    /// Replace the namespace.
    Reset { preload: Vec<Preload> },

    /// Change the worker's working directory.
    Chdir { path: String },

    /// Set an environment variable in the worker.
    Setenv { key: String, value: String },

    /// Shutdown the worker process gracefully.
    Shutdown,
}

/// Response sent from the worker to the kernel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkerResponse {
    /// Response to Ping command.
    Pong,

    /// Command completed with nothing to report.
    Done,

    /// Result of an evaluation. `None` for the none sentinel.
    Value { repr: Option<String> },

    /// Result of a grammar probe.
    Probe { expression: bool },

    /// Captured stream contents.
    Streams { stdout: String, stderr: String },

    /// Pending figure as base64 PNG, if any.
    Plot { png: Option<String> },

    /// Elapsed time of a timing run.
    Timing { seconds: f64 },

    /// Namespace snapshot.
    Bindings { bindings: Vec<Binding> },

    /// User code raised an exception.
    Raised {
        ename: String,
        evalue: String,
        traceback: String,
    },

    /// The worker could not carry out the command.
    Failed { message: String },

    /// Acknowledgement of shutdown request.
    ShuttingDown,
}

/// Write a message to a writer using length-prefixed JSON encoding.
pub fn write_message<W: Write, T: Serialize>(writer: &mut W, message: &T) -> Result<()> {
    let bytes = serde_json::to_vec(message)
        .map_err(|e| Error::Serialization(format!("Failed to encode IPC message: {}", e)))?;

    if bytes.len() > MAX_MESSAGE_LEN {
        return Err(Error::Ipc(format!(
            "IPC message too large: {} bytes",
            bytes.len()
        )));
    }

    let len = bytes.len() as u32;
    writer
        .write_all(&len.to_le_bytes())
        .map_err(|e| Error::Ipc(format!("Failed to write IPC message length: {}", e)))?;
    writer
        .write_all(&bytes)
        .map_err(|e| Error::Ipc(format!("Failed to write IPC message body: {}", e)))?;
    writer
        .flush()
        .map_err(|e| Error::Ipc(format!("Failed to flush IPC stream: {}", e)))?;

    Ok(())
}

/// Read a message from a reader using length-prefixed JSON encoding.
pub fn read_message<R: Read, T: DeserializeOwned>(reader: &mut R) -> Result<T> {
    let mut len_bytes = [0u8; 4];
    reader
        .read_exact(&mut len_bytes)
        .map_err(|e| Error::Ipc(format!("Failed to read IPC message length: {}", e)))?;
    let len = u32::from_le_bytes(len_bytes) as usize;

    if len > MAX_MESSAGE_LEN {
        return Err(Error::Ipc(format!("IPC message too large: {} bytes", len)));
    }

    let mut bytes = vec![0u8; len];
    reader
        .read_exact(&mut bytes)
        .map_err(|e| Error::Ipc(format!("Failed to read IPC message body: {}", e)))?;

    serde_json::from_slice(&bytes)
        .map_err(|e| Error::Serialization(format!("Failed to decode IPC message: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_command_wire_format() {
        let cmd = WorkerCommand::Time {
            code: "sum(range(10))".to_string(),
            number: 5,
        };

        let mut buf = Vec::new();
        write_message(&mut buf, &cmd).unwrap();

        let len = u32::from_le_bytes(buf[..4].try_into().unwrap()) as usize;
        assert_eq!(len, buf.len() - 4);

        let json: serde_json::Value = serde_json::from_slice(&buf[4..]).unwrap();
        assert_eq!(json["op"], "time");
        assert_eq!(json["number"], 5);

        let mut cursor = Cursor::new(buf);
        let decoded: WorkerCommand = read_message(&mut cursor).unwrap();
        assert_eq!(decoded, cmd);
    }

    #[test]
    fn test_unit_command_is_bare_tag() {
        let json = serde_json::to_string(&WorkerCommand::CaptureBegin).unwrap();
        assert_eq!(json, r#"{"op":"capture_begin"}"#);
    }

    #[test]
    fn test_response_from_worker_json() {
        // Exactly what the bootstrap script emits for a raised exception.
        let body = br#"{"kind": "raised", "ename": "NameError", "evalue": "name 'x' is not defined", "traceback": "Traceback..."}"#;
        let mut frame = (body.len() as u32).to_le_bytes().to_vec();
        frame.extend_from_slice(body);

        let decoded: WorkerResponse = read_message(&mut Cursor::new(frame)).unwrap();
        match decoded {
            WorkerResponse::Raised { ename, .. } => assert_eq!(ename, "NameError"),
            other => panic!("Wrong response type: {:?}", other),
        }
    }

    #[test]
    fn test_value_none_sentinel() {
        let decoded: WorkerResponse =
            serde_json::from_str(r#"{"kind": "value", "repr": null}"#).unwrap();
        assert_eq!(decoded, WorkerResponse::Value { repr: None });
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let frame = ((MAX_MESSAGE_LEN as u32) + 1).to_le_bytes().to_vec();
        let result: Result<WorkerResponse> = read_message(&mut Cursor::new(frame));
        assert!(matches!(result, Err(Error::Ipc(msg)) if msg.contains("too large")));
    }

    #[test]
    fn test_truncated_frame_is_ipc_error() {
        let mut frame = 64u32.to_le_bytes().to_vec();
        frame.extend_from_slice(b"{\"kind\":");
        let result: Result<WorkerResponse> = read_message(&mut Cursor::new(frame));
        assert!(matches!(result, Err(Error::Ipc(_))));
    }
}
