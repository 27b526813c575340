//! Inter-process communication with the Python worker process.
//!
//! This module provides the protocol and utilities for communicating
//! with the worker process that hosts the persistent namespace.

pub mod protocol;
mod worker;

pub use protocol::{WorkerCommand, WorkerResponse, read_message, write_message};
pub use worker::{BOOTSTRAP, WorkerHandle, WorkerSignal};
