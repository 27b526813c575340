//! Notebook documents for Quill.
//!
//! Converts the editor's notebook model to and from Jupyter `.ipynb`
//! (nbformat 4.5) and stores documents on disk keyed by id.
//!
//! # Architecture
//!
//! ```text
//! Notebook ──► ipynb::encode ──► IpynbDocument ──► <dir>/<id>.ipynb
//!    ▲                                                    │
//!    └──────── ipynb::decode ◄── IpynbDocument ◄──────────┘
//!                                 (NotebookStore)
//! ```

mod error;
pub mod ipynb;
mod notebook;
mod store;

pub use error::{SyncError, SyncResult};
pub use ipynb::{IpynbDocument, decode, encode};
pub use notebook::{Cell, CellStatus, CellType, DEFAULT_TITLE, Notebook, NotebookSummary};
pub use store::NotebookStore;
