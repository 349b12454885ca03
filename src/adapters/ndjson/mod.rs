//! Local newline-delimited JSON backends
//!
//! A file source reading `*.ndjson` / `*.jsonl` files and a filesystem sink
//! writing one file per batch.

pub mod sink;
pub mod source;

pub use sink::{FilesystemSink, FilesystemSinkParams};
pub use source::{FileSource, FileSourceParams};
