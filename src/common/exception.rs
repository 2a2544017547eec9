use std::io;
use thiserror::Error;

/// Errors surfaced while opening the on-disk files backing a database.
/// Runtime page I/O does not return these: a read or write that fails
/// mid-flight is a fatal fault for the storage engine.
#[derive(Error, Debug)]
pub enum DiskError {
    #[error("failed to open database file {path}")]
    Open {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("i/o error on backing file")]
    Io(#[from] io::Error),
}
