use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum GaldynError {
    #[error("download of {name} failed: {message}")]
    Transport { name: String, message: String },

    #[error("file {0} does not appear to exist on the server")]
    ResourceNotFound(String),

    #[error("download of {0} was interrupted")]
    InterruptedTransfer(String),

    #[error("{section} section row {line}: id {id:?} is not present in the primary section")]
    Lookup {
        section: &'static str,
        line: usize,
        id: String,
    },

    #[error("primary section row {line}: field {field} has malformed value {value:?}: {message}")]
    MalformedPrimaryField {
        line: usize,
        field: &'static str,
        value: String,
        message: String,
    },

    #[error("invalid arXiv identifier: {0}")]
    InvalidEprint(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("required tool not found: {0}")]
    MissingTool(String),

    #[error("unpacking {path} failed: {message}")]
    Extraction { path: String, message: String },

    #[error("failed to read table {path}: {message}")]
    TableRead { path: String, message: String },

    #[error("failed to write output: {0}")]
    Output(String),
}
