use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum KiraError {
    #[error("input file not found: {0}")]
    MissingInput(PathBuf),

    #[error("failed to open input {path}: {message}")]
    InputOpen { path: PathBuf, message: String },

    #[error("failed to write output {path}: {message}")]
    OutputWrite { path: PathBuf, message: String },

    #[error("malformed JSON stream: {0}")]
    JsonStream(String),

    #[error("failed to read delimited source {path}: {message}")]
    Delimited { path: PathBuf, message: String },

    #[error("column not found in joined data: {0}")]
    MissingColumn(String),

    #[error("failed to read species config at {0}")]
    ConfigRead(PathBuf),

    #[error("invalid taxonomy id: {0}")]
    InvalidTaxId(String),

    #[error("species {0} has no taxId in config")]
    MissingTaxId(String),

    #[error("Proteins API request failed: {0}")]
    ProteinsHttp(String),

    #[error("Proteins API returned status {status}: {message}")]
    ProteinsStatus { status: u16, message: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
