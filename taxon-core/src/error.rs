use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("{source_name} table has no '{column}' column")]
    MissingColumn { source_name: String, column: String },

    #[error("Node record #{index} has no node id")]
    MalformedNode { index: usize },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Scan error: {0}")]
    Scan(#[from] taxon_scanner::ScanError),

    #[error("Invalid value in {context}: {value}")]
    InvalidValue { context: String, value: String },
}

pub type Result<T> = std::result::Result<T, CoreError>;
