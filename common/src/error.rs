use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("File not found: {}", path.display())]
    NotFound { path: PathBuf },
    #[error("Malformed csv {}:{line}{}: {message}", path.display(), column.map(|c| format!(":{c}")).unwrap_or_default())]
    Format {
        path: PathBuf,
        /// 1-based line number
        line: usize,
        /// 1-based field number, if the error is tied to a single field
        column: Option<usize>,
        message: String,
    },
    #[error("Cannot transform {} series {series} at row {row}: {message}", path.display())]
    Domain {
        path: PathBuf,
        series: String,
        /// 1-based data row
        row: usize,
        message: String,
    },
    #[error("Run {index} ({}) failed: {reason}", output.display())]
    Process {
        index: usize,
        output: PathBuf,
        reason: String,
    },
    #[error("Render failed for {}: {message}", path.display())]
    Render { path: PathBuf, message: String },
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReportError {
    pub(crate) fn format(
        path: impl Into<PathBuf>,
        line: usize,
        column: Option<usize>,
        message: impl Into<String>,
    ) -> Self {
        ReportError::Format {
            path: path.into(),
            line,
            column,
            message: message.into(),
        }
    }
}
