use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Failed to launch {program}: {source}\nMake sure the program is installed and on your PATH.")]
    Launch {
        program: String,
        source: std::io::Error,
    },

    #[error("A sync is already running\nWait for it to finish or cancel it first.")]
    AlreadyRunning,

    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    #[error("Refusing to overwrite existing file: {path}\nBoth conflict copies were left in place.")]
    TargetExists { path: PathBuf },

    #[error("Failed to rename {from} to {to}\nCause: {source}\nBoth conflict copies were left in place.")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to delete {path}\nCause: {source}")]
    Delete {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Merge tool {tool} failed: {detail}\nBoth conflict copies were left in place.")]
    MergeTool { tool: String, detail: String },

    #[error("Not a conflict copy (no conflict suffix): {path}")]
    NotAConflictCopy { path: PathBuf },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SyncError>;
