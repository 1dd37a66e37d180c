use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Cannot read melody source '{name}': {source}")]
    SourceUnavailable {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("Melody source '{name}' is too large ({len} bytes)")]
    FileTooLarge { name: String, len: u64 },

    #[error("Out of memory while loading melody source '{name}'")]
    OutOfMemory { name: String },

    #[error("Unexpected end of input")]
    EndOfInput,

    #[error("Truncated melody: {0}")]
    Truncated(String),

    #[error("Malformed melody at offset {offset}: {message}")]
    FileFormat { offset: usize, message: String },

    #[error("Unsupported {field} 0x{version:04x}")]
    UnrecognizedFormat { field: &'static str, version: u32 },

    #[error("Invalid duration '{found}' at offset {offset}")]
    InvalidDuration { found: char, offset: usize },

    #[error("Seek to offset {offset} is beyond the end of a {len}-byte source")]
    OutOfRange { offset: usize, len: usize },

    #[error("Invalid session state: {0}")]
    InvalidState(String),

    #[error("PWM device error on '{}': {source}", path.display())]
    Device {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("No PWM device: {0}")]
    NoDevice(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
