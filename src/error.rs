use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to create output directory: {0}")]
    DirectoryCreationFailed(PathBuf),

    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Failed to encode image: {0}")]
    Encode(String),

    #[error("Invalid image filename: {0}. Allowed extensions: .jpg, .jpeg, .png, .gif, .webp, .svg")]
    InvalidFilename(String),

    #[error("Invalid compression options: {0}")]
    InvalidOptions(String),

    #[error("File is empty: {0}")]
    EmptyFile(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("upload failed: {0}")]
    Network(String),

    #[error("{message}")]
    HttpStatus { status: u16, message: String },

    #[error("upload aborted")]
    Aborted,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No image files found in input path: {0}")]
    NoImageFilesFound(String),

    #[error("Walkdir error: {0}")]
    WalkdirError(#[from] walkdir::Error),
}

impl MediaError {
    /// Status code of a rejected upload, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            MediaError::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, MediaError>;
