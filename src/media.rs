use crate::error::Result;
use crate::formats::{extension_of, mime_type_for_filename, OutputFormat};
use std::fs;
use std::path::Path;

/// An in-memory file handed to the pipeline: a name and its bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    pub name: String,
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl MediaFile {
    /// Wraps raw bytes, inferring the MIME type from the file name.
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let name = name.into();
        let mime_type = mime_type_for_filename(&name).to_string();
        Self {
            name,
            bytes,
            mime_type,
        }
    }

    /// Reads a file from disk, keeping only its file name.
    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());
        Ok(Self::new(name, bytes))
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Replaces the bytes with an encoded image, renaming the file when the
    /// encoded format no longer matches the original extension.
    pub fn replaced_with(&self, bytes: Vec<u8>, format: OutputFormat) -> Self {
        let name = if format.matches_filename(&self.name) {
            self.name.clone()
        } else {
            rename_extension(&self.name, format.extension())
        };
        Self {
            name,
            bytes,
            mime_type: format.mime_type().to_string(),
        }
    }
}

fn rename_extension(name: &str, extension: &str) -> String {
    match name.rsplit_once('.') {
        Some((base, _)) if extension_of(name).is_some() => format!("{}.{}", base, extension),
        _ => format!("{}.{}", name, extension),
    }
}
