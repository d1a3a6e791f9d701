/// Image format utilities and type-safe format handling
///
/// Maps between file extensions, MIME types and the formats the compression
/// engine can write.
use crate::error::{MediaError, Result};
use image::ImageFormat;
use std::fmt;
use std::str::FromStr;

/// Formats the compression engine can encode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// JPEG with lossy, quality-controlled compression
    Jpeg,
    /// PNG, optimised losslessly with oxipng
    Png,
    /// Lossless WebP
    WebP,
}

impl OutputFormat {
    /// Returns the file extension for this format
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
            OutputFormat::WebP => "webp",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
            OutputFormat::WebP => "image/webp",
        }
    }

    /// The format a decoded input is re-encoded to when no override is given.
    /// Formats without a writable counterpart (GIF, BMP, ...) become JPEG.
    pub fn for_input(input: Option<ImageFormat>) -> Self {
        match input {
            Some(ImageFormat::Png) => OutputFormat::Png,
            Some(ImageFormat::WebP) => OutputFormat::WebP,
            _ => OutputFormat::Jpeg,
        }
    }

    /// Whether `filename` already carries this format's extension.
    pub fn matches_filename(&self, filename: &str) -> bool {
        let ext = extension_of(filename).unwrap_or_default();
        match self {
            OutputFormat::Jpeg => ext == "jpg" || ext == "jpeg",
            other => ext == other.extension(),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutputFormat::Jpeg => "JPEG",
            OutputFormat::Png => "PNG",
            OutputFormat::WebP => "WebP",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for OutputFormat {
    type Err = MediaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(OutputFormat::Jpeg),
            "png" => Ok(OutputFormat::Png),
            "webp" => Ok(OutputFormat::WebP),
            _ => Err(MediaError::UnsupportedFormat(s.to_string())),
        }
    }
}

/// Determine the output format from the decoded input and an optional override
pub fn determine_output_format(
    input: Option<ImageFormat>,
    format_override: Option<&str>,
) -> Result<OutputFormat> {
    match format_override {
        Some(fmt_str) => OutputFormat::from_str(fmt_str),
        None => Ok(OutputFormat::for_input(input)),
    }
}

/// Lowercased extension of a file name, without the dot.
pub fn extension_of(filename: &str) -> Option<String> {
    let (base, ext) = filename.rsplit_once('.')?;
    // ".jpg" alone is a dotfile, not an extension
    if base.is_empty() || ext.is_empty() || ext.contains('/') {
        return None;
    }
    Some(ext.to_lowercase())
}

/// Best-effort MIME type for a file name, used for the multipart file part.
pub fn mime_type_for_filename(filename: &str) -> &'static str {
    match extension_of(filename).as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        Some("bmp") => "image/bmp",
        Some("tif") | Some("tiff") => "image/tiff",
        _ => "application/octet-stream",
    }
}
