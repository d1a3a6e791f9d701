use crate::constants::{
    BYTES_PER_MB, DEFAULT_MAX_HEIGHT, DEFAULT_MAX_RETRIES, DEFAULT_MAX_SIZE_MB, DEFAULT_MAX_WIDTH,
    DEFAULT_QUALITY, DEFAULT_QUALITY_FLOOR, DEFAULT_QUALITY_STEP, OXIPNG_PRESET,
    PNG_DEFLATE_LEVEL, THUMBNAIL_QUALITY,
};
use crate::error::{MediaError, Result};
use crate::formats::{determine_output_format, OutputFormat};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use oxipng::{Deflaters, Options};
use rayon::prelude::*;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Size, quality and retry budget for one compression call.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressionOptions {
    pub max_width: u32,
    pub max_height: u32,
    /// Encoder quality in (0, 1]
    pub quality: f32,
    pub max_size_mb: f64,
    /// Re-encodes allowed after the first one when the output is over budget
    pub max_retries: u32,
    pub quality_step: f32,
    pub quality_floor: f32,
    /// Output format override (jpeg, png, webp); defaults to the input format
    pub format: Option<String>,
}

impl Default for CompressionOptions {
    fn default() -> Self {
        Self {
            max_width: DEFAULT_MAX_WIDTH,
            max_height: DEFAULT_MAX_HEIGHT,
            quality: DEFAULT_QUALITY,
            max_size_mb: DEFAULT_MAX_SIZE_MB,
            max_retries: DEFAULT_MAX_RETRIES,
            quality_step: DEFAULT_QUALITY_STEP,
            quality_floor: DEFAULT_QUALITY_FLOOR,
            format: None,
        }
    }
}

impl CompressionOptions {
    /// Builds options from optional overrides, falling back to the defaults
    /// for anything not supplied.
    pub fn new(
        max_width: Option<u32>,
        max_height: Option<u32>,
        quality: Option<f32>,
        max_size_mb: Option<f64>,
    ) -> Result<Self> {
        let defaults = Self::default();
        let options = Self {
            max_width: max_width.unwrap_or(defaults.max_width),
            max_height: max_height.unwrap_or(defaults.max_height),
            quality: quality.unwrap_or(defaults.quality),
            max_size_mb: max_size_mb.unwrap_or(defaults.max_size_mb),
            ..defaults
        };
        options.validate()?;
        Ok(options)
    }

    pub fn with_retry_policy(
        mut self,
        max_retries: u32,
        quality_step: f32,
        quality_floor: f32,
    ) -> Result<Self> {
        self.max_retries = max_retries;
        self.quality_step = quality_step;
        self.quality_floor = quality_floor;
        self.validate()?;
        Ok(self)
    }

    pub fn with_format(mut self, format: Option<String>) -> Self {
        self.format = format;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.quality > 0.0 && self.quality <= 1.0) {
            return Err(MediaError::InvalidOptions(format!(
                "quality {} must be in (0, 1]",
                self.quality
            )));
        }
        if self.max_width == 0 || self.max_height == 0 {
            return Err(MediaError::InvalidOptions(format!(
                "bounds {}x{} must be positive",
                self.max_width, self.max_height
            )));
        }
        if !(self.max_size_mb > 0.0 && self.max_size_mb.is_finite()) {
            return Err(MediaError::InvalidOptions(format!(
                "max_size_mb {} must be positive",
                self.max_size_mb
            )));
        }
        if !(self.quality_step >= 0.0 && self.quality_step < 1.0) {
            return Err(MediaError::InvalidOptions(format!(
                "quality_step {} must be in [0, 1)",
                self.quality_step
            )));
        }
        if !(self.quality_floor > 0.0 && self.quality_floor <= 1.0) {
            return Err(MediaError::InvalidOptions(format!(
                "quality_floor {} must be in (0, 1]",
                self.quality_floor
            )));
        }
        Ok(())
    }

    fn max_size_bytes(&self) -> f64 {
        self.max_size_mb * BYTES_PER_MB
    }
}

/// Output of one compression call.
///
/// `within_budget` is false when the last permitted encode still exceeded
/// `max_size_mb`; the bytes are returned anyway.
#[derive(Debug, Clone)]
pub struct CompressionResult {
    pub bytes: Vec<u8>,
    pub format: OutputFormat,
    pub width: u32,
    pub height: u32,
    pub original_size: usize,
    /// Quality of the encode that produced `bytes`
    pub quality: f32,
    pub attempts: u32,
    pub within_budget: bool,
}

impl CompressionResult {
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn size_mb(&self) -> f64 {
        self.bytes.len() as f64 / BYTES_PER_MB
    }

    /// Percentage saved relative to the input; negative when the output grew.
    pub fn compression_ratio(&self) -> f64 {
        if self.original_size == 0 {
            return 0.0;
        }
        ((self.original_size as f64 - self.bytes.len() as f64) / self.original_size as f64) * 100.0
    }
}

/// Decodes, fits within the bounds, encodes, and re-encodes at lower quality
/// while the output is over budget and retries remain.
///
/// # Errors
/// * `MediaError::Decode` if the bytes are not a decodable image
/// * `MediaError::InvalidOptions` if the options fail validation
pub fn compress(input: &[u8], options: &CompressionOptions) -> Result<CompressionResult> {
    options.validate()?;

    let (mut img, input_format) = decode_image(input)?;
    let (original_width, original_height) = img.dimensions();
    resize_image(&mut img, options);

    let format = determine_output_format(input_format, options.format.as_deref())?;
    let budget = options.max_size_bytes();

    let mut quality = options.quality;
    let mut bytes = encode_image(&img, format, quality)?;
    let mut attempts = 1;

    while bytes.len() as f64 > budget && attempts <= options.max_retries {
        let next = (quality - options.quality_step).max(options.quality_floor);
        debug!(
            size = bytes.len(),
            budget_mb = options.max_size_mb,
            from = quality,
            to = next,
            "output over budget, re-encoding"
        );
        quality = next;
        bytes = encode_image(&img, format, quality)?;
        attempts += 1;
    }

    let within_budget = bytes.len() as f64 <= budget;
    if !within_budget {
        warn!(
            size = bytes.len(),
            budget_mb = options.max_size_mb,
            attempts,
            "compressed image still exceeds size budget"
        );
    }

    debug!(
        original_width,
        original_height,
        width = img.width(),
        height = img.height(),
        original_size = input.len(),
        compressed_size = bytes.len(),
        %format,
        "image compressed"
    );

    Ok(CompressionResult {
        format,
        width: img.width(),
        height: img.height(),
        original_size: input.len(),
        quality,
        attempts,
        within_budget,
        bytes,
    })
}

/// Compresses every input in parallel, preserving order.
///
/// Fails with the first error encountered; wrap individual calls to
/// [`compress`] to tolerate per-item failures.
pub fn compress_many<B>(inputs: &[B], options: &CompressionOptions) -> Result<Vec<CompressionResult>>
where
    B: AsRef<[u8]> + Sync,
{
    inputs
        .par_iter()
        .map(|input| compress(input.as_ref(), options))
        .collect()
}

/// Renders a local preview: the larger side scaled to `size`, JPEG at a fixed
/// quality, returned as a `data:` URI.
pub fn thumbnail(input: &[u8], size: u32) -> Result<String> {
    if size == 0 {
        return Err(MediaError::InvalidOptions(
            "thumbnail size must be positive".to_string(),
        ));
    }

    let (img, _) = decode_image(input)?;
    let (width, height) = img.dimensions();
    let scale = size as f64 / width.max(height) as f64;
    let target_width = ((width as f64 * scale).round() as u32).max(1);
    let target_height = ((height as f64 * scale).round() as u32).max(1);

    let preview = img.resize_exact(target_width, target_height, FilterType::Triangle);
    let bytes = encode_image(&preview, OutputFormat::Jpeg, THUMBNAIL_QUALITY)?;

    Ok(format!("data:image/jpeg;base64,{}", STANDARD.encode(bytes)))
}

/// Compresses an image file on disk into `output`.
///
/// Without an explicit format override, the output extension picks the
/// encoder when it names a supported format.
pub fn compress_image_file(
    input: &Path,
    output: &Path,
    options: &CompressionOptions,
) -> Result<CompressionResult> {
    if !input.exists() {
        return Err(MediaError::FileNotFound(input.to_path_buf()));
    }

    let data = fs::read(input)?;
    let mut options = options.clone();
    if options.format.is_none() {
        options.format = output
            .extension()
            .and_then(|ext| ext.to_str())
            .filter(|ext| ext.parse::<OutputFormat>().is_ok())
            .map(str::to_string);
    }

    let result = compress(&data, &options)?;

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|_| MediaError::DirectoryCreationFailed(parent.to_path_buf()))?;
    }
    fs::write(output, &result.bytes)?;

    Ok(result)
}

/// Decodes image bytes, reporting the detected container format.
pub fn decode_image(input: &[u8]) -> Result<(DynamicImage, Option<ImageFormat>)> {
    let format = image::guess_format(input).ok();
    let img = image::load_from_memory(input).map_err(|e| MediaError::Decode(e.to_string()))?;
    Ok((img, format))
}

/// Dimensions that fit `(width, height)` inside the bounds with the aspect
/// ratio preserved. Images already inside the bounds are left alone.
pub fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width <= max_width && height <= max_height {
        return (width, height);
    }

    let ratio = (max_width as f64 / width as f64).min(max_height as f64 / height as f64);
    let new_width = ((width as f64 * ratio).round() as u32).clamp(1, max_width);
    let new_height = ((height as f64 * ratio).round() as u32).clamp(1, max_height);
    (new_width, new_height)
}

pub fn resize_image(img: &mut DynamicImage, options: &CompressionOptions) {
    let (width, height) = img.dimensions();
    let (new_width, new_height) = fit_within(width, height, options.max_width, options.max_height);

    if (new_width, new_height) != (width, height) {
        debug!(width, height, new_width, new_height, "resizing image");
        *img = img.resize_exact(new_width, new_height, FilterType::Triangle);
    }
}

/// Encodes `img` as `format`. `quality` in (0, 1] only affects JPEG.
pub fn encode_image(img: &DynamicImage, format: OutputFormat, quality: f32) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();

    match format {
        OutputFormat::Jpeg => {
            // JPEG has no alpha channel
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            let encoder = JpegEncoder::new_with_quality(&mut buffer, quality_percent(quality));
            rgb.write_with_encoder(encoder)
                .map_err(|e| MediaError::Encode(e.to_string()))?;
        }
        OutputFormat::Png => {
            img.write_with_encoder(PngEncoder::new(&mut buffer))
                .map_err(|e| MediaError::Encode(e.to_string()))?;
            buffer = oxipng::optimize_from_memory(&buffer, &png_options())
                .map_err(|e| MediaError::Encode(format!("PNG optimization failed: {}", e)))?;
        }
        OutputFormat::WebP => {
            let pixels = if img.color().has_alpha() {
                DynamicImage::ImageRgba8(img.to_rgba8())
            } else {
                DynamicImage::ImageRgb8(img.to_rgb8())
            };
            pixels
                .write_with_encoder(WebPEncoder::new_lossless(&mut buffer))
                .map_err(|e| MediaError::Encode(e.to_string()))?;
        }
    }

    Ok(buffer)
}

fn quality_percent(quality: f32) -> u8 {
    (quality * 100.0).round().clamp(1.0, 100.0) as u8
}

/// Fixed oxipng settings. PNG is lossless, so quality has no say here and a
/// retry can never produce a larger file than the first pass.
fn png_options() -> Options {
    let mut options = Options::from_preset(OXIPNG_PRESET);
    options.deflate = Deflaters::Libdeflater {
        compression: PNG_DEFLATE_LEVEL,
    };
    options
}
