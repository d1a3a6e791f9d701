use crate::compression::{compress_image_file, CompressionOptions};
use crate::constants::DEFAULT_EXTENSION;
use crate::error::{MediaError, Result};
use crate::formats::OutputFormat;
use crate::storage_path::is_valid_image_filename;
use glob::glob;
use image::ImageFormat;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Totals for one batch run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchSummary {
    pub processed: usize,
    pub failed: usize,
    pub within_budget: usize,
    pub bytes_before: u64,
    pub bytes_after: u64,
    pub elapsed: Duration,
}

impl BatchSummary {
    pub fn compression_ratio(&self) -> f64 {
        if self.bytes_before == 0 {
            return 0.0;
        }
        ((self.bytes_before as f64 - self.bytes_after as f64) / self.bytes_before as f64) * 100.0
    }
}

/// Compresses every image found under `input` into `output`, in parallel.
/// Individual failures are logged and counted, not fatal.
pub fn batch_compress_images(
    input: &str,
    output: &Path,
    options: &CompressionOptions,
    recursive: bool,
) -> Result<BatchSummary> {
    options.validate()?;
    let start_time = Instant::now();

    let image_files = collect_image_files(input, recursive)?;
    if image_files.is_empty() {
        warn!("no image files found in {}", input);
        return Ok(BatchSummary::default());
    }

    fs::create_dir_all(output)
        .map_err(|_| MediaError::DirectoryCreationFailed(output.to_path_buf()))?;

    let progress = ProgressBar::new(image_files.len() as u64);
    progress.set_style(ProgressStyle::default_bar());

    let outcomes: Vec<Option<(u64, u64, bool)>> = image_files
        .par_iter()
        .map(|input_path| {
            let outcome = generate_output_path(input_path, output, options.format.as_deref())
                .and_then(|output_path| compress_image_file(input_path, &output_path, options));
            progress.inc(1);

            match outcome {
                Ok(result) => Some((
                    result.original_size as u64,
                    result.size() as u64,
                    result.within_budget,
                )),
                Err(e) => {
                    warn!("failed to process {}: {}", input_path.display(), e);
                    None
                }
            }
        })
        .collect();
    progress.finish_and_clear();

    let mut summary = outcomes
        .into_iter()
        .fold(BatchSummary::default(), |mut summary, outcome| {
            match outcome {
                Some((before, after, within_budget)) => {
                    summary.processed += 1;
                    summary.bytes_before += before;
                    summary.bytes_after += after;
                    summary.within_budget += within_budget as usize;
                }
                None => summary.failed += 1,
            }
            summary
        });
    summary.elapsed = start_time.elapsed();

    debug!(?summary, "batch complete");
    Ok(summary)
}

/// Resolves a file, a directory (optionally recursive) or a glob pattern into
/// the image files it names. Hidden entries are skipped.
pub fn collect_image_files(input: &str, recursive: bool) -> Result<Vec<PathBuf>> {
    let mut image_files = Vec::new();
    let input_path = Path::new(input);

    if input_path.is_file() {
        image_files.push(input_path.to_path_buf());
    } else if input_path.is_dir() {
        let walker = if recursive {
            WalkDir::new(input_path)
        } else {
            WalkDir::new(input_path).max_depth(1)
        };

        for entry in walker
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'))
        {
            let entry = entry?;
            let path = entry.path();
            if path.is_file() && is_image_file(path) {
                image_files.push(path.to_path_buf());
            }
        }
    } else if let Ok(pattern) = glob(input) {
        for entry in pattern.flatten() {
            if entry.is_file() && is_image_file(&entry) {
                image_files.push(entry);
            }
        }
    } else {
        return Err(MediaError::NoImageFilesFound(input.to_string()));
    }

    image_files.sort();
    Ok(image_files)
}

pub fn is_image_file(path: &Path) -> bool {
    path.file_name()
        .map(|name| is_valid_image_filename(&name.to_string_lossy()))
        .unwrap_or(false)
}

/// `{output_dir}/{stem}.{ext}`, the extension following the format override
/// when one is given, otherwise the format the input will be encoded as.
pub fn generate_output_path(
    input_path: &Path,
    output_dir: &Path,
    format: Option<&str>,
) -> Result<PathBuf> {
    let file_stem = input_path
        .file_stem()
        .ok_or_else(|| MediaError::UnsupportedFormat("Invalid file name".to_string()))?;

    let extension = match format {
        Some(fmt) => fmt.parse::<OutputFormat>()?.extension().to_string(),
        None => {
            let ext = input_path
                .extension()
                .and_then(|s| s.to_str())
                .unwrap_or(DEFAULT_EXTENSION);
            if ext.parse::<OutputFormat>().is_ok() {
                ext.to_string()
            } else {
                // Inputs we cannot write back (GIF) are re-encoded
                OutputFormat::for_input(ImageFormat::from_extension(ext))
                    .extension()
                    .to_string()
            }
        }
    };

    let output_filename = format!("{}.{}", file_stem.to_string_lossy(), extension);
    Ok(output_dir.join(output_filename))
}
