#![allow(dead_code)]

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A gradient so encoders have something to compress.
pub fn gradient_image(width: u32, height: u32) -> DynamicImage {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            (x * 255 / width.max(1)) as u8,
            (y * 255 / height.max(1)) as u8,
            ((x + y) % 256) as u8,
        ])
    });
    DynamicImage::ImageRgb8(img)
}

pub fn encoded_image(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    gradient_image(width, height)
        .write_to(&mut buffer, format)
        .unwrap();
    buffer.into_inner()
}

pub fn write_test_image(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
    let path = dir.join(name);
    let format = ImageFormat::from_path(&path).unwrap();
    std::fs::write(&path, encoded_image(width, height, format)).unwrap();
    path
}

pub fn create_test_image_files(temp_dir: &Path) -> Vec<PathBuf> {
    vec![
        write_test_image(temp_dir, "front.jpg", 64, 48),
        write_test_image(temp_dir, "plan.png", 32, 32),
        write_test_image(temp_dir, "garden.webp", 40, 30),
    ]
}

pub fn create_temp_directory() -> TempDir {
    TempDir::new().unwrap()
}
