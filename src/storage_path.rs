//! Canonical storage addresses.
//!
//! Every uploaded image lives at `/storage/images/{entity_type}/{entity_id}/{filename}`.
//! Client and server derive the same address from the same inputs, so a path
//! can be predicted before the upload finishes and parsed back afterwards.

use crate::constants::{ALLOWED_IMAGE_EXTENSIONS, DEFAULT_EXTENSION, RANDOM_SUFFIX_LEN, STORAGE_PREFIX};
use crate::error::MediaError;
use crate::formats::extension_of;
use rand::distributions::Uniform;
use rand::Rng;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// The closed set of things an image can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Users,
    Properties,
    Posts,
    Agents,
    Testimonials,
}

impl EntityType {
    pub const ALL: [EntityType; 5] = [
        EntityType::Users,
        EntityType::Properties,
        EntityType::Posts,
        EntityType::Agents,
        EntityType::Testimonials,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Users => "users",
            EntityType::Properties => "properties",
            EntityType::Posts => "posts",
            EntityType::Agents => "agents",
            EntityType::Testimonials => "testimonials",
        }
    }

    /// Filename assumed for the entity's primary image when none is stored.
    pub fn default_filename(&self) -> &'static str {
        match self {
            EntityType::Properties => "main.jpg",
            EntityType::Posts => "featured.jpg",
            EntityType::Users | EntityType::Agents | EntityType::Testimonials => "avatar.jpg",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = MediaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "users" => Ok(EntityType::Users),
            "properties" => Ok(EntityType::Properties),
            "posts" => Ok(EntityType::Posts),
            "agents" => Ok(EntityType::Agents),
            "testimonials" => Ok(EntityType::Testimonials),
            other => Err(MediaError::Config(format!("unknown entity type: {}", other))),
        }
    }
}

/// A parsed canonical storage address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaAsset {
    pub entity_type: EntityType,
    pub entity_id: String,
    pub filename: String,
    pub path: String,
}

/// Builds the canonical path. One leading `/` on `filename` is dropped.
pub fn generate(entity_type: EntityType, entity_id: impl fmt::Display, filename: &str) -> String {
    let filename = filename.strip_prefix('/').unwrap_or(filename);
    format!("{}{}/{}/{}", STORAGE_PREFIX, entity_type, entity_id, filename)
}

/// Parses a canonical path. Anything off-shape yields `None`: unknown entity
/// type, non-digit id, or a missing or empty segment.
pub fn parse(path: &str) -> Option<MediaAsset> {
    let rest = path.strip_prefix(STORAGE_PREFIX)?;
    let mut segments = rest.splitn(3, '/');

    let entity_type = segments.next()?.parse::<EntityType>().ok()?;
    let entity_id = segments.next()?;
    let filename = segments.next()?;

    if entity_id.is_empty() || !entity_id.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    // Nested filenames are allowed, empty segments are not
    if filename.split('/').any(str::is_empty) {
        return None;
    }

    Some(MediaAsset {
        entity_type,
        entity_id: entity_id.to_string(),
        filename: filename.to_string(),
        path: path.to_string(),
    })
}

pub fn validate(path: &str) -> bool {
    parse(path).is_some()
}

/// `{prefix}-{millis}-{random}.{ext}`, or `{base}-{millis}-{random}.{ext}`
/// when no prefix is given. The extension comes from `original_name`
/// (`jpg` when it has none).
pub fn generate_unique_filename(original_name: &str, prefix: Option<&str>) -> String {
    let extension = extension_of(original_name).unwrap_or_else(|| DEFAULT_EXTENSION.to_string());
    let stem = match prefix {
        Some(prefix) => sanitize(prefix),
        None => sanitize(base_name(original_name)),
    };

    format!(
        "{}-{}-{}.{}",
        stem,
        chrono::Utc::now().timestamp_millis(),
        random_suffix(RANDOM_SUFFIX_LEN),
        extension
    )
}

/// Whether the name ends in an extension the upload endpoint accepts.
pub fn is_valid_image_filename(name: &str) -> bool {
    let lower = name.to_lowercase();
    ALLOWED_IMAGE_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Inserts `-{index}` before the extension: `photo.jpg` → `photo-2.jpg`.
pub fn with_positional_suffix(filename: &str, index: usize) -> String {
    match filename.rsplit_once('.') {
        Some((base, ext)) if extension_of(filename).is_some() => {
            format!("{}-{}.{}", base, index, ext)
        }
        _ => format!("{}-{}", filename, index),
    }
}

fn base_name(name: &str) -> &str {
    let name = name.rsplit('/').next().unwrap_or(name);
    match name.rsplit_once('.') {
        Some((base, _)) if !base.is_empty() => base,
        _ => name,
    }
}

fn sanitize(stem: &str) -> String {
    let cleaned: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect();

    if cleaned.is_empty() {
        "image".to_string()
    } else {
        cleaned
    }
}

fn random_suffix(len: usize) -> String {
    let dist = Uniform::from(0..BASE36.len());
    rand::thread_rng()
        .sample_iter(dist)
        .take(len)
        .map(|i| BASE36[i] as char)
        .collect()
}
