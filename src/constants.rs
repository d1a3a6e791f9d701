pub const DEFAULT_MAX_WIDTH: u32 = 1920;
pub const DEFAULT_MAX_HEIGHT: u32 = 1920;
pub const DEFAULT_QUALITY: f32 = 0.85;
pub const DEFAULT_MAX_SIZE_MB: f64 = 2.0;

pub const DEFAULT_MAX_RETRIES: u32 = 1;
pub const DEFAULT_QUALITY_STEP: f32 = 0.2;
pub const DEFAULT_QUALITY_FLOOR: f32 = 0.5;

pub const THUMBNAIL_QUALITY: f32 = 0.7;
pub const DEFAULT_THUMBNAIL_SIZE: u32 = 200;

pub const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

pub const PNG_DEFLATE_LEVEL: u8 = 12;
pub const OXIPNG_PRESET: u8 = 4;

pub const STORAGE_PREFIX: &str = "/storage/images/";
pub const ALLOWED_IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".webp", ".svg"];
pub const DEFAULT_EXTENSION: &str = "jpg";
pub const RANDOM_SUFFIX_LEN: usize = 8;

pub const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

pub const DEFAULT_PLACEHOLDER: &str = "/assets/placeholders/default.svg";
pub const PROPERTY_PLACEHOLDER: &str = "/assets/placeholders/property.svg";
pub const AVATAR_PLACEHOLDER: &str = "/assets/placeholders/avatar.svg";
pub const POST_PLACEHOLDER: &str = "/assets/placeholders/post.svg";

pub const PROGRESS_BAR_TEMPLATE: &str =
    "{spinner:.green} [{bar:40.cyan/blue}] {pos:>3}% {msg}";
