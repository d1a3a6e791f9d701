pub mod batch;
pub mod cli;
pub mod compression;
pub mod config;
pub mod constants;
pub mod error;
pub mod formats;
pub mod logger;
pub mod media;
pub mod orchestrator;
pub mod resolver;
pub mod storage_path;
pub mod upload;

pub use batch::{batch_compress_images, collect_image_files, BatchSummary};
pub use compression::{compress, compress_many, thumbnail, CompressionOptions, CompressionResult};
pub use config::PipelineConfig;
pub use error::{MediaError, Result};
pub use formats::OutputFormat;
pub use media::MediaFile;
pub use orchestrator::{MediaUploadOrchestrator, UploadRequest, UploadResult};
pub use resolver::{ImageUrlResolver, PlaceholderRegistry, ResolveOptions};
pub use storage_path::{
    generate_unique_filename, is_valid_image_filename, EntityType, MediaAsset,
};
pub use tokio_util::sync::CancellationToken;
pub use upload::{ProgressCallback, ProgressUploader, UploadForm, UploadProgress, UploadResponse};
