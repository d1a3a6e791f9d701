use crate::compression::CompressionOptions;
use crate::constants::DEFAULT_THUMBNAIL_SIZE;
use crate::error::Result;
use crate::storage_path::EntityType;
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "media-ingest",
    about = "Compress, address and upload listing images",
    long_about = "media-ingest prepares images for the listing backend: it shrinks them to fit a size \
                  and dimension budget, derives the canonical /storage/images path they will live at, \
                  uploads them with live progress, and resolves stored references back into URLs.",
    version,
    after_help = "EXAMPLES:\n  \
    media-ingest compress photo.jpg small.jpg -q 0.8 -w 1280\n  \
    media-ingest batch \"./shoot/*.jpg\" ./compressed -r\n  \
    media-ingest upload front.jpg back.jpg --entity properties --id 42 --endpoint https://api.example.com/api/upload\n  \
    media-ingest path parse /storage/images/agents/7/avatar.jpg\n  \
    media-ingest resolve --entity properties --id 42 --base-url https://api.example.com"
)]
pub struct Args {
    #[arg(long, global = true, help = "Only print errors")]
    pub quiet: bool,

    #[arg(short = 'v', long, global = true, help = "Print debug logs")]
    pub verbose: bool,

    #[arg(
        short = 'c',
        long,
        global = true,
        env = "MEDIA_INGEST_CONFIG",
        help = "Path to a TOML configuration file"
    )]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Compression overrides shared by every command that compresses.
#[derive(ClapArgs, Debug, Clone, Default)]
pub struct CompressionArgs {
    #[arg(short = 'w', long, help = "Maximum width in pixels (default: 1920)")]
    pub max_width: Option<u32>,

    #[arg(short = 'H', long, help = "Maximum height in pixels (default: 1920)")]
    pub max_height: Option<u32>,

    #[arg(
        short = 'q',
        long,
        help = "Encoder quality in (0, 1] (default: 0.85)",
        long_help = "Encoder quality from just above 0 (smallest) to 1 (best). \
                     JPEG uses it directly; for PNG it selects the oxipng effort; WebP output is lossless."
    )]
    pub quality: Option<f32>,

    #[arg(short = 's', long, help = "Size budget in megabytes (default: 2)")]
    pub max_size_mb: Option<f64>,

    #[arg(
        long,
        help = "Re-encodes allowed when over budget (default: 1)",
        long_help = "Number of extra encodes at lower quality when the output exceeds the size budget. \
                     The last result is kept even if still over budget."
    )]
    pub max_retries: Option<u32>,

    #[arg(short = 'f', long, help = "Output format (jpeg, png, webp)")]
    pub format: Option<String>,
}

impl CompressionArgs {
    /// Applies the flags on top of `base` (usually the configured defaults).
    pub fn apply(&self, base: CompressionOptions) -> Result<CompressionOptions> {
        let options = CompressionOptions {
            max_width: self.max_width.unwrap_or(base.max_width),
            max_height: self.max_height.unwrap_or(base.max_height),
            quality: self.quality.unwrap_or(base.quality),
            max_size_mb: self.max_size_mb.unwrap_or(base.max_size_mb),
            max_retries: self.max_retries.unwrap_or(base.max_retries),
            format: self.format.clone().or(base.format),
            ..base
        };
        options.validate()?;
        Ok(options)
    }
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Compress a single image file")]
    Compress {
        #[arg(help = "Input image file path")]
        input: PathBuf,

        #[arg(help = "Output image file path")]
        output: PathBuf,

        #[command(flatten)]
        compression: CompressionArgs,
    },

    #[command(
        about = "Compress multiple images in parallel",
        long_about = "Compress every image under a directory, or matching a glob, into an output directory. \
                      Files that fail to decode are reported and skipped."
    )]
    Batch {
        #[arg(help = "Input directory, file, or glob pattern")]
        input: String,

        #[arg(help = "Output directory path")]
        output: PathBuf,

        #[arg(short = 'r', long, help = "Process subdirectories recursively")]
        recursive: bool,

        #[arg(short = 'j', long, help = "Number of parallel threads (default: auto)")]
        threads: Option<usize>,

        #[command(flatten)]
        compression: CompressionArgs,
    },

    #[command(about = "Print a JPEG data URI preview of an image")]
    Thumbnail {
        #[arg(help = "Input image file path")]
        input: PathBuf,

        #[arg(long, default_value_t = DEFAULT_THUMBNAIL_SIZE, help = "Length of the longer side in pixels")]
        size: u32,
    },

    #[command(about = "Generate or inspect canonical storage paths")]
    Path {
        #[command(subcommand)]
        action: PathCommand,
    },

    #[command(
        about = "Compress and upload images to the listing backend",
        long_about = "Upload one image, or a gallery of images, for an entity. Each file is compressed \
                      first unless --no-compress is given; a file that cannot be compressed is uploaded as-is. \
                      Press Ctrl-C to cancel an upload in flight."
    )]
    Upload {
        #[arg(required = true, help = "Image files to upload")]
        files: Vec<PathBuf>,

        #[arg(short = 'e', long, help = "Entity type (users, properties, posts, agents, testimonials)")]
        entity: EntityType,

        #[arg(short = 'i', long, help = "Entity id")]
        id: u64,

        #[arg(long, env = "MEDIA_INGEST_ENDPOINT", help = "Upload endpoint URL (overrides config)")]
        endpoint: Option<String>,

        #[arg(long, env = "MEDIA_INGEST_TOKEN", hide_env_values = true, help = "Bearer token")]
        token: Option<String>,

        #[arg(long, help = "Stored filename (generated when omitted)")]
        filename: Option<String>,

        #[arg(long, help = "Upload the original bytes without compressing")]
        no_compress: bool,

        #[command(flatten)]
        compression: CompressionArgs,
    },

    #[command(about = "Resolve a stored image reference into a URL")]
    Resolve {
        #[arg(help = "Stored reference: URL, storage path, or file name")]
        reference: Option<String>,

        #[arg(short = 'i', long, help = "Entity id used to predict the canonical path")]
        id: Option<u64>,

        #[arg(short = 'e', long, help = "Entity type")]
        entity: Option<EntityType>,

        #[arg(long, help = "Base URL prepended to storage paths")]
        base_url: Option<String>,

        #[arg(long, help = "Placeholder returned when nothing resolves")]
        placeholder: Option<String>,

        #[arg(long, help = "Return an empty string instead of a placeholder")]
        no_fallback: bool,
    },
}

#[derive(Subcommand)]
pub enum PathCommand {
    #[command(about = "Build the canonical path for an image")]
    Generate {
        entity: EntityType,
        id: u64,
        filename: String,
    },

    #[command(about = "Split a canonical path into its parts")]
    Parse { path: String },

    #[command(about = "Generate a collision-resistant filename")]
    UniqueName {
        name: String,

        #[arg(long)]
        prefix: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_compression_args_override_base() {
        let args = CompressionArgs {
            quality: Some(0.5),
            max_retries: Some(3),
            ..CompressionArgs::default()
        };
        let options = args.apply(CompressionOptions::default()).unwrap();
        assert_eq!(options.quality, 0.5);
        assert_eq!(options.max_retries, 3);
        assert_eq!(options.max_width, 1920);
    }

    #[test]
    fn test_compression_args_validate() {
        let args = CompressionArgs {
            quality: Some(2.0),
            ..CompressionArgs::default()
        };
        assert!(args.apply(CompressionOptions::default()).is_err());
    }

    #[test]
    fn test_parse_upload_command() {
        let args = Args::try_parse_from([
            "media-ingest",
            "upload",
            "a.jpg",
            "b.png",
            "--entity",
            "properties",
            "--id",
            "42",
            "--no-compress",
        ])
        .unwrap();

        match args.command {
            Commands::Upload {
                files,
                entity,
                id,
                no_compress,
                ..
            } => {
                assert_eq!(files.len(), 2);
                assert_eq!(entity, EntityType::Properties);
                assert_eq!(id, 42);
                assert!(no_compress);
            }
            _ => panic!("expected upload command"),
        }
    }

    #[test]
    fn test_rejects_unknown_entity() {
        let result = Args::try_parse_from([
            "media-ingest",
            "path",
            "generate",
            "houses",
            "1",
            "a.jpg",
        ]);
        assert!(result.is_err());
    }
}
