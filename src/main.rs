use anyhow::{bail, Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use media_ingest::cli::{Args, Commands, CompressionArgs, PathCommand};
use media_ingest::compression::compress_image_file;
use media_ingest::constants::PROGRESS_BAR_TEMPLATE;
use media_ingest::upload::UploadProgress;
use media_ingest::{
    batch_compress_images, logger, storage_path, thumbnail, CancellationToken, EntityType,
    ImageUrlResolver, MediaFile, MediaUploadOrchestrator, PipelineConfig, ProgressCallback,
    ResolveOptions, UploadRequest,
};
use rayon::ThreadPoolBuilder;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    logger::init(args.quiet, args.verbose);

    let config = load_config(args.config.as_deref())?;
    let quiet = args.quiet;

    match args.command {
        Commands::Compress {
            input,
            output,
            compression,
        } => run_compress(&input, &output, &compression, &config, quiet)?,
        Commands::Batch {
            input,
            output,
            recursive,
            threads,
            compression,
        } => {
            setup_thread_pool(threads);
            let options = compression.apply(config.compression.to_options()?)?;
            let summary = batch_compress_images(&input, &output, &options, recursive)?;

            if !quiet {
                println!("📊 Batch compression summary:");
                println!("  ✅ Processed: {} ({} failed)", summary.processed, summary.failed);
                println!("  🎯 Within budget: {}", summary.within_budget);
                println!("  📊 Original size: {} bytes", summary.bytes_before);
                println!("  📊 Compressed size: {} bytes", summary.bytes_after);
                println!("  🎯 Overall compression ratio: {:.1}%", summary.compression_ratio());
                println!("  ⏱️  Total time: {:?}", summary.elapsed);
            }
        }
        Commands::Thumbnail { input, size } => {
            let bytes = std::fs::read(&input)
                .with_context(|| format!("failed to read {}", input.display()))?;
            println!("{}", thumbnail(&bytes, size)?);
        }
        Commands::Path { action } => run_path(action)?,
        Commands::Upload {
            files,
            entity,
            id,
            endpoint,
            token,
            filename,
            no_compress,
            compression,
        } => {
            let upload = UploadCommand {
                files,
                entity,
                id,
                endpoint,
                token,
                filename,
                no_compress,
                compression,
            };
            run_upload(upload, config, quiet).await?;
        }
        Commands::Resolve {
            reference,
            id,
            entity,
            base_url,
            placeholder,
            no_fallback,
        } => {
            let resolver = ImageUrlResolver::new(
                config.public_base_url.clone(),
                config.placeholders.to_registry(),
            );

            let mut options = ResolveOptions {
                entity_type: entity,
                ..ResolveOptions::default()
            };
            if let Some(base_url) = base_url {
                options = options.base_url(base_url);
            }
            if let Some(placeholder) = placeholder {
                options = options.placeholder(placeholder);
            }
            if no_fallback {
                options = options.without_fallback();
            }

            println!("{}", resolver.resolve(reference.as_deref(), id, &options));
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let config = match path {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

fn setup_thread_pool(threads: Option<usize>) {
    if let Some(num_threads) = threads {
        if let Err(e) = ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build_global()
        {
            warn!("failed to set thread pool size: {}", e);
        }
    }
}

fn run_compress(
    input: &Path,
    output: &Path,
    compression: &CompressionArgs,
    config: &PipelineConfig,
    quiet: bool,
) -> Result<()> {
    let options = compression.apply(config.compression.to_options()?)?;
    let result = compress_image_file(input, output, &options)?;

    if quiet {
        return Ok(());
    }

    println!("🗜️  Compressed {} -> {}", input.display(), output.display());
    println!(
        "📐 {}x{} {} at quality {:.2} ({} attempt{})",
        result.width,
        result.height,
        result.format,
        result.quality,
        result.attempts,
        if result.attempts == 1 { "" } else { "s" }
    );
    println!("📊 Original size: {} bytes", result.original_size);
    println!("📈 Compressed size: {} bytes", result.size());

    let ratio = result.compression_ratio();
    if ratio >= 0.0 {
        println!("🎯 Compression ratio: {:.1}%", ratio);
    } else {
        println!("⚠️  File size increased by {:.1}%", ratio.abs());
    }
    if !result.within_budget {
        println!(
            "⚠️  Still above the {:.1} MB budget ({:.2} MB)",
            options.max_size_mb,
            result.size_mb()
        );
    }
    Ok(())
}

fn run_path(action: PathCommand) -> Result<()> {
    match action {
        PathCommand::Generate {
            entity,
            id,
            filename,
        } => println!("{}", storage_path::generate(entity, id, &filename)),
        PathCommand::Parse { path } => match storage_path::parse(&path) {
            Some(asset) => println!("{}", serde_json::to_string_pretty(&asset)?),
            None => bail!("not a canonical storage path: {}", path),
        },
        PathCommand::UniqueName { name, prefix } => {
            println!(
                "{}",
                storage_path::generate_unique_filename(&name, prefix.as_deref())
            )
        }
    }
    Ok(())
}

struct UploadCommand {
    files: Vec<PathBuf>,
    entity: EntityType,
    id: u64,
    endpoint: Option<String>,
    token: Option<String>,
    filename: Option<String>,
    no_compress: bool,
    compression: CompressionArgs,
}

async fn run_upload(command: UploadCommand, mut config: PipelineConfig, quiet: bool) -> Result<()> {
    if command.endpoint.is_some() {
        config.api_endpoint = command.endpoint;
        config.validate()?;
    }
    let orchestrator = MediaUploadOrchestrator::from_config(&config, command.token)?;

    let files = command
        .files
        .iter()
        .map(|path| MediaFile::from_path(path))
        .collect::<media_ingest::Result<Vec<_>>>()?;

    let mut request = UploadRequest::new(command.entity, command.id)
        .compression_options(command.compression.apply(config.compression.to_options()?)?);
    if let Some(filename) = command.filename {
        request = request.filename(filename);
    }
    if command.no_compress {
        request = request.without_compression();
    }

    let progress = if quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(100)
    };
    progress.set_style(ProgressStyle::with_template(PROGRESS_BAR_TEMPLATE)?.progress_chars("#>-"));
    progress.set_message(format!("{} {}", command.entity, command.id));

    let bar = progress.clone();
    let on_progress: ProgressCallback =
        Arc::new(move |p: UploadProgress| bar.set_position(p.percent as u64));
    request = request.on_progress(on_progress);

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("interrupt received, cancelling upload");
            interrupt.cancel();
        }
    });

    let outcome = if files.len() == 1 {
        let file = files.into_iter().next().context("no file to upload")?;
        orchestrator
            .upload_single(file, &request, Some(&cancel))
            .await
            .map(|result| vec![result])
    } else {
        orchestrator.upload_many(files, &request, Some(&cancel)).await
    };

    match outcome {
        Ok(results) => {
            progress.finish_and_clear();
            println!("{}", serde_json::to_string_pretty(&results)?);
            Ok(())
        }
        Err(e) => {
            progress.abandon();
            Err(e.into())
        }
    }
}
