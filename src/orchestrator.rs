use crate::compression::{compress, CompressionOptions};
use crate::config::PipelineConfig;
use crate::error::{MediaError, Result};
use crate::media::MediaFile;
use crate::resolver::{ImageUrlResolver, ResolveOptions};
use crate::storage_path::{
    self, generate_unique_filename, is_valid_image_filename, with_positional_suffix, EntityType,
};
use crate::upload::{ProgressCallback, ProgressUploader, UploadForm, UploadProgress};
use serde::Serialize;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// What to upload an image as, and how.
#[derive(Clone)]
pub struct UploadRequest {
    pub entity_type: EntityType,
    pub entity_id: u64,
    /// Stored filename; generated from the file name when unset
    pub filename: Option<String>,
    pub compress: bool,
    pub compression_options: CompressionOptions,
    pub on_progress: Option<ProgressCallback>,
}

impl UploadRequest {
    pub fn new(entity_type: EntityType, entity_id: u64) -> Self {
        Self {
            entity_type,
            entity_id,
            filename: None,
            compress: true,
            compression_options: CompressionOptions::default(),
            on_progress: None,
        }
    }

    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn without_compression(mut self) -> Self {
        self.compress = false;
        self
    }

    pub fn compression_options(mut self, options: CompressionOptions) -> Self {
        self.compression_options = options;
        self
    }

    pub fn on_progress(mut self, callback: ProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }
}

/// Where an uploaded image ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadResult {
    pub path: String,
    pub url: String,
    pub filename: String,
}

/// Compresses, addresses and uploads images to one endpoint.
#[derive(Debug, Clone)]
pub struct MediaUploadOrchestrator {
    uploader: ProgressUploader,
    api_endpoint: String,
    auth_token: Option<String>,
    urls: ImageUrlResolver,
}

impl MediaUploadOrchestrator {
    pub fn new(uploader: ProgressUploader, api_endpoint: impl Into<String>) -> Self {
        Self {
            uploader,
            api_endpoint: api_endpoint.into(),
            auth_token: None,
            urls: ImageUrlResolver::default(),
        }
    }

    pub fn from_config(config: &PipelineConfig, auth_token: Option<String>) -> Result<Self> {
        let endpoint = config
            .api_endpoint
            .clone()
            .ok_or_else(|| MediaError::Config("api_endpoint is not set".to_string()))?;
        let uploader = ProgressUploader::new(config.timeout())?;

        let mut orchestrator = Self::new(uploader, endpoint).with_auth_token(auth_token);
        orchestrator.urls = ImageUrlResolver::new(
            config.public_base_url.clone(),
            config.placeholders.to_registry(),
        );
        Ok(orchestrator)
    }

    pub fn with_auth_token(mut self, auth_token: Option<String>) -> Self {
        self.auth_token = auth_token.filter(|token| !token.is_empty());
        self
    }

    /// Base URL prepended to returned storage paths.
    pub fn with_public_base_url(mut self, base_url: Option<String>) -> Self {
        self.urls = ImageUrlResolver::new(base_url, self.urls.placeholders().clone());
        self
    }

    /// Uploads one image. Invalid file names are rejected before any work.
    #[instrument(
        skip_all,
        fields(entity = %request.entity_type, id = request.entity_id, file = %file.name)
    )]
    pub async fn upload_single(
        &self,
        file: MediaFile,
        request: &UploadRequest,
        cancel: Option<&CancellationToken>,
    ) -> Result<UploadResult> {
        ensure_valid_name(&file)?;
        self.upload_one(file, request, None, request.on_progress.clone(), cancel)
            .await
    }

    /// Uploads a gallery one file at a time.
    ///
    /// Stored filenames get a positional suffix (`-0`, `-1`, ...). Progress is
    /// reported as the mean of the per-file percentages, so it reaches 100
    /// only after the last file completes. Stops at the first failure.
    #[instrument(
        skip_all,
        fields(entity = %request.entity_type, id = request.entity_id, count = files.len())
    )]
    pub async fn upload_many(
        &self,
        files: Vec<MediaFile>,
        request: &UploadRequest,
        cancel: Option<&CancellationToken>,
    ) -> Result<Vec<UploadResult>> {
        for file in &files {
            ensure_valid_name(file)?;
        }

        let aggregate = request
            .on_progress
            .clone()
            .map(|callback| Arc::new(AggregateProgress::new(files.len(), callback)));

        let mut results = Vec::with_capacity(files.len());
        for (index, file) in files.into_iter().enumerate() {
            let on_progress = aggregate.as_ref().map(|agg| agg.callback_for(index));
            let result = self
                .upload_one(file, request, Some(index), on_progress, cancel)
                .await?;
            results.push(result);
        }

        info!(count = results.len(), "gallery upload complete");
        Ok(results)
    }

    async fn upload_one(
        &self,
        file: MediaFile,
        request: &UploadRequest,
        index: Option<usize>,
        on_progress: Option<ProgressCallback>,
        cancel: Option<&CancellationToken>,
    ) -> Result<UploadResult> {
        if file.is_empty() {
            return Err(MediaError::EmptyFile(file.name));
        }
        if cancel.is_some_and(|token| token.is_cancelled()) {
            return Err(MediaError::Aborted);
        }

        let file = if request.compress {
            compress_or_original(file, &request.compression_options).await?
        } else {
            file
        };

        let mut filename = request
            .filename
            .clone()
            .unwrap_or_else(|| generate_unique_filename(&file.name, None));
        if let Some(index) = index {
            filename = with_positional_suffix(&filename, index);
        }

        let predicted = storage_path::generate(request.entity_type, request.entity_id, &filename);
        let form = UploadForm::new(file)
            .text("path", predicted.clone())
            .text("entity_type", request.entity_type.as_str())
            .text("entity_id", request.entity_id.to_string());

        let response = self
            .uploader
            .upload(
                &self.api_endpoint,
                form,
                self.auth_token.as_deref(),
                on_progress,
                cancel,
            )
            .await?;

        // The server decides final placement
        let path = response
            .body
            .path
            .or(response.body.image)
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(predicted);

        let filename = storage_path::parse(&path)
            .map(|asset| asset.filename)
            .unwrap_or(filename);
        let url = self.urls.resolve(Some(&path), None, &ResolveOptions::default());

        info!(%path, "image uploaded");
        Ok(UploadResult {
            path,
            url,
            filename,
        })
    }
}

fn ensure_valid_name(file: &MediaFile) -> Result<()> {
    if is_valid_image_filename(&file.name) {
        Ok(())
    } else {
        Err(MediaError::InvalidFilename(file.name.clone()))
    }
}

/// Compresses on a blocking worker. A compression error falls back to the
/// original bytes; only a failed worker task is an error.
async fn compress_or_original(file: MediaFile, options: &CompressionOptions) -> Result<MediaFile> {
    let options = options.clone();
    let name = file.name.clone();

    tokio::task::spawn_blocking(move || match compress(&file.bytes, &options) {
        Ok(result) => {
            debug!(
                original = result.original_size,
                compressed = result.size(),
                within_budget = result.within_budget,
                "compressed before upload"
            );
            file.replaced_with(result.bytes, result.format)
        }
        Err(e) => {
            warn!("compression failed for {}, uploading original: {}", file.name, e);
            file
        }
    })
    .await
    .map_err(|e| MediaError::Encode(format!("compression task for {} failed: {}", name, e)))
}

/// Folds per-file progress into one gallery-wide stream.
struct AggregateProgress {
    slots: Mutex<Vec<UploadProgress>>,
    last_percent: AtomicU8,
    callback: ProgressCallback,
}

impl AggregateProgress {
    fn new(count: usize, callback: ProgressCallback) -> Self {
        Self {
            slots: Mutex::new(vec![UploadProgress::new(0, 1); count]),
            last_percent: AtomicU8::new(0),
            callback,
        }
    }

    fn callback_for(self: &Arc<Self>, index: usize) -> ProgressCallback {
        let aggregate = Arc::clone(self);
        Arc::new(move |progress| aggregate.update(index, progress))
    }

    fn update(&self, index: usize, progress: UploadProgress) {
        let combined = {
            let mut slots = match self.slots.lock() {
                Ok(slots) => slots,
                Err(poisoned) => poisoned.into_inner(),
            };
            if let Some(slot) = slots.get_mut(index) {
                *slot = progress;
            }
            combine(&slots)
        };

        let previous = self.last_percent.fetch_max(combined.percent, Ordering::SeqCst);
        if combined.percent >= previous {
            (self.callback)(combined);
        }
    }
}

/// Mean of the slot percentages, floored so 100 means every slot is done.
fn combine(slots: &[UploadProgress]) -> UploadProgress {
    if slots.is_empty() {
        return UploadProgress::complete(0);
    }

    let percent_sum: u64 = slots.iter().map(|s| s.percent as u64).sum();
    UploadProgress {
        loaded: slots.iter().map(|s| s.loaded).sum(),
        total: slots.iter().map(|s| s.total).sum(),
        percent: (percent_sum / slots.len() as u64) as u8,
    }
}
