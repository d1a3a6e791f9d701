use crate::constants::{DEFAULT_TIMEOUT_SECS, UPLOAD_CHUNK_SIZE};
use crate::error::{MediaError, Result};
use crate::media::MediaFile;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// Receives progress snapshots while an upload is in flight.
pub type ProgressCallback = Arc<dyn Fn(UploadProgress) + Send + Sync>;

/// Byte-level progress of one upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UploadProgress {
    pub loaded: u64,
    pub total: u64,
    pub percent: u8,
}

impl UploadProgress {
    pub fn new(loaded: u64, total: u64) -> Self {
        let percent = if total == 0 {
            100
        } else {
            ((loaded as f64 / total as f64) * 100.0).round().min(100.0) as u8
        };
        Self {
            loaded,
            total,
            percent,
        }
    }

    pub fn complete(total: u64) -> Self {
        Self::new(total, total)
    }
}

/// JSON body returned by the upload endpoint. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponseBody {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResponse {
    pub status: u16,
    pub body: UploadResponseBody,
}

/// Multipart payload: one file part plus text fields, sent in insertion order.
#[derive(Debug, Clone)]
pub struct UploadForm {
    pub file: MediaFile,
    pub fields: Vec<(String, String)>,
}

impl UploadForm {
    pub fn new(file: MediaFile) -> Self {
        Self {
            file,
            fields: Vec::new(),
        }
    }

    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }
}

/// Turns transport reads into monotonic progress events.
struct ProgressTracker {
    total: u64,
    loaded: AtomicU64,
    last_percent: AtomicU8,
    callback: Option<ProgressCallback>,
}

impl ProgressTracker {
    fn new(total: u64, callback: Option<ProgressCallback>) -> Self {
        Self {
            total,
            loaded: AtomicU64::new(0),
            last_percent: AtomicU8::new(0),
            callback,
        }
    }

    fn advance(&self, bytes: usize) {
        let loaded = self.loaded.fetch_add(bytes as u64, Ordering::SeqCst) + bytes as u64;
        self.emit(UploadProgress::new(loaded.min(self.total), self.total));
    }

    /// Emits the closing 100% event unless one was already reported.
    fn finish(&self) {
        if self.last_percent.load(Ordering::SeqCst) < 100 {
            self.emit(UploadProgress::complete(self.total));
        }
    }

    fn emit(&self, progress: UploadProgress) {
        let previous = self.last_percent.fetch_max(progress.percent, Ordering::SeqCst);
        if progress.percent < previous {
            return;
        }
        if let Some(callback) = &self.callback {
            callback(progress);
        }
    }
}

/// Sends one multipart upload per call and reports progress while the file
/// part streams out.
#[derive(Debug, Clone)]
pub struct ProgressUploader {
    client: Client,
}

impl ProgressUploader {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MediaError::Config(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Uploads `form` to `url`.
    ///
    /// # Errors
    /// * `MediaError::HttpStatus` for a non-2xx answer, carrying the server message when present
    /// * `MediaError::Network` when no response arrives
    /// * `MediaError::Aborted` when `cancel` fires first
    #[instrument(
        skip_all,
        fields(url = %url, file = %form.file.name, size = form.file.len())
    )]
    pub async fn upload(
        &self,
        url: &str,
        form: UploadForm,
        auth_token: Option<&str>,
        on_progress: Option<ProgressCallback>,
        cancel: Option<&CancellationToken>,
    ) -> Result<UploadResponse> {
        if cancel.is_some_and(|token| token.is_cancelled()) {
            return Err(MediaError::Aborted);
        }

        let tracker = Arc::new(ProgressTracker::new(form.file.len() as u64, on_progress));
        let exchange = self.exchange(url, form, auth_token, Arc::clone(&tracker));

        let response = match cancel {
            Some(token) => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        warn!("upload cancelled");
                        return Err(MediaError::Aborted);
                    }
                    response = exchange => response?,
                }
            }
            None => exchange.await?,
        };

        tracker.finish();
        Ok(response)
    }

    async fn exchange(
        &self,
        url: &str,
        form: UploadForm,
        auth_token: Option<&str>,
        tracker: Arc<ProgressTracker>,
    ) -> Result<UploadResponse> {
        let multipart = build_multipart(form, tracker)?;

        let mut request = self.client.post(url).multipart(multipart);
        if let Some(token) = auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            warn!("upload transport failure: {}", e);
            MediaError::Network(e.to_string())
        })?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| MediaError::Network(e.to_string()))?;

        if !status.is_success() {
            let message = server_message(&body)
                .unwrap_or_else(|| format!("upload failed with status {}", status.as_u16()));
            warn!(status = status.as_u16(), "upload rejected: {}", message);
            return Err(MediaError::HttpStatus {
                status: status.as_u16(),
                message,
            });
        }

        debug!(status = status.as_u16(), "upload accepted");
        Ok(UploadResponse {
            status: status.as_u16(),
            body: parse_body(&body),
        })
    }
}

impl Default for ProgressUploader {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .unwrap_or_else(|_| Self::with_client(Client::new()))
    }
}

fn build_multipart(form: UploadForm, tracker: Arc<ProgressTracker>) -> Result<Form> {
    let UploadForm { file, fields } = form;
    let total = file.bytes.len();
    let data = Bytes::from(file.bytes);

    let chunks: Vec<Bytes> = (0..total)
        .step_by(UPLOAD_CHUNK_SIZE)
        .map(|start| data.slice(start..(start + UPLOAD_CHUNK_SIZE).min(total)))
        .collect();

    let stream = futures::stream::iter(chunks).map(move |chunk| {
        tracker.advance(chunk.len());
        Ok::<Bytes, std::io::Error>(chunk)
    });

    let part = Part::stream_with_length(Body::wrap_stream(stream), total as u64)
        .file_name(file.name)
        .mime_str(&file.mime_type)
        .map_err(|e| MediaError::UnsupportedFormat(format!("{}: {}", file.mime_type, e)))?;

    let multipart = fields
        .into_iter()
        .fold(Form::new().part("file", part), |form, (name, value)| form.text(name, value));

    Ok(multipart)
}

/// Successful bodies that are not valid JSON are treated as empty.
fn parse_body(body: &[u8]) -> UploadResponseBody {
    serde_json::from_slice(body).unwrap_or_else(|e| {
        debug!("upload response is not JSON ({}); using empty body", e);
        UploadResponseBody::default()
    })
}

fn server_message(body: &[u8]) -> Option<String> {
    serde_json::from_slice::<UploadResponseBody>(body)
        .ok()
        .and_then(|b| b.message)
        .filter(|m| !m.trim().is_empty())
}
