#![doc = "HTTP client for the Immich asset API: the concrete `Uploader` used by the CLI."]
//
//! # Immich upload client
//!
//! [`ImmichClient`] implements [`crate::uploader::Uploader`] against a running Immich server.
//!
//! - Authentication is a static `x-api-key` header set once on the underlying `reqwest::Client`.
//! - Assets are posted as multipart forms to `/api/assets`; the file part is streamed from disk on
//!   every attempt, so a retry re-opens the file instead of holding it in memory.
//! - 429/500/502/503/504 responses and connection failures are retried with exponential backoff;
//!   every other status is a final answer and is mapped by [`interpret_response`].
//! - `upload.timeout_seconds` bounds connecting and inactivity, not the whole transfer: a request
//!   fails once no body bytes have been taken by the connection and no response has arrived for
//!   that long. Only the ping has a total deadline.
//! - Videos can be structurally verified ([`crate::integrity`]) before any bytes leave the host.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, RequestBuilder, Response, StatusCode};
use sha2::{Digest, Sha256};
use std::future::{self, Future};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::io::ReaderStream;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::dedup::lock;
use crate::error::TransportError;
use crate::file_record::FileRecord;
use crate::integrity::{is_video_extension, verify_video_file};
use crate::uploader::{UploadResult, Uploader};

/// Value of the `deviceId` form field.
pub const DEVICE_ID: &str = "immich-watch";

const ASSETS_ENDPOINT: &str = "/api/assets";
const PING_ENDPOINT: &str = "/api/server/ping";
const PING_TIMEOUT: Duration = Duration::from_secs(10);
const RETRYABLE_STATUSES: &[u16] = &[429, 500, 502, 503, 504];

/// Last moment a request moved: created, or a body chunk was taken by the connection.
#[derive(Clone)]
struct Progress(Arc<Mutex<Instant>>);

impl Progress {
    fn new() -> Self {
        Self(Arc::new(Mutex::new(Instant::now())))
    }

    fn touch(&self) {
        *lock(&self.0) = Instant::now();
    }

    fn last(&self) -> Instant {
        *lock(&self.0)
    }
}

pub struct ImmichClient {
    config: Arc<Config>,
    http: reqwest::Client,
    base_url: String,
    closed: AtomicBool,
}

impl ImmichClient {
    pub fn new(config: Arc<Config>) -> Result<Self, TransportError> {
        let mut headers = HeaderMap::new();
        let mut key = HeaderValue::from_str(config.api_key.expose())?;
        key.set_sensitive(true);
        headers.insert("x-api-key", key);
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("immich-watch/{}", env!("CARGO_PKG_VERSION")))?,
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(config.upload.timeout())
            .build()?;
        let base_url = config.api_url.trim_end_matches('/').to_string();

        info!(
            api_url = %base_url,
            api_key = %config.api_key.masked(),
            "Initialized Immich client"
        );
        Ok(Self {
            config,
            http,
            base_url,
            closed: AtomicBool::new(false),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2f64.powi(attempt.min(16) as i32);
        self.config.upload.backoff_base().mul_f64(factor)
    }

    /// Sends the request produced by `build`, rebuilding it for each retry.
    async fn send_with_retry<F, Fut>(&self, mut build: F) -> Result<Response, TransportError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(RequestBuilder, Progress), TransportError>>,
    {
        let max_retries = self.config.upload.max_retries;
        let mut attempt = 0;
        loop {
            let (request, progress) = build().await?;
            match send_until_idle(request, progress, self.config.upload.timeout()).await {
                Ok(response)
                    if RETRYABLE_STATUSES.contains(&response.status().as_u16())
                        && attempt < max_retries =>
                {
                    let delay = self.backoff(attempt);
                    warn!(
                        status = response.status().as_u16(),
                        attempt = attempt + 1,
                        max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Retryable response, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Ok(response) => return Ok(response),
                Err(e) if is_retryable(&e) && attempt < max_retries => {
                    let delay = self.backoff(attempt);
                    warn!(
                        error = %e,
                        attempt = attempt + 1,
                        max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Request failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
            attempt += 1;
        }
    }

    async fn upload_request(
        &self,
        record: &FileRecord,
    ) -> Result<(RequestBuilder, Progress), TransportError> {
        let file = tokio::fs::File::open(&record.path).await?;
        let len = file.metadata().await?.len();
        let progress = Progress::new();
        let body_progress = progress.clone();
        let stream = ReaderStream::new(file).inspect(move |_| body_progress.touch());
        let part = Part::stream_with_length(Body::wrap_stream(stream), len)
            .file_name(record.name.clone())
            .mime_str(content_type(&record.extension))?;

        let timestamp = format_timestamp(record.modified_time);
        let form = Form::new()
            .text("deviceAssetId", device_asset_id(record))
            .text("deviceId", DEVICE_ID)
            .text("fileCreatedAt", timestamp.clone())
            .text("fileModifiedAt", timestamp)
            .text("isFavorite", "false")
            .part("assetData", part);

        let request = self.http.post(self.endpoint(ASSETS_ENDPOINT)).multipart(form);
        Ok((request, progress))
    }

    async fn check_integrity(&self, record: &FileRecord) -> Result<(), String> {
        let path = record.path.clone();
        match tokio::task::spawn_blocking(move || verify_video_file(&path)).await {
            Ok(Ok(container)) => {
                debug!(path = %record.path.display(), ?container, "Video integrity check passed");
                Ok(())
            }
            Ok(Err(e)) => Err(format!("Video integrity check failed: {e}")),
            Err(e) => Err(format!("Video integrity check aborted: {e}")),
        }
    }
}

#[async_trait]
impl Uploader for ImmichClient {
    async fn upload(&self, record: &FileRecord) -> UploadResult {
        if self.is_closed() {
            return UploadResult::failed("Client is closed");
        }
        if let Err(reason) = record.validate(&self.config) {
            warn!(path = %record.path.display(), %reason, "Refusing to upload invalid file");
            return UploadResult::failed(format!("File validation failed: {reason}"));
        }
        if self.config.upload.verify_video_integrity && is_video_extension(&record.extension) {
            if let Err(message) = self.check_integrity(record).await {
                warn!(path = %record.path.display(), %message, "Video failed integrity check");
                return UploadResult::failed(message);
            }
        }

        info!(path = %record.path.display(), size = record.size_bytes, "Uploading file");
        let response = match self.send_with_retry(|| self.upload_request(record)).await {
            Ok(response) => response,
            Err(e) => {
                error!(path = %record.path.display(), error = %e, "Upload request failed");
                return UploadResult::failed(format!("Upload failed: {e}"));
            }
        };

        let status = response.status().as_u16();
        let body = match tokio::time::timeout(self.config.upload.timeout(), response.text()).await {
            Ok(Ok(body)) => body,
            Ok(Err(e)) => {
                debug!(error = %e, "Could not read response body");
                String::new()
            }
            Err(_) => {
                debug!("Timed out reading response body");
                String::new()
            }
        };
        let result = interpret_response(status, &body);
        if result.success {
            info!(path = %record.path.display(), asset_id = ?result.asset_id, message = %result.message, "Upload completed");
        } else {
            error!(path = %record.path.display(), status, message = %result.message, "Upload rejected");
        }
        result
    }

    async fn test_connection(&self) -> bool {
        let url = self.endpoint(PING_ENDPOINT);
        let http = &self.http;
        let result = self
            .send_with_retry(|| {
                let request = http.get(url.as_str()).timeout(PING_TIMEOUT);
                future::ready(Ok((request, Progress::new())))
            })
            .await;
        match result {
            Ok(response) if response.status() == StatusCode::OK => {
                info!(api_url = %self.base_url, "Successfully connected to Immich server");
                true
            }
            Ok(response) => {
                error!(status = response.status().as_u16(), "Immich server ping failed");
                false
            }
            Err(e) => {
                error!(error = %e, "Cannot reach Immich server");
                false
            }
        }
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            info!("Immich client closed");
        }
    }
}

/// Sends `request`, giving up once `progress` has not moved and no response arrived for `idle`.
async fn send_until_idle(
    request: RequestBuilder,
    progress: Progress,
    idle: Duration,
) -> Result<Response, TransportError> {
    let send = request.send();
    tokio::pin!(send);
    loop {
        let deadline = progress.last() + idle;
        tokio::select! {
            result = &mut send => return Ok(result?),
            _ = tokio::time::sleep_until(deadline) => {
                if progress.last() + idle <= Instant::now() {
                    return Err(TransportError::Stalled(idle));
                }
            }
        }
    }
}

fn is_retryable(e: &TransportError) -> bool {
    match e {
        TransportError::Http(e) => e.is_connect() || e.is_timeout() || e.is_request(),
        TransportError::Stalled(_) => true,
        TransportError::Io(_) | TransportError::Header(_) => false,
    }
}

/// Maps a final HTTP status and body to an [`UploadResult`].
pub fn interpret_response(status: u16, body: &str) -> UploadResult {
    match status {
        200 | 201 => {
            let json = serde_json::from_str::<serde_json::Value>(body).ok();
            let asset_id = json
                .as_ref()
                .and_then(|v| v.get("id"))
                .and_then(|id| id.as_str())
                .map(str::to_string);
            let duplicate = json
                .as_ref()
                .and_then(|v| v.get("status"))
                .and_then(|s| s.as_str())
                == Some("duplicate");
            if duplicate {
                UploadResult::succeeded("Asset already exists", asset_id)
            } else {
                UploadResult::succeeded("Upload successful", asset_id)
            }
        }
        400 => UploadResult::failed("Bad request - check file format and API parameters"),
        401 => UploadResult::failed("Unauthorized - check API key"),
        409 => UploadResult::succeeded("Asset already exists", None),
        other => UploadResult::failed(format!("HTTP {other}: {body}")),
    }
}

/// MIME type sent with the file part, by lowercase extension.
pub fn content_type(extension: &str) -> &'static str {
    match extension.to_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "tiff" | "tif" => "image/tiff",
        "webp" => "image/webp",
        "heic" => "image/heic",
        "heif" => "image/heif",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        "wmv" => "video/x-ms-wmv",
        "flv" => "video/x-flv",
        "m4v" => "video/x-m4v",
        "3gp" => "video/3gpp",
        _ => "application/octet-stream",
    }
}

/// SHA-256 of the record's dedup key: stable across retries of the same detected file.
pub fn device_asset_id(record: &FileRecord) -> String {
    let mut hasher = Sha256::new();
    hasher.update(record.dedup_key().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// UTC ISO-8601 with millisecond precision and a `Z` suffix.
pub fn format_timestamp(unix_seconds: f64) -> String {
    let millis = (unix_seconds * 1000.0).round() as i64;
    DateTime::<Utc>::from_timestamp_millis(millis)
        .unwrap_or_default()
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
}
