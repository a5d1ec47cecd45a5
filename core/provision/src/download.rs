//! HTTP transfer of artifacts.
//!
//! [`Fetcher`] is the seam between the cache and the network: the
//! orchestrator only ever talks to a `Fetcher`, so tests substitute an
//! in-memory implementation.
//!
//! [`HttpFetcher`] downloads with:
//!
//! - Streaming writes to `<dest>.partial` with throttled progress callbacks
//! - Resumption of an existing `.partial` file through a `Range` request
//! - Automatic retry with exponential backoff (3 attempts)
//! - A final buffered GET when streaming keeps failing
//!
//! The destination only ever appears through an atomic rename, so an
//! interrupted run never leaves a truncated file under the final name.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use futures_util::StreamExt;
use rand::Rng;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_LENGTH, RANGE};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::errors::ProvisionError;

/// Progress event emitted during downloads.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// Download has started.
    Started {
        /// The URL being downloaded.
        url: String,
        /// Total file size in bytes, `0` when unknown.
        total: u64,
        /// Bytes already present from an earlier interrupted transfer.
        resumed_from: u64,
    },
    /// Download progress update.
    Progress {
        /// Bytes downloaded so far, including resumed bytes.
        downloaded: u64,
        /// Current download speed in bytes per second.
        speed: u64,
    },
    /// Download completed successfully.
    Completed,
    /// Download failed with an error.
    Failed {
        /// Error description.
        error: String,
    },
}

/// Callback type for receiving progress updates during downloads.
///
/// The callback is invoked on each progress event. It is wrapped in `Arc`
/// to allow sharing across async boundaries.
pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Network port used by the artifact cache.
#[allow(async_fn_in_trait)]
pub trait Fetcher {
    /// Downloads `url` to `dest`, replacing any existing file.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` naming the URL when the transfer fails.
    async fn fetch(
        &self,
        url: &str,
        dest: &Path,
        progress: Option<&ProgressCallback>,
    ) -> Result<(), ProvisionError>;
}

/// Maximum number of download retry attempts.
const MAX_RETRIES: u32 = 3;

/// Base delay between retries in milliseconds.
const BASE_RETRY_DELAY_MS: u64 = 1000;

/// Request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 300;

/// Minimum interval between progress callback invocations in milliseconds.
const PROGRESS_CALLBACK_INTERVAL_MS: u128 = 100;

/// `reqwest`-backed [`Fetcher`] with resume, retry and buffered fallback.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    max_retries: u32,
    base_retry_delay_ms: u64,
}

impl HttpFetcher {
    /// Creates a fetcher with the default retry policy.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` if the HTTP client cannot be constructed.
    pub fn new() -> Result<Self, ProvisionError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(concat!("rigup/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProvisionError::download_error("<client>", e.to_string()))?;
        Ok(Self {
            client,
            max_retries: MAX_RETRIES,
            base_retry_delay_ms: BASE_RETRY_DELAY_MS,
        })
    }

    /// Overrides the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, max_retries: u32, base_retry_delay_ms: u64) -> Self {
        self.max_retries = max_retries.max(1);
        self.base_retry_delay_ms = base_retry_delay_ms;
        self
    }

    /// Streams `url` into `partial`, resuming from its current length.
    async fn download_resumable(
        &self,
        url: &str,
        partial: &Path,
        progress: Option<&ProgressCallback>,
    ) -> Result<()> {
        let existing = tokio::fs::metadata(partial)
            .await
            .map(|m| m.len())
            .unwrap_or(0);

        let mut request = self.client.get(url);
        if existing > 0 {
            request = request.header(RANGE, format!("bytes={existing}-"));
        }
        let response = request
            .send()
            .await
            .with_context(|| format!("failed to connect to {url}"))?;

        let status = response.status();
        if status == StatusCode::RANGE_NOT_SATISFIABLE && existing > 0 {
            debug!(url, existing, "server rejected resume range, restarting");
            remove_if_exists(partial).await;
            return Box::pin(self.download_resumable(url, partial, progress)).await;
        }

        let (mut file, start_pos) = match status {
            StatusCode::PARTIAL_CONTENT if existing > 0 => {
                let file = tokio::fs::OpenOptions::new()
                    .append(true)
                    .open(partial)
                    .await
                    .with_context(|| format!("failed to open {}", partial.display()))?;
                (file, existing)
            }
            StatusCode::OK => {
                if existing > 0 {
                    debug!(url, "server ignored resume range, restarting");
                }
                let file = tokio::fs::File::create(partial)
                    .await
                    .with_context(|| format!("failed to create {}", partial.display()))?;
                (file, 0)
            }
            other => bail!("HTTP error {other}"),
        };

        let total = response
            .content_length()
            .map_or(0, |len| start_pos + len);

        if let Some(cb) = progress {
            cb(ProgressEvent::Started {
                url: url.to_string(),
                total,
                resumed_from: start_pos,
            });
        }

        let mut stream = response.bytes_stream();
        let mut downloaded = start_pos;
        let start_time = Instant::now();
        let mut last_callback_time = Instant::now();

        while let Some(chunk) = stream.next().await {
            let chunk =
                chunk.with_context(|| format!("transfer interrupted after {downloaded} bytes"))?;
            file.write_all(&chunk)
                .await
                .with_context(|| format!("failed to write to {}", partial.display()))?;
            downloaded += chunk.len() as u64;

            let now = Instant::now();
            if now.duration_since(last_callback_time).as_millis() >= PROGRESS_CALLBACK_INTERVAL_MS
                && let Some(cb) = progress
            {
                cb(ProgressEvent::Progress {
                    downloaded,
                    speed: speed(downloaded - start_pos, start_time),
                });
                last_callback_time = now;
            }
        }

        file.flush()
            .await
            .with_context(|| format!("failed to flush {}", partial.display()))?;

        if total > 0 && downloaded != total {
            bail!("transfer ended at {downloaded} of {total} bytes");
        }

        if let Some(cb) = progress {
            cb(ProgressEvent::Progress {
                downloaded,
                speed: speed(downloaded - start_pos, start_time),
            });
        }

        Ok(())
    }

    /// Fetches the whole body in memory and writes it in one go.
    async fn download_buffered(&self, url: &str, dest: &Path) -> Result<()> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("failed to connect to {url}"))?;

        if !response.status().is_success() {
            bail!("HTTP error {}", response.status());
        }

        let expected = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());

        let body = response.bytes().await.context("failed to read body")?;
        if let Some(expected) = expected
            && body.len() as u64 != expected
        {
            bail!("body has {} of {expected} bytes", body.len());
        }

        tokio::fs::write(dest, &body)
            .await
            .with_context(|| format!("failed to write {}", dest.display()))?;
        Ok(())
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(
        &self,
        url: &str,
        dest: &Path,
        progress: Option<&ProgressCallback>,
    ) -> Result<(), ProvisionError> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                ProvisionError::io_error(format!("failed to create {}", parent.display()), e)
            })?;
        }

        let partial = partial_path(dest);
        let mut last_error = None;

        for attempt in 0..self.max_retries {
            if attempt > 0 {
                let delay = calculate_retry_delay(self.base_retry_delay_ms, attempt);
                debug!(url, attempt = attempt + 1, delay_ms = delay, "retrying download");
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            match self.download_resumable(url, &partial, progress).await {
                Ok(()) => {
                    tokio::fs::rename(&partial, dest).await.map_err(|e| {
                        ProvisionError::io_error(
                            format!(
                                "failed to rename {} to {}",
                                partial.display(),
                                dest.display()
                            ),
                            e,
                        )
                    })?;
                    if let Some(cb) = progress {
                        cb(ProgressEvent::Completed);
                    }
                    return Ok(());
                }
                // The partial file is kept so the next attempt resumes.
                Err(e) => last_error = Some(e),
            }
        }

        let streaming_error = last_error.map_or_else(
            || format!("download failed after {} attempts", self.max_retries),
            |e| format!("{e:#}"),
        );
        warn!(url, error = %streaming_error, "streaming download failed, trying buffered fetch");
        remove_if_exists(&partial).await;

        match self.download_buffered(url, dest).await {
            Ok(()) => {
                if let Some(cb) = progress {
                    cb(ProgressEvent::Completed);
                }
                Ok(())
            }
            Err(e) => {
                remove_if_exists(dest).await;
                let cause = format!("{e:#}");
                if let Some(cb) = progress {
                    cb(ProgressEvent::Failed {
                        error: cause.clone(),
                    });
                }
                Err(ProvisionError::download_error(url, cause))
            }
        }
    }
}

/// Returns `<dest>.partial`.
#[must_use]
pub fn partial_path(dest: &Path) -> PathBuf {
    let mut s = dest.as_os_str().to_owned();
    s.push(".partial");
    PathBuf::from(s)
}

async fn remove_if_exists(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!(path = %path.display(), error = %e, "failed to remove file");
    }
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn speed(bytes: u64, since: Instant) -> u64 {
    let elapsed_secs = since.elapsed().as_secs_f64();
    if elapsed_secs > 0.0 {
        (bytes as f64 / elapsed_secs) as u64
    } else {
        0
    }
}

/// Calculates the retry delay with exponential backoff and jitter.
///
/// The delay doubles with each attempt (1s, 2s, 4s by default) with +/- 25%
/// jitter.
fn calculate_retry_delay(base_delay_ms: u64, attempt: u32) -> u64 {
    let base_delay = base_delay_ms * 2u64.pow(attempt);
    let jitter_range = base_delay / 4;
    let jitter = rand::rng().random_range(0..=jitter_range * 2);
    base_delay - jitter_range + jitter
}

/// Formats bytes into a human-readable string (KB, MB, GB).
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    const GB: f64 = MB * 1024.0;

    #[allow(clippy::cast_precision_loss)]
    let bytes_f = bytes as f64;

    if bytes_f >= GB {
        format!("{:.2} GB", bytes_f / GB)
    } else if bytes_f >= MB {
        format!("{:.2} MB", bytes_f / MB)
    } else if bytes_f >= KB {
        format!("{:.2} KB", bytes_f / KB)
    } else {
        format!("{bytes} B")
    }
}

/// Formats speed (bytes/sec) into a human-readable string.
#[must_use]
pub fn format_speed(speed: u64) -> String {
    format!("{}/s", format_bytes(speed))
}
