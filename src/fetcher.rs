use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::config::DownloadSettings;
use crate::error::ExifError;
use crate::fs_util;
use crate::hooks::Hooks;

pub trait ArchiveFetcher: Send + Sync {
    /// Downloads `url` to `archive` and unpacks it into `extract_to`.
    ///
    /// With `url == None` the archive is expected to be on disk already and is
    /// only unpacked.
    fn fetch_and_extract(
        &self,
        url: Option<&str>,
        archive: &Path,
        extract_to: &Path,
    ) -> Result<bool, ExifError>;
}

#[derive(Clone)]
pub struct HttpArchiveFetcher {
    client: Client,
    retries: usize,
    progress_interval: Duration,
    hooks: Hooks,
}

/// Why a single download attempt stopped.
enum AttemptError {
    /// Worth another attempt: timeouts, dropped connections, 429/5xx.
    Transient(ExifError),
    Fatal(ExifError),
}

impl HttpArchiveFetcher {
    pub fn new(settings: &DownloadSettings, hooks: Hooks) -> Result<Self, ExifError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("exiftool-runner/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| ExifError::Http(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(settings.timeout)
            .build()
            .map_err(|err| ExifError::Http(err.to_string()))?;
        Ok(Self::with_client(client, settings, hooks))
    }

    /// Uses a caller-built client; `settings.timeout` is then the client's concern.
    pub fn with_client(client: Client, settings: &DownloadSettings, hooks: Hooks) -> Self {
        Self {
            client,
            retries: settings.retries,
            progress_interval: settings.progress_interval,
            hooks,
        }
    }

    /// Downloads `url` into `destination`, restarting the whole transfer on
    /// transient failures. Each attempt truncates the partial file.
    fn download(&self, url: &str, destination: &Path) -> Result<u64, ExifError> {
        const BASE_DELAY_MS: u64 = 200;
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).map_err(|err| ExifError::Filesystem(err.to_string()))?;
        }
        let mut attempt = 0usize;
        loop {
            match self.download_once(url, destination) {
                Ok(written) => return Ok(written),
                Err(AttemptError::Transient(err)) if attempt < self.retries => {
                    self.hooks
                        .log(format!("download failed ({err}), retrying: {url}"));
                    tracing::warn!(url, attempt, error = %err, "retrying download");
                    thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                    attempt += 1;
                }
                Err(AttemptError::Transient(err) | AttemptError::Fatal(err)) => return Err(err),
            }
        }
    }

    fn download_once(&self, url: &str, destination: &Path) -> Result<u64, AttemptError> {
        let response = match self.client.get(url).send() {
            Ok(response) => response,
            Err(err) if is_retryable_error(&err) => {
                return Err(AttemptError::Transient(ExifError::Http(err.to_string())));
            }
            Err(err) => return Err(AttemptError::Fatal(ExifError::Http(err.to_string()))),
        };
        let status = response.status().as_u16();
        if !response.status().is_success() {
            let message = response
                .text()
                .unwrap_or_else(|_| "download failed".to_string());
            let err = ExifError::HttpStatus { status, message };
            return Err(if is_retryable_status(status) {
                AttemptError::Transient(err)
            } else {
                AttemptError::Fatal(err)
            });
        }

        let mut reader = ProgressReader {
            inner: response,
            hooks: &self.hooks,
            interval: self.progress_interval,
            last_tick: Instant::now(),
        };
        let mut file = File::create(destination)
            .map_err(|err| AttemptError::Fatal(ExifError::Filesystem(err.to_string())))?;
        let mut buffer = [0u8; 64 * 1024];
        let mut written = 0u64;
        loop {
            // Read failures come from the connection and are transient; write
            // failures come from the disk and are not.
            let n = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    return Err(AttemptError::Transient(ExifError::Http(format!(
                        "download {url}: {err}"
                    ))));
                }
            };
            file.write_all(&buffer[..n])
                .map_err(|err| AttemptError::Fatal(ExifError::Filesystem(err.to_string())))?;
            written += n as u64;
        }
        file.flush()
            .map_err(|err| AttemptError::Fatal(ExifError::Filesystem(err.to_string())))?;
        self.hooks.progress();
        Ok(written)
    }
}

impl ArchiveFetcher for HttpArchiveFetcher {
    fn fetch_and_extract(
        &self,
        url: Option<&str>,
        archive: &Path,
        extract_to: &Path,
    ) -> Result<bool, ExifError> {
        if let Some(url) = url {
            tracing::info!(url, archive = %archive.display(), "downloading archive");
            let bytes = self.download(url, archive)?;
            self.hooks
                .log(format!("downloaded {bytes} bytes to {}", archive.display()));
        } else if !archive.exists() {
            return Err(ExifError::FileNotFound(archive.to_path_buf()));
        }
        fs_util::extract_archive(archive, extract_to)?;
        Ok(true)
    }
}

/// Fires the progress hook at most once per `interval` while bytes flow.
struct ProgressReader<'a, R> {
    inner: R,
    hooks: &'a Hooks,
    interval: Duration,
    last_tick: Instant,
}

impl<R: Read> Read for ProgressReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if self.last_tick.elapsed() >= self.interval {
            self.last_tick = Instant::now();
            self.hooks.progress();
        }
        Ok(n)
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
