//! Downloading a work's files from URLs.
//!
//! Used in URL mode, where an item names its primary file by
//! `fulltext_url` (and, for structured items, extra `resources`) instead of
//! a local path.
//!
//! # Retry Strategy
//!
//! - Connection errors and timeouts → retry after a fixed delay
//! - Any HTTP response → no retry; non-2xx fails with a body excerpt
//! - Attempts are bounded by `fetch.max_attempts`

use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::CONTENT_DISPOSITION;
use reqwest::Url;

use crate::config::FetchConfig;
use crate::error::FetchError;

/// Downloads one URL into a directory.
pub trait Fetcher: Send + Sync {
    /// Download `url` into `dest_dir`, returning the local file's path.
    fn fetch(&self, url: &str, dest_dir: &Path) -> Result<PathBuf, FetchError>;
}

/// HTTP(S) fetcher over a blocking client.
pub struct HttpFetcher {
    client: Client,
    credentials: Option<(String, Option<String>)>,
    max_attempts: u32,
    retry_delay: Duration,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            credentials: config.credentials(),
            max_attempts: config.max_attempts.max(1),
            retry_delay: Duration::from_secs(config.retry_delay_secs),
        })
    }

    fn send(&self, url: &Url) -> Result<reqwest::blocking::Response, FetchError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut request = self.client.get(url.clone());
            if let Some((user, pass)) = &self.credentials {
                request = request.basic_auth(user, pass.as_ref());
            }
            match request.send() {
                Ok(response) => return Ok(response),
                Err(e) if e.is_connect() || e.is_timeout() => {
                    tracing::warn!(url = %url, attempt, error = %e, "can not connect");
                    if attempt >= self.max_attempts {
                        return Err(FetchError::Connect {
                            url: url.to_string(),
                            attempts: attempt,
                        });
                    }
                    std::thread::sleep(self.retry_delay);
                }
                Err(e) => return Err(FetchError::Http(e)),
            }
        }
    }
}

impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str, dest_dir: &Path) -> Result<PathBuf, FetchError> {
        let parsed = parse_url(url)?;
        let mut file_name = file_name_from_url(&parsed)?;

        std::fs::create_dir_all(dest_dir)?;
        let mut response = self.send(&parsed)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body: excerpt(&body, 100),
            });
        }

        if let Some(name) = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(file_name_from_disposition)
        {
            file_name = name;
        }

        let local = dest_dir.join(&file_name);
        tracing::info!(url, path = %local.display(), "downloading file");
        let mut out = File::create(&local)?;
        let size = response.copy_to(&mut out)?;
        if size == 0 {
            return Err(FetchError::EmptyDownload(local));
        }
        tracing::debug!(path = %local.display(), size, "done downloading");
        Ok(std::path::absolute(&local).unwrap_or(local))
    }
}

fn parse_url(url: &str) -> Result<Url, FetchError> {
    let parsed = Url::parse(url).map_err(|_| FetchError::InvalidUrl(url.to_string()))?;
    match parsed.scheme() {
        "http" | "https" if parsed.host_str().is_some() => Ok(parsed),
        _ => Err(FetchError::InvalidUrl(url.to_string())),
    }
}

/// Last non-empty path segment, percent-decoded. A trailing `/` is ignored.
fn file_name_from_url(url: &Url) -> Result<String, FetchError> {
    let segment = url
        .path_segments()
        .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
        .ok_or_else(|| FetchError::InvalidUrl(url.to_string()))?;
    let decoded = urlencoding::decode(segment)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| segment.to_string());
    sanitize(&decoded).ok_or_else(|| FetchError::InvalidUrl(url.to_string()))
}

/// `filename=` value of a Content-Disposition header, if any.
fn file_name_from_disposition(header: &str) -> Option<String> {
    header
        .split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("filename="))
        .map(|name| name.trim().trim_matches('"').trim().to_string())
        .and_then(|name| sanitize(&name))
}

/// Keep only the final path component so a server cannot write outside the
/// download directory.
fn sanitize(name: &str) -> Option<String> {
    Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .filter(|n| !n.is_empty())
}

fn excerpt(body: &str, max: usize) -> String {
    if body.chars().count() > max {
        let cut: String = body.chars().take(max).collect();
        format!("{}...", cut)
    } else {
        body.to_string()
    }
}
