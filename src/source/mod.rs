//! Candidate CSV locations and the first-that-answers loader.

use async_trait::async_trait;
use std::path::PathBuf;
use url::Url;

use crate::error::{Attempt, DashError};
use crate::logging::log_fetch_attempt;

mod file;
mod http;
pub mod retry;

pub use file::FileFetcher;
pub use http::HttpFetcher;
use retry::{retry_async, RetryConfig};

pub const DEFAULT_CANDIDATES: [&str; 2] = [
    "data/longitudinal/summary_history.csv",
    "../data/longitudinal/summary_history.csv",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Http(Url),
    File(PathBuf),
}

impl Source {
    /// `http://` / `https://` become URLs, `file://` and everything else a path.
    pub fn parse(raw: &str) -> Result<Self, DashError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(DashError::BadLocation {
                raw: raw.to_string(),
                reason: "empty".to_string(),
            });
        }
        let lower = raw.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            let url = Url::parse(raw).map_err(|e| DashError::BadLocation {
                raw: raw.to_string(),
                reason: e.to_string(),
            })?;
            return Ok(Source::Http(url));
        }
        if lower.starts_with("file://") {
            let url = Url::parse(raw).map_err(|e| DashError::BadLocation {
                raw: raw.to_string(),
                reason: e.to_string(),
            })?;
            let path = url.to_file_path().map_err(|_| DashError::BadLocation {
                raw: raw.to_string(),
                reason: "not a local file url".to_string(),
            })?;
            return Ok(Source::File(path));
        }
        Ok(Source::File(PathBuf::from(raw)))
    }

    pub fn parse_all<S: AsRef<str>>(raws: &[S]) -> Result<Vec<Self>, DashError> {
        raws.iter().map(|r| Source::parse(r.as_ref())).collect()
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::Http(url) => write!(f, "{}", url),
            Source::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Fetches the raw text behind one candidate. Implementations must bypass
/// any cache so every refresh sees current content.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, source: &Source) -> Result<String, DashError>;
}

/// Routes HTTP candidates to reqwest and file candidates to the filesystem.
pub struct DefaultFetcher {
    http: HttpFetcher,
    file: FileFetcher,
}

impl DefaultFetcher {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            http: HttpFetcher::new(timeout_secs),
            file: FileFetcher,
        }
    }
}

#[async_trait]
impl SourceFetcher for DefaultFetcher {
    async fn fetch(&self, source: &Source) -> Result<String, DashError> {
        match source {
            Source::Http(_) => self.http.fetch(source).await,
            Source::File(_) => self.file.fetch(source).await,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadedSource {
    pub source: Source,
    pub text: String,
    /// Candidates that failed before this one answered.
    pub skipped: Vec<Attempt>,
}

/// Try each candidate in order and return the first non-blank body.
pub async fn load_first(
    fetcher: &dyn SourceFetcher,
    candidates: &[Source],
    retry: &RetryConfig,
) -> Result<LoadedSource, DashError> {
    let mut attempts = Vec::new();

    for source in candidates {
        let name = source.to_string();
        let fetched = retry_async(retry, &name, move || async move {
            fetcher.fetch(source).await.map_err(anyhow::Error::from)
        })
        .await;

        match fetched {
            Ok(text) if text.trim().is_empty() => {
                log_fetch_attempt(&name, "empty_source", "blank body");
                attempts.push(Attempt {
                    source: name,
                    reason: "empty content".to_string(),
                });
            }
            Ok(text) => {
                log_fetch_attempt(&name, "ok", &format!("{} bytes", text.len()));
                return Ok(LoadedSource {
                    source: source.clone(),
                    text,
                    skipped: attempts,
                });
            }
            Err(err) => {
                let reason = match err.downcast_ref::<DashError>() {
                    Some(DashError::HttpStatus { status, .. }) => format!("HTTP {}", status),
                    Some(DashError::Transport { reason, .. }) => reason.clone(),
                    Some(DashError::Io { error, .. }) => error.to_string(),
                    _ => err.to_string(),
                };
                let kind = err
                    .downcast_ref::<DashError>()
                    .map(DashError::kind)
                    .unwrap_or("error");
                log_fetch_attempt(&name, kind, &reason);
                attempts.push(Attempt { source: name, reason });
            }
        }
    }

    Err(DashError::SourceUnavailable { attempts })
}
