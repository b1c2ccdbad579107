use async_trait::async_trait;
use reqwest::header::{CACHE_CONTROL, PRAGMA};
use reqwest::Client;
use std::time::Duration;
use url::Url;

use super::{Source, SourceFetcher};
use crate::error::DashError;
use crate::logging::ts_epoch_ms;

/// Fetches HTTP(S) candidates, defeating intermediate caches on every call.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout_secs: u64) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    async fn get(&self, url: &Url) -> Result<String, DashError> {
        let name = url.to_string();
        let resp = self
            .client
            .get(cache_busted(url, ts_epoch_ms()))
            .header(CACHE_CONTROL, "no-cache, no-store")
            .header(PRAGMA, "no-cache")
            .send()
            .await
            .map_err(|e| DashError::Transport {
                source_name: name.clone(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(DashError::HttpStatus {
                source_name: name,
                status: status.as_u16(),
            });
        }
        resp.text().await.map_err(|e| DashError::Transport {
            source_name: name,
            reason: e.to_string(),
        })
    }
}

/// Same URL with a `_ts` query parameter that changes on every request.
pub(crate) fn cache_busted(url: &Url, stamp: u64) -> Url {
    let mut out = url.clone();
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != "_ts")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    {
        let mut pairs = out.query_pairs_mut();
        pairs.clear();
        for (k, v) in &kept {
            pairs.append_pair(k, v);
        }
        pairs.append_pair("_ts", &stamp.to_string());
    }
    out
}

#[async_trait]
impl SourceFetcher for HttpFetcher {
    async fn fetch(&self, source: &Source) -> Result<String, DashError> {
        match source {
            Source::Http(url) => self.get(url).await,
            other => Err(DashError::BadLocation {
                raw: other.to_string(),
                reason: "not an http location".to_string(),
            }),
        }
    }
}
