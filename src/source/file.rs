use async_trait::async_trait;

use super::{Source, SourceFetcher};
use crate::error::DashError;

/// Reads local candidates straight from disk; there is no cache to bypass.
pub struct FileFetcher;

#[async_trait]
impl SourceFetcher for FileFetcher {
    async fn fetch(&self, source: &Source) -> Result<String, DashError> {
        match source {
            Source::File(path) => {
                tokio::fs::read_to_string(path)
                    .await
                    .map_err(|error| DashError::Io {
                        source_name: path.display().to_string(),
                        error,
                    })
            }
            other => Err(DashError::BadLocation {
                raw: other.to_string(),
                reason: "not a file location".to_string(),
            }),
        }
    }
}
