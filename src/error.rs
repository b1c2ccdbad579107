use thiserror::Error;

/// One failed candidate, kept for the "no data source found" report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempt {
    pub source: String,
    pub reason: String,
}

impl std::fmt::Display for Attempt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.source, self.reason)
    }
}

#[derive(Debug, Error)]
pub enum DashError {
    #[error("{source_name}: HTTP {status}")]
    HttpStatus { source_name: String, status: u16 },

    #[error("{source_name}: {reason}")]
    Transport { source_name: String, reason: String },

    #[error("{source_name}: {error}")]
    Io {
        source_name: String,
        #[source]
        error: std::io::Error,
    },

    #[error("no data source found ({})", format_attempts(.attempts))]
    SourceUnavailable { attempts: Vec<Attempt> },

    #[error("loaded {source_name} but it holds no rows")]
    EmptyDataset { source_name: String },

    #[error("invalid source location {raw:?}: {reason}")]
    BadLocation { raw: String, reason: String },
}

impl DashError {
    /// Short machine-friendly kind for logs and the JSON state endpoint.
    pub fn kind(&self) -> &'static str {
        match self {
            DashError::HttpStatus { .. } => "http_status",
            DashError::Transport { .. } => "transport",
            DashError::Io { .. } => "io",
            DashError::SourceUnavailable { .. } => "source_unavailable",
            DashError::EmptyDataset { .. } => "empty_dataset",
            DashError::BadLocation { .. } => "bad_location",
        }
    }
}

fn format_attempts(attempts: &[Attempt]) -> String {
    if attempts.is_empty() {
        return "no candidates configured".to_string();
    }
    attempts
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_unavailable_lists_attempts() {
        let err = DashError::SourceUnavailable {
            attempts: vec![
                Attempt { source: "a.csv".into(), reason: "HTTP 404".into() },
                Attempt { source: "b.csv".into(), reason: "empty content".into() },
            ],
        };
        let msg = err.to_string();
        assert!(msg.starts_with("no data source found"));
        assert!(msg.contains("a.csv: HTTP 404"));
        assert!(msg.contains("b.csv: empty content"));
        assert_eq!(err.kind(), "source_unavailable");
    }

    #[test]
    fn test_no_candidates_message() {
        let err = DashError::SourceUnavailable { attempts: vec![] };
        assert!(err.to_string().contains("no candidates configured"));
    }
}
