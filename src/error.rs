use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Speech generation failed: {0}")]
    Generation(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Render failed: {0}")]
    Render(String),

    #[error("Concatenation failed: {0}")]
    Concatenation(String),

    #[error("Incompatible videos: {0}")]
    Compatibility(String),

    #[error("Export cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ExportError {
    /// Whether a retry could plausibly succeed. Only connection and
    /// timeout class failures qualify; validation and provider rejections
    /// never do.
    pub fn is_transient(&self) -> bool {
        match self {
            ExportError::Network(_) => true,
            ExportError::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ExportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ExportError::Network("reset".to_string()).is_transient());
        assert!(!ExportError::Validation("bad".to_string()).is_transient());
        assert!(!ExportError::Generation("quota".to_string()).is_transient());
        assert!(!ExportError::Cancelled.is_transient());
    }
}
