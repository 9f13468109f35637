use noteshelf_cache::CacheError;
use noteshelf_net::NetError;
use pdf_engine::RenderError;
use thiserror::Error;

/// Failure modes of document resolution.
///
/// `Cancelled` is kept distinct from the real failures so callers can drop
/// the result silently instead of surfacing an error banner.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("note has neither a stored id nor a locator")]
    MissingReference,

    #[error("download failed")]
    Transport(#[source] NetError),

    #[error("fetched file is not a readable document")]
    InvalidDocument(#[source] RenderError),

    #[error("cache storage error")]
    Storage(#[from] CacheError),

    #[error("resolution cancelled")]
    Cancelled,
}

impl From<NetError> for ResolveError {
    fn from(err: NetError) -> Self {
        match err {
            NetError::Cancelled => ResolveError::Cancelled,
            other => ResolveError::Transport(other),
        }
    }
}

impl ResolveError {
    /// True when the failure is transient and a retry is reasonable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ResolveError::Transport(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_net_error_maps_to_cancelled() {
        let err: ResolveError = NetError::Cancelled.into();
        assert!(matches!(err, ResolveError::Cancelled));
    }

    #[test]
    fn transport_net_error_is_retryable() {
        let err: ResolveError = NetError::Transport("timed out".into()).into();
        assert!(err.is_retryable());
        assert!(!ResolveError::MissingReference.is_retryable());
    }
}
