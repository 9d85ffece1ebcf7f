//! Adapter errors, always attributed to a provider slug.

use thiserror::Error;

pub type AdapterResult<T> = Result<T, AdapterError>;

#[derive(Debug, Clone, Error)]
pub enum AdapterErrorKind {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("submission failed: {0}")]
    Submission(String),

    #[error("status probe failed: {0}")]
    Probe(String),

    #[error("catalog fetch failed: {0}")]
    Catalog(String),

    #[error("unknown provider")]
    UnknownProvider,
}

#[derive(Debug, Clone, Error)]
#[error("[{slug}] {kind}")]
pub struct AdapterError {
    slug: String,
    kind: AdapterErrorKind,
}

impl AdapterError {
    pub fn new(slug: impl Into<String>, kind: AdapterErrorKind) -> Self {
        Self {
            slug: slug.into(),
            kind,
        }
    }

    pub fn configuration(slug: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(slug, AdapterErrorKind::Configuration(message.into()))
    }

    pub fn network(slug: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(slug, AdapterErrorKind::Network(message.into()))
    }

    pub fn submission(slug: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(slug, AdapterErrorKind::Submission(message.into()))
    }

    pub fn probe(slug: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(slug, AdapterErrorKind::Probe(message.into()))
    }

    pub fn catalog(slug: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(slug, AdapterErrorKind::Catalog(message.into()))
    }

    pub fn unknown_provider(slug: impl Into<String>) -> Self {
        Self::new(slug, AdapterErrorKind::UnknownProvider)
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    pub fn kind(&self) -> &AdapterErrorKind {
        &self.kind
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            AdapterErrorKind::Network(_) | AdapterErrorKind::Probe(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_carry_the_slug() {
        let err = AdapterError::network("filecoin", "rpc timed out");
        assert_eq!(err.slug(), "filecoin");
        assert!(err.to_string().contains("filecoin"));
        assert!(err.to_string().contains("rpc timed out"));
    }

    #[test]
    fn only_transport_errors_are_retryable() {
        assert!(AdapterError::network("storj", "reset").is_retryable());
        assert!(!AdapterError::submission("storj", "rejected").is_retryable());
        assert!(!AdapterError::configuration("storj", "no key").is_retryable());
    }
}
