//! Error taxonomy for cache operations

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the cache engine
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid construction parameters for a store or cache
    #[error("configuration error in {component}: {message}")]
    Configuration {
        component: &'static str,
        message: String,
    },

    /// Requested construction of a cache type that is not registered
    #[error("unknown cache type '{kind}'")]
    UnknownCacheType { kind: String },

    /// I/O or corruption from the persistent tier; propagated unchanged
    #[error("storage {operation} failed: {message}")]
    Storage {
        operation: &'static str,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Payload encode/decode failure
    #[error("failed to {operation} payload for key '{key}'")]
    Serialization {
        key: String,
        operation: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// Upstream source-of-truth fetch failure
    #[error("upstream fetch for key '{key}' failed: {message}")]
    Source { key: String, message: String },
}

impl Error {
    /// Configuration error naming the offending component.
    pub fn configuration(component: &'static str, message: impl Into<String>) -> Self {
        Error::Configuration {
            component,
            message: message.into(),
        }
    }

    /// Storage error wrapping the engine's own error as the source.
    pub fn storage(
        operation: &'static str,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Error::Storage {
            operation,
            message: source.to_string(),
            source: Some(Box::new(source)),
        }
    }

    /// Storage error with no underlying source, e.g. a corrupt row.
    pub fn corrupt(operation: &'static str, message: impl Into<String>) -> Self {
        Error::Storage {
            operation,
            message: message.into(),
            source: None,
        }
    }
}
