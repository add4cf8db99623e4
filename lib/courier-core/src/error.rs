use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Translation error for {resource}: {reason}")]
    TranslationError { resource: String, reason: String },

    #[error("Failed to fetch routing resources: {0}")]
    FetchError(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Prometheus error: {0}")]
    MetricsError(#[from] prometheus::Error),
}

impl CoreError {
    /// Wrap any error raised while listing routing resources
    pub fn fetch<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        CoreError::FetchError(error.into())
    }

    pub(crate) fn translation(resource: &str, reason: impl Into<String>) -> Self {
        CoreError::TranslationError {
            resource: resource.to_string(),
            reason: reason.into(),
        }
    }
}
