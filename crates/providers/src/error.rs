use thiserror::Error;

/// A provider could not be constructed.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}
