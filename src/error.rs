use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("XML parsing error: {0}")]
    Xml(String),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid year range: {0}")]
    InvalidYearRange(String),

    #[cfg(feature = "client")]
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[cfg(feature = "client")]
    #[error("resource not found")]
    NotFound,

    #[cfg(feature = "client")]
    #[error("rate limit exceeded")]
    RateLimitExceeded,

    #[cfg(feature = "client")]
    #[error("ticker not found: {0}")]
    TickerNotFound(String),

    #[cfg(feature = "client")]
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl From<quick_xml::Error> for ExtractError {
    fn from(error: quick_xml::Error) -> Self {
        ExtractError::Xml(error.to_string())
    }
}

impl From<quick_xml::DeError> for ExtractError {
    fn from(error: quick_xml::DeError) -> Self {
        ExtractError::Xml(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ExtractError>;
