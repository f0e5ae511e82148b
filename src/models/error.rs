use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Request timed out: {url}")]
    Timeout { url: String },

    #[error("Upstream returned HTTP {status} for {context}")]
    UpstreamStatus { context: String, status: u16 },

    #[error("Slot discovery failed: {0}")]
    Discovery(String),

    #[error("Notification delivery failed with HTTP {status}: {body}")]
    Delivery { status: u16, body: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AppError {
    /// Classifies a reqwest failure, keeping timeouts distinct from other transport errors.
    pub fn transport(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AppError::Timeout { url: url.to_string() }
        } else {
            AppError::Http(err)
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
