pub type ReelResult<T> = Result<T, ReelError>;

#[derive(thiserror::Error, Debug)]
pub enum ReelError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("capture unavailable: {0}")]
    CaptureUnavailable(String),

    #[error("encoder error: {0}")]
    Encoder(String),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("transcode error: {0}")]
    Transcode(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ReelError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn capture_unavailable(msg: impl Into<String>) -> Self {
        Self::CaptureUnavailable(msg.into())
    }

    pub fn encoder(msg: impl Into<String>) -> Self {
        Self::Encoder(msg.into())
    }

    pub fn unsupported_format(msg: impl Into<String>) -> Self {
        Self::UnsupportedFormat(msg.into())
    }

    pub fn transcode(msg: impl Into<String>) -> Self {
        Self::Transcode(msg.into())
    }

    /// Encoder construction failures that are worth one retry with a generic configuration.
    pub fn is_encoder_setup_failure(&self) -> bool {
        matches!(self, Self::Encoder(_) | Self::UnsupportedFormat(_))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
