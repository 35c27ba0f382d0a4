use std::path::PathBuf;

/// Result alias that carries the custom [`MixerError`] type.
pub type Result<T> = std::result::Result<T, MixerError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum MixerError {
    /// A caller-supplied parameter is missing or out of range.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    /// A referenced input file does not exist.
    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// The audio could not be decoded or lies outside the supported range.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    /// The decoded audio holds nothing that can be measured.
    #[error("empty input: {0}")]
    EmptyInput(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Writing the processed audio failed.
    #[error("encode failure: {0}")]
    EncodeFailure(String),
    /// The cache backend could not be reached. Gateways swallow this variant.
    #[error("cache unavailable: {0}")]
    CacheUnavailable(String),
    /// Configuration could not be loaded or parsed.
    #[error("configuration error: {0}")]
    Config(String),
}

impl MixerError {
    pub fn invalid<T: Into<String>>(msg: T) -> Self {
        Self::InvalidParameter(msg.into())
    }

    /// Returns `true` when the failure was caused by the request rather than
    /// by processing, i.e. it is detected before any expensive work starts.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidParameter(_) | Self::NotFound(_))
    }

    /// Stable machine readable code used in API error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidParameter(_) => "INVALID_PARAMETER",
            Self::NotFound(_) => "NOT_FOUND",
            Self::UnsupportedFormat(_) => "UNSUPPORTED_FORMAT",
            Self::EmptyInput(_) => "EMPTY_INPUT",
            Self::Io(_) => "IO_ERROR",
            Self::EncodeFailure(_) => "ENCODE_FAILURE",
            Self::CacheUnavailable(_) | Self::Config(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<hound::Error> for MixerError {
    fn from(value: hound::Error) -> Self {
        Self::EncodeFailure(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_request_errors() {
        assert!(MixerError::invalid("bpm must be positive").is_client_error());
        assert!(MixerError::NotFound(PathBuf::from("a.wav")).is_client_error());
        assert!(!MixerError::EncodeFailure("disk full".into()).is_client_error());
    }

    #[test]
    fn not_found_message_names_the_path() {
        let err = MixerError::NotFound(PathBuf::from("missing.lrc"));
        assert_eq!(err.code(), "NOT_FOUND");
        assert!(format!("{err}").contains("missing.lrc"));
    }
}
