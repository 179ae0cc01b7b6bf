//! Error types for the feedcast-proto crate.

use thiserror::Error;

/// Errors that can occur during protocol operations.
#[derive(Debug, Error)]
pub enum ProtoError {
    /// Failed to encode a frame or event.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Failed to decode a frame or event.
    #[error("decoding error: {0}")]
    Decoding(String),

    /// A decoded value violated a protocol rule.
    #[error("validation error: {0}")]
    Validation(String),
}

impl From<serde_json::Error> for ProtoError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_syntax() || err.is_eof() {
            Self::Decoding(err.to_string())
        } else {
            Self::Encoding(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoding_error_display() {
        let err = ProtoError::Encoding("bad value".to_string());
        assert_eq!(err.to_string(), "encoding error: bad value");
    }

    #[test]
    fn test_decoding_error_display() {
        let err = ProtoError::Decoding("unexpected token".to_string());
        assert_eq!(err.to_string(), "decoding error: unexpected token");
    }

    #[test]
    fn test_validation_error_display() {
        let err = ProtoError::Validation("id mismatch".to_string());
        assert_eq!(err.to_string(), "validation error: id mismatch");
    }

    #[test]
    fn test_syntax_error_maps_to_decoding() {
        let json_err = serde_json::from_str::<serde_json::Value>("[1, 2")
            .expect_err("truncated JSON must fail");
        let err: ProtoError = json_err.into();
        assert!(matches!(err, ProtoError::Decoding(_)));
    }
}
