//! Errors raised when reading typed fields out of a [`Message`](crate::Message).

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessageError {
    #[error("missing field: {0}")]
    MissingField(String),

    #[error("field {field} is not {expected}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
    },
}

impl MessageError {
    pub fn error_code(&self) -> &str {
        match self {
            Self::MissingField(_) => "missing_field",
            Self::TypeMismatch { .. } => "type_mismatch",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes() {
        assert_eq!(
            MessageError::MissingField("x".into()).error_code(),
            "missing_field"
        );
        assert_eq!(
            MessageError::TypeMismatch {
                field: "x".into(),
                expected: "an integer",
            }
            .error_code(),
            "type_mismatch"
        );
    }

    #[test]
    fn display() {
        let err = MessageError::TypeMismatch {
            field: "thread-id".into(),
            expected: "an integer",
        };
        assert_eq!(err.to_string(), "field thread-id is not an integer");
    }
}
