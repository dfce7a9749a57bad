//! Error types for adapters.

use hostwatch_types::SchemaError;
use thiserror::Error;

/// Errors that can occur when producing snapshots.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Reading the source failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse the source document.
    #[error("Failed to parse input: {0}")]
    Parse(String),

    /// The document does not have the plugin's shape.
    #[error("Unexpected shape: {0}")]
    Shape(#[from] SchemaError),

    /// A container engine call failed.
    #[error("{engine} engine error: {message}")]
    Engine { engine: String, message: String },
}

impl From<serde_json::Error> for AdapterError {
    fn from(err: serde_json::Error) -> Self {
        AdapterError::Parse(err.to_string())
    }
}

impl AdapterError {
    pub fn engine(engine: impl Into<String>, message: impl ToString) -> Self {
        AdapterError::Engine {
            engine: engine.into(),
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_error_names_the_engine() {
        let err = AdapterError::engine("podman", "socket closed");
        assert_eq!(err.to_string(), "podman engine error: socket closed");
    }

    #[test]
    fn json_errors_become_parse_errors() {
        let err: AdapterError = serde_json::from_str::<serde_json::Value>("{").unwrap_err().into();
        assert!(matches!(err, AdapterError::Parse(_)));
    }
}
