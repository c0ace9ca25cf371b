use thiserror::Error;

/// Error type for the wizard engine
///
/// Runtime data conditions (validation failures, rejected navigation,
/// missing persisted state) are not errors; they surface as returned
/// values and events. `WizardError` covers programmer errors and
/// infrastructure failures only.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WizardError {
    /// A method was called after `destroy()`
    #[error("wizard instance has been destroyed")]
    Destroyed,

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Storage backend failure
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for WizardError {
    fn from(err: serde_json::Error) -> Self {
        WizardError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for WizardError {
    fn from(err: std::io::Error) -> Self {
        WizardError::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let errors = vec![
            (WizardError::Destroyed, "wizard instance has been destroyed"),
            (
                WizardError::Configuration("duplicate step id".to_string()),
                "configuration error: duplicate step id",
            ),
            (
                WizardError::Storage("disk full".to_string()),
                "storage error: disk full",
            ),
            (
                WizardError::Serialization("bad json".to_string()),
                "serialization error: bad json",
            ),
        ];

        for (error, expected) in errors {
            assert_eq!(error.to_string(), expected);
        }
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_error = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let error: WizardError = json_error.into();
        assert!(matches!(error, WizardError::Serialization(_)));
    }

    #[test]
    fn test_from_io_error() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let error: WizardError = io_error.into();
        match error {
            WizardError::Storage(msg) => assert!(msg.contains("missing")),
            other => panic!("expected Storage variant, got {other:?}"),
        }
    }
}
