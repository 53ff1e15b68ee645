use thiserror::Error;

/// Errors surfaced by the script registry.
///
/// Storage faults are reported to the direct caller and never retried
/// here; a missing id is its own variant so callers can distinguish
/// "unknown script" from a broken backing store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("script not found: {id}")]
    NotFound { id: i64 },

    #[error("storage error: {source}")]
    Storage {
        #[from]
        source: sqlx::Error,
    },

    #[error("migration error: {source}")]
    Migration {
        #[from]
        source: sqlx::migrate::MigrateError,
    },
}

/// Errors raised by a `DocumentHost` implementation.
///
/// Evaluation faults are contained inside the injection engine: they are
/// logged per script and never abort sibling scripts or the navigation.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("failed to create isolated context: {0}")]
    ContextCreation(String),

    #[error("script evaluation failed: {0}")]
    Evaluation(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message_names_id() {
        let err = StoreError::NotFound { id: 42 };
        assert_eq!(err.to_string(), "script not found: 42");
    }

    #[test]
    fn test_host_error_messages() {
        let err = HostError::Evaluation("ReferenceError: x is not defined".to_string());
        assert!(err.to_string().contains("ReferenceError"));

        let err = HostError::ContextCreation("out of memory".to_string());
        assert!(err.to_string().starts_with("failed to create isolated context"));
    }
}
