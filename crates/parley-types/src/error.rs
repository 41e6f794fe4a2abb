use thiserror::Error;

/// Precondition violations raised by chat memory and eviction policies.
///
/// These signal a caller bug and are never swallowed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MemoryError {
    #[error("message at index {index} has no token count (required by the token-window policy)")]
    MissingTokenCount { index: usize },
}

/// Errors from the tool-call vetting coordinator.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum VettingError {
    #[error("vetting request {0} was cancelled before every call was resolved")]
    Cancelled(uuid::Uuid),

    #[error("vetting request {0} was dropped by the coordinator")]
    Abandoned(uuid::Uuid),
}

/// Errors from a model send capability.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider error: {message}")]
    Provider { message: String },

    #[error("request cancelled")]
    Cancelled,
}

/// Errors from repository operations (used by trait definitions in parley-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("conversation not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_error_display() {
        let err = MemoryError::MissingTokenCount { index: 3 };
        assert!(err.to_string().contains("index 3"));
    }

    #[test]
    fn test_vetting_error_display() {
        let id = uuid::Uuid::now_v7();
        let err = VettingError::Cancelled(id);
        assert!(err.to_string().contains(&id.to_string()));
    }

    #[test]
    fn test_repository_error_display() {
        let err = RepositoryError::NotFound("abc".to_string());
        assert_eq!(err.to_string(), "conversation not found: abc");

        let io = RepositoryError::from(std::io::Error::other("disk full"));
        assert!(io.to_string().contains("disk full"));
    }
}
