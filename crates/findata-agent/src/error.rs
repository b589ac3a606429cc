//! Error types for agent operations

use thiserror::Error;

/// Agent specific errors
#[derive(Debug, Error)]
pub enum AgentError {
    /// Completion backend failed (transport, auth, malformed response)
    #[error("Generator error: {0}")]
    Generator(#[from] findata_llm::LLMError),

    /// Script execution infrastructure failed (spawn, I/O)
    #[error("Execution error: {0}")]
    Execution(String),

    /// Prompt template rendering failed
    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The resolved intent names an API the fallback template cannot serve
    #[error("Unsupported fallback combination: {0}")]
    UnsupportedCombination(String),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AgentError::Execution("script vanished".to_string());
        assert_eq!(err.to_string(), "Execution error: script vanished");

        let err = AgentError::UnsupportedCombination("pro.income".to_string());
        assert_eq!(
            err.to_string(),
            "Unsupported fallback combination: pro.income"
        );
    }
}
