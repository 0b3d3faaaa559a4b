//! Error types for the Blockmind domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all Blockmind operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Model gateway errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Command errors ---
    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    // --- World errors ---
    #[error("World error: {0}")]
    World(#[from] WorldError),

    // --- Session persistence errors ---
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// Failures surfaced by the command dispatcher.
///
/// All of these are recoverable: the turn controller turns them into a
/// system turn and lets the model try again.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CommandError {
    #[error("Command {0} does not exist.")]
    NotFound(String),

    #[error("Command {name} was given invalid arguments: {reason}")]
    InvalidArguments { name: String, reason: String },

    #[error("Command {name} failed: {reason}")]
    Execution { name: String, reason: String },
}

#[derive(Debug, Clone, Error)]
pub enum WorldError {
    #[error("Not connected to the world: {0}")]
    Disconnected(String),

    #[error("Action failed: {0}")]
    ActionFailed(String),

    #[error("Unknown target: {0}")]
    UnknownTarget(String),

    #[error("Interrupted")]
    Interrupted,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Corrupt session file: {0}")]
    Corrupt(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn hallucinated_command_reads_like_a_system_turn() {
        let err = CommandError::NotFound("!fly".into());
        assert_eq!(err.to_string(), "Command !fly does not exist.");
    }

    #[test]
    fn invalid_arguments_names_the_command() {
        let err = Error::Command(CommandError::InvalidArguments {
            name: "!goTo".into(),
            reason: "expected 3 arguments, got 2".into(),
        });
        assert!(err.to_string().contains("!goTo"));
        assert!(err.to_string().contains("expected 3"));
    }
}
