//! Error handling for notebook-provision
//!
//! Provides centralized error handling with proper error types using thiserror.
//! Library code returns these errors to the caller; deciding whether a failed
//! step halts a whole provisioning batch is the driver's call, never the
//! library's.

use thiserror::Error;

/// Main error type for notebook-provision
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// IO errors (local file operations, template reads, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Session/transport errors (ssh spawn failures, lost connections)
    #[error("Session error: {0}")]
    Session(String),

    /// A remote command ran but exited non-zero
    #[error("Command failed: {context} (exit code {code}): {stderr}")]
    Command {
        context: String,
        code: i32,
        stderr: String,
    },

    /// Configuration errors (missing env vars, invalid values)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Template rendering errors (unknown or surviving tokens)
    #[error("Template error: {0}")]
    Template(String),

    /// OS package operations that fail outside per-package classification
    #[error("Package error: {0}")]
    Packages(String),

    /// State errors (mutex poisoning, invalid step state)
    #[error("State error: {0}")]
    State(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for provisioning operations
pub type Result<T> = std::result::Result<T, ProvisionError>;

// Convenient error constructors
impl ProvisionError {
    /// Create a session error
    pub fn session(msg: impl Into<String>) -> Self {
        Self::Session(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a template error
    pub fn template(msg: impl Into<String>) -> Self {
        Self::Template(msg.into())
    }

    /// Create a package error
    pub fn packages(msg: impl Into<String>) -> Self {
        Self::Packages(msg.into())
    }

    /// Create a state error
    pub fn state(msg: impl Into<String>) -> Self {
        Self::State(msg.into())
    }

    /// Create a command error from a failed remote invocation
    pub fn command(
        context: impl Into<String>,
        code: Option<i32>,
        stderr: impl Into<String>,
    ) -> Self {
        Self::Command {
            context: context.into(),
            code: code.unwrap_or(-1),
            stderr: stderr.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProvisionError::config("missing notebook_numpy_version");
        assert_eq!(
            err.to_string(),
            "Configuration error: missing notebook_numpy_version"
        );

        let err = ProvisionError::template("token R_VER not substituted");
        assert_eq!(
            err.to_string(),
            "Template error: token R_VER not substituted"
        );
    }

    #[test]
    fn test_command_error_display() {
        let err =
            ProvisionError::command("yum -y install R", Some(1), "No package R available.");
        assert_eq!(
            err.to_string(),
            "Command failed: yum -y install R (exit code 1): No package R available."
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "template not found");
        let err: ProvisionError = io_err.into();
        assert!(matches!(err, ProvisionError::Io(_)));
    }

    #[test]
    fn test_error_constructors() {
        let err = ProvisionError::session("ssh exited before handshake");
        assert!(matches!(err, ProvisionError::Session(_)));

        let err = ProvisionError::packages("yum metadata refresh failed");
        assert!(matches!(err, ProvisionError::Packages(_)));
    }
}
