//! Error handling module for the deployment driver
//!
//! Provides the crate-wide error type using thiserror. Fatal precondition
//! failures (bad topology requests, missing roles) and remote command failures
//! all surface through `RolloverError`.

use thiserror::Error;

/// Main error type for the deployment driver
#[derive(Error, Debug)]
pub enum RolloverError {
    /// A topology addition pattern matched no node
    #[error("No match for {pattern}")]
    NoMatch { pattern: String },

    /// A topology addition pattern matched more than one node
    #[error("Multiple nodes are matching node-name {pattern}: {matches:?}")]
    MultipleMatches {
        pattern: String,
        matches: Vec<String>,
    },

    /// A topology addition pattern is not a valid regular expression
    #[error("Invalid node-name pattern {pattern}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A node does not have enough free volumes for the requested OSDs
    #[error("Insufficient volumes on the {node} node. Required: {required} - Found: {found}")]
    InsufficientVolumes {
        node: String,
        required: usize,
        found: usize,
    },

    /// No node in the working set carries a role the run depends on
    #[error("No {0} node found in the cluster")]
    MissingRole(crate::types::Role),

    /// A checked remote command exited non-zero
    #[error("Command '{command}' failed on {node} with exit code {exit_code}: {stderr}")]
    CommandFailed {
        node: String,
        command: String,
        exit_code: i32,
        stderr: String,
    },

    /// The remote session itself could not be established or was lost
    #[error("Transport error on {node}: {message}")]
    Transport { node: String, message: String },

    /// Configuration errors (loading, parsing, validation)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Cluster health output could not be interpreted
    #[error("Health check error: {0}")]
    Health(String),

    /// IO errors (local files, child processes)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for driver operations
pub type Result<T> = std::result::Result<T, RolloverError>;

impl RolloverError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a health check error
    pub fn health(msg: impl Into<String>) -> Self {
        Self::Health(msg.into())
    }

    /// Create a transport error for a node
    pub fn transport(node: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Transport {
            node: node.into(),
            message: msg.into(),
        }
    }

    /// Returns true for failures caused by a bad topology request
    pub fn is_topology_error(&self) -> bool {
        matches!(
            self,
            Self::NoMatch { .. }
                | Self::MultipleMatches { .. }
                | Self::InvalidPattern { .. }
                | Self::InsufficientVolumes { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    #[test]
    fn test_error_display() {
        let err = RolloverError::NoMatch {
            pattern: ".*node15.*".to_string(),
        };
        assert_eq!(err.to_string(), "No match for .*node15.*");

        let err = RolloverError::InsufficientVolumes {
            node: "node4".to_string(),
            required: 3,
            found: 1,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient volumes on the node4 node. Required: 3 - Found: 1"
        );

        let err = RolloverError::MissingRole(Role::Installer);
        assert_eq!(err.to_string(), "No installer node found in the cluster");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: RolloverError = io_err.into();
        assert!(matches!(err, RolloverError::Io(_)));
    }

    #[test]
    fn test_topology_classification() {
        let err = RolloverError::MultipleMatches {
            pattern: "node".to_string(),
            matches: vec!["node1".to_string(), "node2".to_string()],
        };
        assert!(err.is_topology_error());
        assert!(!RolloverError::config("bad").is_topology_error());
    }
}
