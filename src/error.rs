// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

/// How the sequencer should treat a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Worth retrying within a bounded number of attempts
    Transient,
    /// Missing files or values, fatal before any side effect
    Configuration,
    /// Permission denied, malformed payloads and the like
    Unrecoverable,
    /// The caller asked us to stop
    Cancelled,
}

#[derive(Error, Debug)]
pub enum AirliftError {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid image reference '{reference}': {reason}")]
    InvalidReference { reference: String, reason: String },

    #[error("{program} {args} failed ({status}): {stderr}")]
    CommandFailed {
        program: String,
        args: String,
        status: String,
        stderr: String,
    },

    #[error("Registry request failed: {0}")]
    RegistryError(String),

    #[error("Transient failure: {0}")]
    Transient(String),

    #[error("Unrecoverable failure: {0}")]
    Unrecoverable(String),

    #[error("Workload reported a fatal condition: {reason}")]
    NotReady {
        reason: String,
        diagnostics: serde_json::Value,
    },

    #[error("Stage '{stage}' timed out waiting for {target}")]
    StageTimedOut {
        stage: String,
        target: String,
        diagnostics: serde_json::Value,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("Manifest parse error: {0}")]
    ManifestError(#[from] serde_yaml::Error),
}

impl AirliftError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            AirliftError::KubeError(e) => kube_error_category(e),
            AirliftError::ConfigError(_) | AirliftError::InvalidReference { .. } => {
                ErrorCategory::Configuration
            }
            AirliftError::CommandFailed { stderr, .. } => {
                if looks_transient(stderr) {
                    ErrorCategory::Transient
                } else {
                    ErrorCategory::Unrecoverable
                }
            }
            AirliftError::RegistryError(msg) => {
                if looks_transient(msg) {
                    ErrorCategory::Transient
                } else {
                    ErrorCategory::Unrecoverable
                }
            }
            AirliftError::Transient(_) => ErrorCategory::Transient,
            AirliftError::Cancelled => ErrorCategory::Cancelled,
            AirliftError::Unrecoverable(_)
            | AirliftError::NotReady { .. }
            | AirliftError::StageTimedOut { .. }
            | AirliftError::IoError(_)
            | AirliftError::SerdeError(_)
            | AirliftError::ManifestError(_) => ErrorCategory::Unrecoverable,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.category() == ErrorCategory::Transient
    }

    /// Diagnostic snapshot attached to the failure, if any
    pub fn diagnostics(&self) -> Option<&serde_json::Value> {
        match self {
            AirliftError::StageTimedOut { diagnostics, .. }
            | AirliftError::NotReady { diagnostics, .. } => Some(diagnostics),
            _ => None,
        }
    }
}

fn kube_error_category(error: &kube::Error) -> ErrorCategory {
    match error {
        kube::Error::Api(resp) => match resp.code {
            429 | 500..=599 => ErrorCategory::Transient,
            _ => ErrorCategory::Unrecoverable,
        },
        kube::Error::HyperError(_) | kube::Error::Service(_) => ErrorCategory::Transient,
        _ => ErrorCategory::Unrecoverable,
    }
}

/// Connectivity failures reported by CLI tools and HTTP clients
fn looks_transient(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    [
        "connection refused",
        "connection reset",
        "no such host",
        "i/o timeout",
        "tls handshake timeout",
        "timed out",
        "503 service unavailable",
        "502 bad gateway",
        "too many requests",
    ]
    .iter()
    .any(|needle| message.contains(needle))
}

/// Check whether a kube error is a 409 "already exists" from the API server
pub fn is_conflict(error: &kube::Error) -> bool {
    matches!(error, kube::Error::Api(resp) if resp.code == 409)
}

pub type Result<T> = std::result::Result<T, AirliftError>;

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ErrorResponse;

    fn api_error(code: u16) -> AirliftError {
        AirliftError::KubeError(kube::Error::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: "boom".to_string(),
            reason: "Test".to_string(),
            code,
        }))
    }

    #[test]
    fn test_forbidden_is_unrecoverable() {
        assert_eq!(api_error(403).category(), ErrorCategory::Unrecoverable);
    }

    #[test]
    fn test_server_errors_are_transient() {
        assert!(api_error(503).is_transient());
        assert!(api_error(429).is_transient());
    }

    #[test]
    fn test_command_failure_classified_by_stderr() {
        let unreachable = AirliftError::CommandFailed {
            program: "docker".to_string(),
            args: "push registry.local/a:v1".to_string(),
            status: "exit status: 1".to_string(),
            stderr: "dial tcp 10.0.0.1:5000: connect: connection refused".to_string(),
        };
        assert!(unreachable.is_transient());

        let denied = AirliftError::CommandFailed {
            program: "docker".to_string(),
            args: "push registry.local/a:v1".to_string(),
            status: "exit status: 1".to_string(),
            stderr: "denied: requested access to the resource is denied".to_string(),
        };
        assert_eq!(denied.category(), ErrorCategory::Unrecoverable);
    }

    #[test]
    fn test_config_errors_are_configuration() {
        let err = AirliftError::ConfigError("archive missing".to_string());
        assert_eq!(err.category(), ErrorCategory::Configuration);
    }

    #[test]
    fn test_timeout_carries_diagnostics() {
        let err = AirliftError::StageTimedOut {
            stage: "knative-serving".to_string(),
            target: "KnativeServing knative-serving/knative-serving".to_string(),
            diagnostics: serde_json::json!({"ready": false}),
        };
        assert_eq!(err.diagnostics(), Some(&serde_json::json!({"ready": false})));
    }

    #[test]
    fn test_fatal_condition_carries_diagnostics() {
        let err = AirliftError::NotReady {
            reason: "pods: InvalidImageName".to_string(),
            diagnostics: serde_json::json!({"pods": []}),
        };
        assert_eq!(err.category(), ErrorCategory::Unrecoverable);
        assert_eq!(err.diagnostics(), Some(&serde_json::json!({"pods": []})));
    }
}
