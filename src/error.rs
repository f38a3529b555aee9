//! Error types for portprobe.
//!
//! Answers from the peer are never errors here: the prober turns them into
//! `closed`/`filtered` results. Request validation, unknown sessions, local
//! socket failures and orchestration-level faults surface as `ScanError`.

use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, ScanError>;

/// Rejections raised before any session is created or probe issued.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required parameter: {0}")]
    MissingField(&'static str),

    #[error("Target host must not be empty")]
    EmptyHost,

    #[error("Target host {host} could not be resolved: {reason}")]
    UnresolvableHost { host: String, reason: String },

    #[error("Invalid port {port}: ports must be between 1-65535")]
    PortOutOfRange { port: u32 },

    #[error("Invalid port range {start}-{end}: startPort must be <= endPort")]
    InvertedRange { start: u32, end: u32 },

    #[error("Port range too large: {len} ports requested, maximum {max} per scan")]
    RangeTooLarge { len: u32, max: u32 },

    #[error("Invalid port range syntax: {0}")]
    Syntax(String),
}

#[derive(Error, Debug)]
pub enum ScanError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Session not found: {0}")]
    SessionNotFound(Uuid),

    #[error("Session {0} is finalized and can no longer change")]
    SessionFinalized(Uuid),

    #[error("Scan orchestration failed: {0}")]
    Orchestration(String),

    /// The local side could not attempt the connection (fd exhaustion, no buffers,
    /// no source address). Says nothing about the peer.
    #[error("Local socket failure on port {port}: {source}")]
    Socket {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ScanError {
    /// True for errors caused by the caller's input rather than by the scanner.
    pub fn is_client_error(&self) -> bool {
        matches!(self, ScanError::Validation(_) | ScanError::SessionNotFound(_))
    }

    /// Short stable code for logs and API payloads.
    pub fn code(&self) -> &'static str {
        match self {
            ScanError::Validation(_) => "VALIDATION",
            ScanError::SessionNotFound(_) => "SESSION_NOT_FOUND",
            ScanError::SessionFinalized(_) => "SESSION_FINALIZED",
            ScanError::Orchestration(_) => "ORCHESTRATION",
            ScanError::Socket { .. } => "SOCKET",
            ScanError::Config(_) => "CONFIG",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_is_client_error() {
        let err: ScanError = ValidationError::EmptyHost.into();
        assert!(err.is_client_error());
        assert_eq!(err.code(), "VALIDATION");
        assert!(!ScanError::Orchestration("boom".into()).is_client_error());
        let socket = ScanError::Socket {
            port: 22,
            source: std::io::Error::from_raw_os_error(24),
        };
        assert!(!socket.is_client_error());
        assert_eq!(socket.code(), "SOCKET");
    }

    #[test]
    fn messages_name_the_problem() {
        let err = ValidationError::RangeTooLarge { len: 10_001, max: 10_000 };
        assert!(err.to_string().contains("10001"));
    }
}
