// SPDX-License-Identifier: MIT

//! Error taxonomy (§7): every fallible core operation returns a [`CoreError`]
//! carrying a [`ErrorKind`], a plain-language message, and 2-3 suggested
//! recovery actions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A suggested recovery action attached to an error or anomaly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestedAction {
    pub description: String,
    pub automatic: bool,
}

impl SuggestedAction {
    pub fn new(description: impl Into<String>, automatic: bool) -> Self {
        Self { description: description.into(), automatic }
    }
}

/// Coarse classification of connector failures, decided by the connector
/// (or the dispatcher's HTTP-status/timeout heuristics at the boundary).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectorFailureKind {
    /// Worth retrying with backoff (HTTP 5xx, timeout, connection reset).
    Transient,
    /// Ends the job as FAILED (explicit rejection from the provider).
    Permanent,
}

/// Error kind taxonomy, independent of the underlying Rust error type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Bad config, unknown enum, inconsistent combinations. Raised
    /// synchronously at submit; never mutates job state.
    Validation,
    /// job_id unknown, connector name unknown, checkpoint missing.
    NotFound,
    /// Operation inapplicable to current state (pause on not-running).
    IllegalState,
    /// Transient or permanent failure from a connector RPC.
    Connector(ConnectorFailureKind),
    /// Artifact hash mismatch or checkpoint metadata/blob mismatch.
    Integrity,
    /// Pause ack, RPC, or provider-never-starts.
    Timeout,
}

impl ErrorKind {
    /// Kinds the notification engine escalates to critical urgency
    /// regardless of nominal severity (§4.C), independent of whether a
    /// full [`CoreError`] is in hand (e.g. after a kind has been carried
    /// through an [`crate::event::Event`] without its message).
    pub fn is_auto_critical(&self) -> bool {
        matches!(self, ErrorKind::Connector(ConnectorFailureKind::Permanent) | ErrorKind::Integrity)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::NotFound => write!(f, "not_found"),
            ErrorKind::IllegalState => write!(f, "illegal_state"),
            ErrorKind::Connector(ConnectorFailureKind::Transient) => write!(f, "connector_transient"),
            ErrorKind::Connector(ConnectorFailureKind::Permanent) => write!(f, "connector_permanent"),
            ErrorKind::Integrity => write!(f, "integrity"),
            ErrorKind::Timeout => write!(f, "timeout"),
        }
    }
}

/// User-visible error: kind + plain-language message + suggested actions.
///
/// Never carries a stack trace, a Rust type name, or a file/line reference —
/// those belong in `tracing` spans, not in what the transport renders to a
/// caller.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct CoreError {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default)]
    pub suggested_actions: Vec<SuggestedAction>,
    /// Identifier the transport can use to render a help link. Not a URL
    /// itself — rendering is a transport concern.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help_link: Option<String>,
}

impl CoreError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), suggested_actions: Vec::new(), help_link: None }
    }

    pub fn with_actions(mut self, actions: Vec<SuggestedAction>) -> Self {
        self.suggested_actions = actions;
        self
    }

    pub fn with_help_link(mut self, id: impl Into<String>) -> Self {
        self.help_link = Some(id.into());
        self
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn illegal_state(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::IllegalState, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn integrity(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Integrity, message)
    }

    pub fn connector(kind: ConnectorFailureKind, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Connector(kind), message)
    }

    pub fn is_auto_critical(&self) -> bool {
        self.kind.is_auto_critical()
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_never_includes_rust_type_names() {
        let err = CoreError::validation("rank must be positive");
        let rendered = err.to_string();
        assert_eq!(rendered, "rank must be positive");
        assert!(!rendered.contains("CoreError"));
    }

    #[test]
    fn builder_chains_actions_and_help_link() {
        let err = CoreError::timeout("pause did not acknowledge within 30s")
            .with_actions(vec![SuggestedAction::new("retry pause", true)])
            .with_help_link("pause-timeout");
        assert_eq!(err.suggested_actions.len(), 1);
        assert_eq!(err.help_link.as_deref(), Some("pause-timeout"));
    }

    #[test]
    fn only_permanent_connector_and_integrity_errors_are_auto_critical() {
        assert!(CoreError::connector(ConnectorFailureKind::Permanent, "provider rejected the job").is_auto_critical());
        assert!(CoreError::integrity("checkpoint hash mismatch").is_auto_critical());

        assert!(!CoreError::connector(ConnectorFailureKind::Transient, "provider timed out").is_auto_critical());
        assert!(!CoreError::validation("bad config").is_auto_critical());
        assert!(!CoreError::not_found("job unknown").is_auto_critical());
        assert!(!CoreError::illegal_state("already running").is_auto_critical());
        assert!(!CoreError::timeout("pause ack").is_auto_critical());
    }
}
