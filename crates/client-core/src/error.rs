//! Error types and handling for the client-core library
//!
//! Errors are categorized to help callers decide what to do with them:
//!
//! - **Configuration Errors** - Invalid URIs or settings, can't recover without fixing input
//! - **Network Errors** - Transport connect/disconnect problems, usually recoverable
//! - **Call Errors** - Rejected or failed calls, the cause string comes from the signaling library
//! - **State Errors** - Operation not valid right now (no session, not registered)
//!
//! # Basic Pattern
//!
//! ```rust
//! use sipconsole_client_core::{ClientError, SipUri};
//!
//! match SipUri::parse("bob@example.com") {
//!     Ok(uri) => println!("calling {}", uri),
//!     Err(ClientError::InvalidUri { uri, reason }) => {
//!         eprintln!("{} is not a SIP URI: {}", uri, reason);
//!     }
//!     Err(e) => eprintln!("unexpected: {}", e),
//! }
//! ```
//!
//! Use [`ClientError::category`] to group errors for counters or log fields.

use thiserror::Error;

/// Result type alias for client-core operations
pub type ClientResult<T> = Result<T, ClientError>;

/// Error types for SIP client operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Configuration errors
    #[error("Invalid SIP URI '{uri}': {reason}")]
    InvalidUri { uri: String, reason: String },

    #[error("Invalid configuration: {field} - {reason}")]
    InvalidConfiguration { field: String, reason: String },

    /// Endpoint lifecycle errors
    #[error("Endpoint creation failed: {reason}")]
    EndpointCreationFailed { reason: String },

    #[error("User agent not ready")]
    NotReady,

    /// Network and transport errors
    #[error("Connection failed: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Transport disconnected: {reason}")]
    TransportDisconnected { reason: String },

    /// Registration errors
    #[error("Registration failed: {reason}")]
    RegistrationFailed { reason: String },

    #[error("Not registered with server")]
    NotRegistered,

    /// Call related errors
    #[error("Call setup failed: {reason}")]
    CallSetupFailed { reason: String },

    #[error("Call failed: {cause}")]
    CallFailed { cause: String, status_code: Option<u16> },

    #[error("No active session")]
    NoActiveSession,

    #[error("No incoming call")]
    NoIncomingCall,

    #[error("Invalid DTMF tone: {tone:?}")]
    InvalidDtmf { tone: String },

    #[error("Call control failed: {operation} - {reason}")]
    CallControlFailed { operation: String, reason: String },

    /// Messaging errors
    #[error("Message delivery failed: {reason}")]
    MessageFailed { reason: String },

    /// Generic errors
    #[error("Operation '{operation}' timed out after {duration_ms}ms")]
    OperationTimeout { operation: String, duration_ms: u64 },

    #[error("Not supported by this backend: {operation}")]
    NotSupported { operation: String },

    #[error("Internal error: {message}")]
    InternalError { message: String },
}

impl ClientError {
    /// Create an invalid URI error
    pub fn invalid_uri(uri: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUri { uri: uri.into(), reason: reason.into() }
    }

    /// Create an invalid configuration error
    pub fn invalid_configuration(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration { field: field.into(), reason: reason.into() }
    }

    /// Create an endpoint creation error
    pub fn endpoint_creation_failed(reason: impl Into<String>) -> Self {
        Self::EndpointCreationFailed { reason: reason.into() }
    }

    /// Create a connection failed error
    pub fn connection_failed(reason: impl Into<String>) -> Self {
        Self::ConnectionFailed { reason: reason.into() }
    }

    /// Create a transport disconnected error
    pub fn transport_disconnected(reason: impl Into<String>) -> Self {
        Self::TransportDisconnected { reason: reason.into() }
    }

    /// Create a registration failed error
    pub fn registration_failed(reason: impl Into<String>) -> Self {
        Self::RegistrationFailed { reason: reason.into() }
    }

    /// Create a call setup failed error
    pub fn call_setup_failed(reason: impl Into<String>) -> Self {
        Self::CallSetupFailed { reason: reason.into() }
    }

    /// Create a call control error
    pub fn call_control_failed(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CallControlFailed { operation: operation.into(), reason: reason.into() }
    }

    /// Create an internal error
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError { message: message.into() }
    }

    /// Check if this error is recoverable by retrying later
    pub fn is_recoverable(&self) -> bool {
        match self {
            ClientError::ConnectionFailed { .. }
            | ClientError::TransportDisconnected { .. }
            | ClientError::OperationTimeout { .. } => true,

            ClientError::InvalidUri { .. }
            | ClientError::InvalidConfiguration { .. }
            | ClientError::InvalidDtmf { .. }
            | ClientError::NotSupported { .. } => false,

            _ => false,
        }
    }

    /// Check if error is call-related
    pub fn is_call_error(&self) -> bool {
        matches!(
            self,
            ClientError::CallSetupFailed { .. }
                | ClientError::CallFailed { .. }
                | ClientError::NoActiveSession
                | ClientError::NoIncomingCall
                | ClientError::CallControlFailed { .. }
        )
    }

    /// Get error category for metrics/logging
    pub fn category(&self) -> &'static str {
        match self {
            ClientError::InvalidUri { .. }
            | ClientError::InvalidConfiguration { .. }
            | ClientError::InvalidDtmf { .. } => "configuration",

            ClientError::EndpointCreationFailed { .. } | ClientError::NotReady => "endpoint",

            ClientError::ConnectionFailed { .. } | ClientError::TransportDisconnected { .. } => {
                "network"
            }

            ClientError::RegistrationFailed { .. } | ClientError::NotRegistered => "registration",

            ClientError::CallSetupFailed { .. }
            | ClientError::CallFailed { .. }
            | ClientError::NoActiveSession
            | ClientError::NoIncomingCall
            | ClientError::CallControlFailed { .. } => "call",

            ClientError::MessageFailed { .. } => "messaging",

            ClientError::OperationTimeout { .. }
            | ClientError::NotSupported { .. }
            | ClientError::InternalError { .. } => "system",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(ClientError::invalid_uri("x", "no scheme").category(), "configuration");
        assert_eq!(ClientError::connection_failed("refused").category(), "network");
        assert_eq!(ClientError::NoIncomingCall.category(), "call");
        assert_eq!(
            ClientError::OperationTimeout { operation: "release".into(), duration_ms: 10 }.category(),
            "system"
        );
    }

    #[test]
    fn test_recoverable() {
        assert!(ClientError::transport_disconnected("closed").is_recoverable());
        assert!(!ClientError::InvalidDtmf { tone: "X".into() }.is_recoverable());
        assert!(ClientError::NoActiveSession.is_call_error());
        assert!(!ClientError::NotReady.is_call_error());
    }

    #[test]
    fn test_display() {
        let err = ClientError::CallFailed { cause: "Busy".into(), status_code: Some(486) };
        assert_eq!(err.to_string(), "Call failed: Busy");
        assert_eq!(ClientError::NotReady.to_string(), "User agent not ready");
    }
}
