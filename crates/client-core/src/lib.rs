//! Client-core: SIP client coordination layer for the console
//!
//! This crate sits above a SIP signaling library and below the console's
//! front ends. It never parses SIP or negotiates media; it only coordinates.
//!
//! ## Layering
//! ```text
//! sipconsole-cli -> sipconsole-load-tester -> client-core -> SignalingBackend (library adapter)
//!                   client-core::SipPhone  ----------------^
//! ```
//!
//! Client-core provides:
//! - The capability traits a signaling library adapter implements
//! - SIP URI validation and credential types
//! - The single-user softphone controller (`SipPhone`)
//! - Timeout and best-effort helpers for cleanup paths
//! - An in-process simulated backend (feature `sim`, on by default)

pub mod backend;
pub mod error;
pub mod phone;
pub mod recovery;
#[cfg(feature = "sim")]
pub mod sim;
pub mod types;
pub mod uri;

// Public API exports
pub use backend::{CallEvent, CallSession, EndpointEvent, EventStream, IncomingCall, SignalingBackend, SignalingEndpoint};
pub use error::{ClientError, ClientResult};
pub use phone::{PhoneConfig, PhoneDiagnostics, PhoneEvent, PhoneStatus, SipPhone};
pub use types::{CallId, CallOptions, CallerInfo, Credentials, InboundMessage, ReceivedMessage};
pub use uri::{host_from_uri, SipUri};

/// Client-core version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
