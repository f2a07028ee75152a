//! Shared data types for the client-core library
//!
//! - **Credentials** - one signaling identity (URI, WebSocket server, auth)
//! - **CallOptions** - local media constraints for a call
//! - **CallerInfo / ReceivedMessage** - what the UI shows for inbound traffic

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ClientError, ClientResult};
use crate::uri::SipUri;

/// Unique identifier for a call
pub type CallId = Uuid;

/// Credentials for one signaling identity
///
/// ```rust
/// use sipconsole_client_core::Credentials;
///
/// let creds = Credentials::new("sip:5001@192.168.2.200", "wss://192.168.2.200:7443", "5001", "secret")
///     .with_display_name("Load Tester");
/// assert!(creds.validate().is_ok());
/// assert_eq!(creds.identity().unwrap().user(), Some("5001"));
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Identity URI (AOR), e.g. `sip:5001@pbx.example.com`
    pub uri: String,
    /// WebSocket server URL, e.g. `wss://pbx.example.com:7443`
    pub ws_servers: String,
    /// Authorization user
    pub auth_user: String,
    /// Authorization password
    pub password: String,
    /// Display name
    #[serde(default)]
    pub display_name: Option<String>,
}

impl Credentials {
    pub fn new(
        uri: impl Into<String>,
        ws_servers: impl Into<String>,
        auth_user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            uri: uri.into(),
            ws_servers: ws_servers.into(),
            auth_user: auth_user.into(),
            password: password.into(),
            display_name: None,
        }
    }

    /// Set display name
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    /// Parse the identity URI
    pub fn identity(&self) -> ClientResult<SipUri> {
        SipUri::parse(&self.uri)
    }

    /// Validate the identity URI and the transport address
    pub fn validate(&self) -> ClientResult<()> {
        self.identity()?;

        let server = self.ws_servers.trim();
        if server.is_empty() {
            return Err(ClientError::invalid_configuration("ws_servers", "WebSocket server is required"));
        }
        if !(server.starts_with("ws://") || server.starts_with("wss://")) {
            return Err(ClientError::invalid_configuration(
                "ws_servers",
                format!("'{}' is not a ws:// or wss:// URL", server),
            ));
        }
        if self.auth_user.trim().is_empty() {
            return Err(ClientError::invalid_configuration("auth_user", "authorization user is required"));
        }
        Ok(())
    }
}

// Keep the password out of logs
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("uri", &self.uri)
            .field("ws_servers", &self.ws_servers)
            .field("auth_user", &self.auth_user)
            .field("password", &"<redacted>")
            .field("display_name", &self.display_name)
            .finish()
    }
}

/// Local media constraints for a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallOptions {
    /// Capture the microphone
    pub audio: bool,
    /// Capture the camera
    pub video: bool,
    /// Send the INVITE without an SDP offer
    pub without_sdp: bool,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            audio: true,
            video: false,
            without_sdp: false,
        }
    }
}

impl CallOptions {
    /// No local media acquisition at all. Used for load generation, where
    /// many concurrent calls must not contend for devices or permission prompts.
    pub fn no_media() -> Self {
        Self {
            audio: false,
            video: false,
            without_sdp: true,
        }
    }

    pub fn with_video(mut self, video: bool) -> Self {
        self.video = video;
        self
    }

    pub fn with_audio(mut self, audio: bool) -> Self {
        self.audio = audio;
        self
    }

    pub fn acquires_local_media(&self) -> bool {
        self.audio || self.video
    }
}

/// Remote party of an incoming call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerInfo {
    /// Display name, falls back to the URI
    pub name: String,
    pub uri: String,
}

impl CallerInfo {
    pub fn new(uri: impl Into<String>, display_name: Option<String>) -> Self {
        let uri = uri.into();
        let name = display_name.filter(|n| !n.is_empty()).unwrap_or_else(|| uri.clone());
        Self { name, uri }
    }
}

/// An instant message as delivered by the signaling library
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub from_uri: String,
    pub from_display_name: Option<String>,
    pub body: String,
}

/// An instant message as kept in the phone's inbox
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivedMessage {
    pub id: String,
    /// `Name <uri>`
    pub from: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl From<InboundMessage> for ReceivedMessage {
    fn from(message: InboundMessage) -> Self {
        let caller = CallerInfo::new(message.from_uri, message.from_display_name);
        Self {
            id: Uuid::new_v4().to_string(),
            from: format!("{} <{}>", caller.name, caller.uri),
            content: message.body,
            timestamp: Utc::now(),
        }
    }
}

/// Validate a single DTMF tone: `0-9`, `A-D`, `#`, `*` or `,` (pause)
pub fn validate_dtmf_tone(tone: &str) -> ClientResult<char> {
    let mut chars = tone.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if matches!(c, '0'..='9' | 'A'..='D' | '#' | '*' | ',') => Ok(c),
        _ => Err(ClientError::InvalidDtmf { tone: tone.to_string() }),
    }
}
