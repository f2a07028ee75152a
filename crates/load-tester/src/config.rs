//! Load test configuration
//!
//! A run is described by one [`LoadTestConfig`]. It deserializes from the
//! TOML layout used by the command line front end:
//!
//! ```toml
//! target = "sip:1413@192.168.2.200"
//! concurrency = 10
//! hold_secs = 30
//! auto_hangup = true
//!
//! [credentials]
//! uri = "sip:5001@192.168.2.200"
//! ws_servers = "wss://192.168.2.200:7443"
//! auth_user = "5001"
//! password = "secret"
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use sipconsole_client_core::{Credentials, SipUri};

use crate::error::{LoadTestError, LoadTestResult};

/// Display name used when the credentials don't set one
pub const DEFAULT_DISPLAY_NAME: &str = "LoadTester";

/// Upper bound on concurrent attempts per run
pub const MAX_CONCURRENCY: usize = 10_000;

fn default_concurrency() -> usize {
    10
}

fn default_hold_secs() -> u64 {
    30
}

fn default_auto_hangup() -> bool {
    true
}

fn default_connect_timeout_secs() -> u64 {
    30
}

fn default_teardown_timeout_ms() -> u64 {
    5_000
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadTestConfig {
    /// Identity every attempt's endpoint uses
    pub credentials: Credentials,

    /// Callee URI
    pub target: String,

    /// Number of concurrent attempts (N)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// How long an established call is held before auto-hangup
    #[serde(default = "default_hold_secs")]
    pub hold_secs: u64,

    /// Hang up established calls after `hold_secs`
    #[serde(default = "default_auto_hangup")]
    pub auto_hangup: bool,

    /// Give up on calls not established within this time
    #[serde(default)]
    pub answer_timeout_secs: Option<u64>,

    /// Bound on transport connect and on call placement
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Bound on each terminate and release step
    #[serde(default = "default_teardown_timeout_ms")]
    pub teardown_timeout_ms: u64,
}

impl LoadTestConfig {
    pub fn new(credentials: Credentials, target: impl Into<String>) -> Self {
        Self {
            credentials,
            target: target.into(),
            concurrency: default_concurrency(),
            hold_secs: default_hold_secs(),
            auto_hangup: default_auto_hangup(),
            answer_timeout_secs: None,
            connect_timeout_secs: default_connect_timeout_secs(),
            teardown_timeout_ms: default_teardown_timeout_ms(),
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_hold_secs(mut self, secs: u64) -> Self {
        self.hold_secs = secs;
        self
    }

    pub fn with_auto_hangup(mut self, auto_hangup: bool) -> Self {
        self.auto_hangup = auto_hangup;
        self
    }

    pub fn with_answer_timeout_secs(mut self, secs: Option<u64>) -> Self {
        self.answer_timeout_secs = secs;
        self
    }

    pub fn with_connect_timeout_secs(mut self, secs: u64) -> Self {
        self.connect_timeout_secs = secs;
        self
    }

    pub fn with_teardown_timeout_ms(mut self, ms: u64) -> Self {
        self.teardown_timeout_ms = ms;
        self
    }

    pub fn hold_duration(&self) -> Duration {
        Duration::from_secs(self.hold_secs)
    }

    pub fn answer_timeout(&self) -> Option<Duration> {
        self.answer_timeout_secs.map(Duration::from_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn teardown_timeout(&self) -> Duration {
        Duration::from_millis(self.teardown_timeout_ms)
    }

    /// Credentials with the load tester display name filled in
    pub fn attempt_credentials(&self) -> Credentials {
        let mut credentials = self.credentials.clone();
        if credentials.display_name.as_deref().map_or(true, str::is_empty) {
            credentials.display_name = Some(DEFAULT_DISPLAY_NAME.to_string());
        }
        credentials
    }

    /// Validate and return the parsed target
    pub fn validate(&self) -> LoadTestResult<SipUri> {
        self.credentials.validate()?;
        let target = SipUri::parse(&self.target)?;

        if self.concurrency > MAX_CONCURRENCY {
            return Err(LoadTestError::invalid_config(
                "concurrency",
                format!("{} exceeds the maximum of {}", self.concurrency, MAX_CONCURRENCY),
            ));
        }
        if self.connect_timeout_secs == 0 {
            return Err(LoadTestError::invalid_config("connect_timeout_secs", "must be greater than zero"));
        }
        if self.teardown_timeout_ms == 0 {
            return Err(LoadTestError::invalid_config("teardown_timeout_ms", "must be greater than zero"));
        }
        if self.answer_timeout_secs == Some(0) {
            return Err(LoadTestError::invalid_config("answer_timeout_secs", "must be greater than zero"));
        }
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sipconsole_client_core::ClientError;

    fn config() -> LoadTestConfig {
        LoadTestConfig::new(
            Credentials::new("sip:5001@pbx.local", "wss://pbx.local:7443", "5001", "pw"),
            "sip:1413@pbx.local",
        )
    }

    #[test]
    fn test_defaults() {
        let config = config();
        assert_eq!(config.concurrency, 10);
        assert_eq!(config.hold_duration(), Duration::from_secs(30));
        assert!(config.auto_hangup);
        assert_eq!(config.answer_timeout(), None);
        assert_eq!(config.teardown_timeout(), Duration::from_secs(5));
        assert_eq!(config.validate().unwrap().to_string(), "sip:1413@pbx.local");
    }

    #[test]
    fn test_validation() {
        assert!(matches!(
            config().with_concurrency(MAX_CONCURRENCY + 1).validate(),
            Err(LoadTestError::InvalidConfig { .. })
        ));
        tokio_test::assert_ok!(config().with_concurrency(0).validate());
        tokio_test::assert_err!(config().with_connect_timeout_secs(0).validate());
        assert!(config().with_teardown_timeout_ms(0).validate().is_err());
        assert!(config().with_answer_timeout_secs(Some(0)).validate().is_err());

        let bad_target = LoadTestConfig { target: "1413".into(), ..config() };
        assert!(matches!(
            bad_target.validate(),
            Err(LoadTestError::Client(ClientError::InvalidUri { .. }))
        ));
    }

    #[test]
    fn test_display_name_default() {
        assert_eq!(config().attempt_credentials().display_name.as_deref(), Some(DEFAULT_DISPLAY_NAME));

        let mut named = config();
        named.credentials = named.credentials.with_display_name("Night Shift");
        assert_eq!(named.attempt_credentials().display_name.as_deref(), Some("Night Shift"));
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let json = r#"{
            "credentials": {"uri": "sip:5001@pbx.local", "ws_servers": "ws://pbx.local", "auth_user": "5001", "password": "pw"},
            "target": "sip:1413@pbx.local",
            "concurrency": 3
        }"#;
        let config: LoadTestConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.concurrency, 3);
        assert_eq!(config.hold_secs, 30);
        assert!(config.auto_hangup);
        assert_eq!(config.teardown_timeout_ms, 5_000);
    }
}
