//! SIP URI validation
//!
//! This is address validation for user input (the equivalent of a
//! `makeURI` helper), not a SIP message parser. It accepts the
//! `sip:`/`sips:` forms a console user types and keeps any trailing
//! parameters verbatim so they reach the signaling library untouched.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};

/// URI scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scheme {
    Sip,
    Sips,
}

impl Scheme {
    fn as_str(&self) -> &'static str {
        match self {
            Scheme::Sip => "sip",
            Scheme::Sips => "sips",
        }
    }
}

/// A validated SIP or SIPS URI
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SipUri {
    scheme: Scheme,
    user: Option<String>,
    host: String,
    port: Option<u16>,
    /// Everything from the first `;` or `?`, kept as typed
    suffix: String,
}

impl SipUri {
    /// Parse and validate a SIP URI such as `sip:1001@pbx.example.com:5060;transport=ws`
    pub fn parse(input: &str) -> ClientResult<Self> {
        let raw = input.trim();
        let raw = raw.strip_prefix('<').and_then(|s| s.strip_suffix('>')).unwrap_or(raw);

        let (scheme, rest) = match raw.split_once(':') {
            Some((s, rest)) if s.eq_ignore_ascii_case("sip") => (Scheme::Sip, rest),
            Some((s, rest)) if s.eq_ignore_ascii_case("sips") => (Scheme::Sips, rest),
            _ => return Err(ClientError::invalid_uri(input, "missing sip: or sips: scheme")),
        };

        let split_at = rest.find(|c: char| c == ';' || c == '?').unwrap_or(rest.len());
        let (address, suffix) = rest.split_at(split_at);

        let (user, hostport) = match address.rsplit_once('@') {
            Some((user, hostport)) => {
                if user.is_empty() {
                    return Err(ClientError::invalid_uri(input, "empty user part"));
                }
                (Some(user.to_string()), hostport)
            }
            None => (None, address),
        };

        let (host, port) = split_host_port(hostport).map_err(|reason| ClientError::invalid_uri(input, reason))?;

        Ok(Self {
            scheme,
            user,
            host,
            port,
            suffix: suffix.to_string(),
        })
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// `user@host` without scheme, port or parameters
    pub fn address_of_record(&self) -> String {
        match &self.user {
            Some(user) => format!("{}@{}", user, self.host),
            None => self.host.clone(),
        }
    }
}

fn split_host_port(hostport: &str) -> Result<(String, Option<u16>), String> {
    if hostport.is_empty() {
        return Err("empty host".to_string());
    }

    // IPv6 reference: [::1]:5060
    if let Some(rest) = hostport.strip_prefix('[') {
        let (host, after) = rest.split_once(']').ok_or_else(|| "unterminated IPv6 reference".to_string())?;
        if host.is_empty() {
            return Err("empty host".to_string());
        }
        let port = match after {
            "" => None,
            p => Some(parse_port(p.strip_prefix(':').ok_or_else(|| format!("unexpected '{}' after host", p))?)?),
        };
        return Ok((format!("[{}]", host), port));
    }

    let (host, port) = match hostport.rsplit_once(':') {
        Some((host, port)) => (host, Some(parse_port(port)?)),
        None => (hostport, None),
    };

    if host.is_empty() {
        return Err("empty host".to_string());
    }
    if let Some(bad) = host.chars().find(|&c: &char| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))) {
        return Err(format!("invalid character '{}' in host", bad));
    }

    Ok((host.to_string(), port))
}

fn parse_port(port: &str) -> Result<u16, String> {
    match port.parse::<u16>() {
        Ok(0) | Err(_) => Err(format!("invalid port '{}'", port)),
        Ok(p) => Ok(p),
    }
}

impl fmt::Display for SipUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.scheme.as_str())?;
        if let Some(user) = &self.user {
            write!(f, "{}@", user)?;
        }
        write!(f, "{}", self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        write!(f, "{}", self.suffix)
    }
}

impl FromStr for SipUri {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for SipUri {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SipUri {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        SipUri::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Extract the host following `@` in a loosely formatted URI string.
///
/// Falls back to `localhost` when no host can be found.
pub fn host_from_uri(uri: &str) -> String {
    uri.split_once('@')
        .map(|(_, rest)| rest.split(|c: char| matches!(c, ';' | ':' | '>')).next().unwrap_or(""))
        .filter(|host| !host.is_empty())
        .unwrap_or("localhost")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_uri() {
        let uri = SipUri::parse("sip:1001@192.168.2.200:5060;transport=ws").unwrap();
        assert_eq!(uri.scheme(), Scheme::Sip);
        assert_eq!(uri.user(), Some("1001"));
        assert_eq!(uri.host(), "192.168.2.200");
        assert_eq!(uri.port(), Some(5060));
        assert_eq!(uri.to_string(), "sip:1001@192.168.2.200:5060;transport=ws");
        assert_eq!(uri.address_of_record(), "1001@192.168.2.200");
    }

    #[test]
    fn test_parse_variants() {
        assert_eq!(SipUri::parse("SIPS:alice@example.com").unwrap().scheme(), Scheme::Sips);
        assert_eq!(SipUri::parse("<sip:bob@example.com>").unwrap().host(), "example.com");
        assert_eq!(SipUri::parse("sip:example.com").unwrap().user(), None);

        let v6 = SipUri::parse("sip:carol@[2001:db8::1]:5080").unwrap();
        assert_eq!(v6.host(), "[2001:db8::1]");
        assert_eq!(v6.port(), Some(5080));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for bad in ["", "bob@example.com", "http://example.com", "sip:", "sip:@host", "sip:bob@", "sip:bob@host:99999", "sip:bob@ho st"] {
            assert!(
                matches!(SipUri::parse(bad), Err(ClientError::InvalidUri { .. })),
                "{:?} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_serde_as_string() {
        let uri: SipUri = serde_json::from_str("\"sip:1413@192.168.2.200\"").unwrap();
        assert_eq!(serde_json::to_string(&uri).unwrap(), "\"sip:1413@192.168.2.200\"");
        assert!(serde_json::from_str::<SipUri>("\"1413\"").is_err());
    }

    #[test]
    fn test_host_from_uri() {
        assert_eq!(host_from_uri("sip:5001@192.168.2.200"), "192.168.2.200");
        assert_eq!(host_from_uri("sip:5001@pbx.local:5060"), "pbx.local");
        assert_eq!(host_from_uri("<sip:5001@pbx.local>"), "pbx.local");
        assert_eq!(host_from_uri("no-at-sign"), "localhost");
    }
}
