use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Default port of a Bedrock server
pub const DEFAULT_BEDROCK_PORT: u16 = 19132;

/// Default port of a Java server (used for mapping keys)
pub const DEFAULT_JAVA_PORT: u16 = 25565;

/// Address parsing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DestinationError {
    #[error("host must not be blank")]
    EmptyHost,

    #[error("host contains whitespace: {0:?}")]
    InvalidHost(String),

    #[error("invalid port {port:?} in {input:?}")]
    InvalidPort { port: String, input: String },

    #[error("port {0} out of range 1-65535")]
    PortOutOfRange(i64),

    #[error("unclosed IPv6 bracket in {0:?}")]
    UnclosedBracket(String),

    #[error("malformed address {0:?}")]
    Malformed(String),
}

/// A concrete host/port pair a client can be sent to.
///
/// Hosts are stored lowercased, so two destinations naming the same endpoint
/// compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Destination {
    host: String,
    port: u16,
}

impl Destination {
    pub fn new(host: impl AsRef<str>, port: u16) -> Result<Self, DestinationError> {
        let host = host.as_ref().trim();
        if host.is_empty() {
            return Err(DestinationError::EmptyHost);
        }
        if host.chars().any(char::is_whitespace) {
            return Err(DestinationError::InvalidHost(host.to_string()));
        }
        let port = check_port(i64::from(port))?;

        Ok(Self {
            host: host.to_ascii_lowercase(),
            port,
        })
    }

    /// Parse `host`, `host:port`, `[ipv6]`, `[ipv6]:port` or a bare IPv6
    /// literal. A missing port falls back to `default_port`.
    pub fn parse(input: &str, default_port: u16) -> Result<Self, DestinationError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(DestinationError::EmptyHost);
        }

        if let Some(rest) = input.strip_prefix('[') {
            let close = rest
                .find(']')
                .ok_or_else(|| DestinationError::UnclosedBracket(input.to_string()))?;
            let host = &rest[..close];
            let tail = &rest[close + 1..];
            let port = match tail.strip_prefix(':') {
                Some(raw) => parse_port(raw, input)?,
                None if tail.is_empty() => default_port,
                None => return Err(DestinationError::Malformed(input.to_string())),
            };
            return Self::new(host, port);
        }

        match input.matches(':').count() {
            0 => Self::new(input, default_port),
            1 => {
                let (host, raw) = input
                    .split_once(':')
                    .ok_or_else(|| DestinationError::Malformed(input.to_string()))?;
                Self::new(host, parse_port(raw, input)?)
            }
            // Unbracketed IPv6 literal, no port
            _ => Self::new(input, default_port),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Validate a raw port number
pub fn check_port(port: i64) -> Result<u16, DestinationError> {
    if (1..=65535).contains(&port) {
        Ok(port as u16)
    } else {
        Err(DestinationError::PortOutOfRange(port))
    }
}

fn parse_port(raw: &str, input: &str) -> Result<u16, DestinationError> {
    let port: i64 = raw
        .trim()
        .parse()
        .map_err(|_| DestinationError::InvalidPort {
            port: raw.to_string(),
            input: input.to_string(),
        })?;
    check_port(port)
}
