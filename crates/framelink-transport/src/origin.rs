use std::fmt;
use std::str::FromStr;

use crate::error::{Result, TransportError};

/// Target origin that matches any receiving window.
pub const WILDCARD_ORIGIN: &str = "*";

const MAX_ORIGIN_LEN: usize = 2048;

/// A validated web origin: `scheme://host[:port]`, or the wildcard `*`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Origin(String);

impl Origin {
    /// Parse and validate an origin string.
    ///
    /// Trailing slashes are not part of an origin and are rejected along with
    /// any path, query or fragment.
    pub fn parse(input: &str) -> Result<Self> {
        if input == WILDCARD_ORIGIN {
            return Ok(Self::wildcard());
        }
        if input.is_empty() || input.len() > MAX_ORIGIN_LEN {
            return Err(invalid(input, format!("invalid length {}", input.len())));
        }

        let (scheme, rest) = input
            .split_once("://")
            .ok_or_else(|| invalid(input, "missing '://' separator"))?;

        if scheme.is_empty()
            || !scheme.starts_with(|c: char| c.is_ascii_alphabetic())
            || !scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        {
            return Err(invalid(input, format!("invalid scheme '{scheme}'")));
        }

        if rest.contains(['/', '?', '#']) {
            return Err(invalid(input, "origin must not carry a path, query or fragment"));
        }

        let (host, port) = if rest.starts_with('[') {
            let close = rest
                .find(']')
                .ok_or_else(|| invalid(input, "unterminated IPv6 host"))?;
            let after = &rest[close + 1..];
            let port = match after {
                "" => None,
                _ => Some(
                    after
                        .strip_prefix(':')
                        .ok_or_else(|| invalid(input, "unexpected text after IPv6 host"))?,
                ),
            };
            (&rest[..=close], port)
        } else {
            match rest.split_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (rest, None),
            }
        };

        if let Some(port) = port {
            port.parse::<u16>()
                .map_err(|_| invalid(input, format!("invalid port '{port}'")))?;
        }

        if host.is_empty() {
            return Err(invalid(input, "missing host"));
        }

        Ok(Self(input.to_ascii_lowercase()))
    }

    /// The wildcard origin.
    pub fn wildcard() -> Self {
        Self(WILDCARD_ORIGIN.to_string())
    }

    pub fn is_wildcard(&self) -> bool {
        self.0 == WILDCARD_ORIGIN
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether an event origin is acceptable for this origin.
    ///
    /// The wildcard accepts everything; otherwise the comparison is exact
    /// (case-insensitive on the scheme and host).
    pub fn matches(&self, event_origin: &str) -> bool {
        self.is_wildcard() || self.0.eq_ignore_ascii_case(event_origin)
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Origin {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl AsRef<str> for Origin {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn invalid(origin: &str, reason: impl Into<String>) -> TransportError {
    TransportError::InvalidOrigin {
        origin: origin.to_string(),
        reason: reason.into(),
    }
}
