//! Typed payloads for every message of the wire catalog.
//!
//! Inbound payloads are schema-validated before they are deserialized into
//! these structs; outbound payloads are serialized from them.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::navigation::{normalize_path, NavigationPath, NextRequest, PathKind};

/// `peer.connect`: the guest's hello.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConnectPayload {
    pub channel: String,
}

/// `host.connect`: the host's hello-ack.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HostConnectPayload {
    pub channel_id: String,
}

/// `peer.navigated` and `host.navigate`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NavigatePayload {
    pub path: String,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<PathKind>,
}

impl NavigatePayload {
    pub fn to_path(&self) -> NavigationPath {
        NavigationPath {
            path: normalize_path(&self.path),
            params: self.params.clone(),
            kind: self.kind.unwrap_or_default(),
        }
    }
}

impl From<&NavigationPath> for NavigatePayload {
    fn from(path: &NavigationPath) -> Self {
        Self {
            path: path.path.clone(),
            params: path.params.clone(),
            kind: Some(path.kind),
        }
    }
}

/// The `navigation` member of the host auth messages.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Navigation {
    pub path: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, String>,
}

impl From<&NavigationPath> for Navigation {
    fn from(path: &NavigationPath) -> Self {
        Self {
            path: path.path.clone(),
            params: path.params.clone(),
        }
    }
}

impl From<&Navigation> for NavigationPath {
    fn from(navigation: &Navigation) -> Self {
        NavigationPath {
            path: normalize_path(&navigation.path),
            params: navigation.params.clone(),
            kind: PathKind::Guest,
        }
    }
}

/// `peer.set-title`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SetTitlePayload {
    pub title: String,
}

/// `peer.redirect`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RedirectPayload {
    pub url: String,
}

/// Path member of a `peer.logged-in` next request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WirePath {
    #[serde(rename = "type")]
    pub kind: PathKind,
    pub path: String,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WireNextRequest {
    pub path: WirePath,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl From<&WireNextRequest> for NextRequest {
    fn from(next: &WireNextRequest) -> Self {
        NextRequest {
            path: NavigationPath {
                path: normalize_path(&next.path.path),
                params: next.path.params.clone(),
                kind: next.path.kind,
            },
            label: next.label.clone(),
        }
    }
}

impl From<&NextRequest> for WireNextRequest {
    fn from(next: &NextRequest) -> Self {
        WireNextRequest {
            path: WirePath {
                kind: next.path.kind,
                path: next.path.path.clone(),
                params: next.path.params.clone(),
            },
            label: next.label.clone(),
        }
    }
}

/// `peer.logged-in`.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LoggedInPayload {
    pub token: String,
    pub expires: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_request: Option<WireNextRequest>,
}

/// `host.authenticated`.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthenticatedPayload {
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub navigation: Option<Navigation>,
}

/// `host.deauthenticated`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeauthenticatedPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub navigation: Option<Navigation>,
}

/// `host.authnavigate`.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthNavigatePayload {
    pub token: Option<String>,
    pub navigation: Navigation,
}

pub(crate) struct Redacted<'a>(pub(crate) Option<&'a str>);

impl fmt::Debug for Redacted<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(token) => write!(f, "<redacted:{} bytes>", token.len()),
            None => f.write_str("None"),
        }
    }
}

impl fmt::Debug for LoggedInPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggedInPayload")
            .field("token", &Redacted(Some(&self.token)))
            .field("expires", &self.expires)
            .field("next_request", &self.next_request)
            .finish()
    }
}

impl fmt::Debug for AuthenticatedPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticatedPayload")
            .field("token", &Redacted(Some(&self.token)))
            .field("navigation", &self.navigation)
            .finish()
    }
}

impl fmt::Debug for AuthNavigatePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthNavigatePayload")
            .field("token", &Redacted(self.token.as_deref()))
            .field("navigation", &self.navigation)
            .finish()
    }
}
