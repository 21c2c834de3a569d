//! Wire message catalog.
//!
//! `peer.*` messages travel from the embedded guest to the host; `host.*`
//! messages travel the other way. The handshake is `peer.connect` →
//! `host.connect` → `peer.connected`.

use std::fmt;

use serde::Serialize;

/// Guest greets the host on the channel it was given at frame creation.
pub const PEER_CONNECT: &str = "peer.connect";
/// Guest confirms it received the host's acknowledgement.
pub const PEER_CONNECTED: &str = "peer.connected";
/// Host acknowledges the greeting and names the channel to use.
pub const HOST_CONNECT: &str = "host.connect";

/// Guest navigated internally.
pub const PEER_NAVIGATED: &str = "peer.navigated";
/// Guest changed its document title.
pub const PEER_SET_TITLE: &str = "peer.set-title";
/// Guest user logged out.
pub const PEER_LOGOUT: &str = "peer.logout";
/// Guest asks the host to leave the embedding context.
pub const PEER_REDIRECT: &str = "peer.redirect";
/// Guest user logged in.
pub const PEER_LOGGED_IN: &str = "peer.logged-in";

/// Host asks the guest to navigate.
pub const HOST_NAVIGATE: &str = "host.navigate";
/// Host session became authenticated.
pub const HOST_AUTHENTICATED: &str = "host.authenticated";
/// Host session lost its authentication.
pub const HOST_DEAUTHENTICATED: &str = "host.deauthenticated";
/// First message after connecting: auth state and location together.
pub const HOST_AUTHNAVIGATE: &str = "host.authnavigate";

/// Which way a message travels across the frame boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Direction {
    GuestToHost,
    HostToGuest,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::GuestToHost => f.write_str("guest→host"),
            Direction::HostToGuest => f.write_str("host→guest"),
        }
    }
}

/// One row of the wire catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CatalogEntry {
    pub name: &'static str,
    pub direction: Direction,
    pub payload: &'static str,
}

const CATALOG: [CatalogEntry; 12] = [
    entry(PEER_CONNECT, Direction::GuestToHost, "{ channel: string }"),
    entry(PEER_CONNECTED, Direction::GuestToHost, "{}"),
    entry(HOST_CONNECT, Direction::HostToGuest, "{ channelId: string }"),
    entry(
        PEER_NAVIGATED,
        Direction::GuestToHost,
        "{ path: string, params: map<string,string>, kind?: \"host\"|\"guest\" }",
    ),
    entry(PEER_SET_TITLE, Direction::GuestToHost, "{ title: string }"),
    entry(PEER_LOGOUT, Direction::GuestToHost, "{}"),
    entry(PEER_REDIRECT, Direction::GuestToHost, "{ url: string }"),
    entry(
        PEER_LOGGED_IN,
        Direction::GuestToHost,
        "{ token: string, expires: number, nextRequest?: { path: { type, path, params? }, label? } }",
    ),
    entry(
        HOST_NAVIGATE,
        Direction::HostToGuest,
        "{ path: string, params?: map<string,string> }",
    ),
    entry(
        HOST_AUTHENTICATED,
        Direction::HostToGuest,
        "{ token: string, navigation?: { path, params? } }",
    ),
    entry(
        HOST_DEAUTHENTICATED,
        Direction::HostToGuest,
        "{ navigation?: { path, params? } }",
    ),
    entry(
        HOST_AUTHNAVIGATE,
        Direction::HostToGuest,
        "{ token: string|null, navigation: { path, params? } }",
    ),
];

const fn entry(name: &'static str, direction: Direction, payload: &'static str) -> CatalogEntry {
    CatalogEntry {
        name,
        direction,
        payload,
    }
}

/// Every message name this protocol defines.
pub fn catalog() -> &'static [CatalogEntry] {
    &CATALOG
}

/// Direction of a known message name.
pub fn direction_of(name: &str) -> Option<Direction> {
    CATALOG
        .iter()
        .find(|entry| entry.name == name)
        .map(|entry| entry.direction)
}

/// Returns true if the name is part of the wire catalog.
pub fn is_known(name: &str) -> bool {
    direction_of(name).is_some()
}
