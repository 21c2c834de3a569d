//! Schemas for every guest→host message of the wire catalog.

use framelink_channel::names::{
    PEER_CONNECT, PEER_CONNECTED, PEER_LOGGED_IN, PEER_LOGOUT, PEER_NAVIGATED, PEER_REDIRECT,
    PEER_SET_TITLE,
};

const PEER_CONNECT_SCHEMA: &str = r#"{
    "type": "object",
    "properties": {
        "channel": { "type": "string", "minLength": 1 }
    },
    "required": ["channel"]
}"#;

const EMPTY_SCHEMA: &str = r#"{
    "type": ["object", "null"]
}"#;

const PEER_NAVIGATED_SCHEMA: &str = r#"{
    "type": "object",
    "properties": {
        "path": { "type": "string" },
        "params": {
            "type": "object",
            "additionalProperties": { "type": "string" }
        },
        "kind": { "enum": ["host", "guest"] }
    },
    "required": ["path", "params"]
}"#;

const PEER_SET_TITLE_SCHEMA: &str = r#"{
    "type": "object",
    "properties": {
        "title": { "type": "string" }
    },
    "required": ["title"]
}"#;

const PEER_REDIRECT_SCHEMA: &str = r#"{
    "type": "object",
    "properties": {
        "url": { "type": "string", "minLength": 1 }
    },
    "required": ["url"]
}"#;

const PEER_LOGGED_IN_SCHEMA: &str = r#"{
    "type": "object",
    "properties": {
        "token": { "type": "string", "minLength": 1 },
        "expires": { "type": "number" },
        "nextRequest": {
            "type": "object",
            "properties": {
                "path": {
                    "type": "object",
                    "properties": {
                        "type": { "enum": ["host", "guest", "europaui"] },
                        "path": { "type": "string" },
                        "params": {
                            "type": "object",
                            "additionalProperties": { "type": "string" }
                        }
                    },
                    "required": ["type", "path"]
                },
                "label": { "type": "string" }
            },
            "required": ["path"]
        }
    },
    "required": ["token", "expires"]
}"#;

/// `(message name, schema source)` for every inbound message.
pub const BUILTIN_SCHEMAS: [(&str, &str); 7] = [
    (PEER_CONNECT, PEER_CONNECT_SCHEMA),
    (PEER_CONNECTED, EMPTY_SCHEMA),
    (PEER_NAVIGATED, PEER_NAVIGATED_SCHEMA),
    (PEER_SET_TITLE, PEER_SET_TITLE_SCHEMA),
    (PEER_LOGOUT, EMPTY_SCHEMA),
    (PEER_REDIRECT, PEER_REDIRECT_SCHEMA),
    (PEER_LOGGED_IN, PEER_LOGGED_IN_SCHEMA),
];
