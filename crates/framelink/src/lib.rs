//! Channel-scoped messaging between a host application and an embedded frame.
//!
//! framelink keeps a host page and the independently deployed application in
//! its frame synchronized over the cross-frame message primitive: handshake,
//! navigation, page title and authentication state.
//!
//! # Crate Structure
//!
//! - [`transport`]: Message bus capability, origins, in-process simulated bus
//! - [`channel`]: Message envelope, wire catalog, send and receive channels
//! - [`schema`]: JSON Schema validation of inbound payloads (behind `schema` feature)
//! - [`peer`]: Connection state machine, timeout monitor, frame orchestrator (behind `peer` feature)

/// Re-export transport types.
pub mod transport {
    pub use framelink_transport::*;
}

/// Re-export channel types.
pub mod channel {
    pub use framelink_channel::*;
}

/// Re-export schema types (requires `schema` feature).
#[cfg(feature = "schema")]
pub mod schema {
    pub use framelink_schema::*;
}

/// Re-export peer types (requires `peer` feature).
#[cfg(feature = "peer")]
pub mod peer {
    pub use framelink_peer::*;
}
