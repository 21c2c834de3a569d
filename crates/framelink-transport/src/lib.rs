//! Cross-frame message bus abstraction.
//!
//! Models the one primitive two frames share: discrete, fire-and-forget
//! messages tagged with the sender's origin. Nothing above this layer touches
//! a global window; it receives a [`MessageTarget`] to post into and a
//! [`MessageSource`] to listen on.
//!
//! [`LocalBus`] is a deterministic in-process implementation: windows opened on
//! the same bus exchange queued events that are delivered when the bus is run.

pub mod error;
pub mod local;
pub mod origin;
pub mod traits;

pub use error::{Result, TransportError};
pub use local::{LocalBus, LocalWindow, WindowProxy, MAX_DELIVERIES_PER_RUN};
pub use origin::{Origin, WILDCARD_ORIGIN};
pub use traits::{Listener, ListenerId, MessageEvent, MessageSource, MessageTarget};
