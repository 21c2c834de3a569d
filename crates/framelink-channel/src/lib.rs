//! Channel-scoped messaging over a shared cross-frame transport.
//!
//! Every message carries an envelope with a channel id. One transport is
//! shared by every conversation in a window, so the channel id is the only
//! thing keeping independent frame sessions apart:
//! - [`SendChannel`] stamps outgoing messages with its channel id
//! - [`ReceiveChannel`] drops anything not addressed to its channel and routes
//!   the rest to handlers registered by message name

pub mod error;
pub mod message;
pub mod names;
pub mod receive;
pub mod send;

pub use error::{panic_message, ChannelError, Result};
pub use message::{ChannelId, Envelope, Message, MessageId};
pub use names::{catalog, direction_of, is_known, CatalogEntry, Direction};
pub use receive::{ErrorCallback, HandlerCallback, HandlerId, ReceiveChannel};
pub use send::{SendChannel, SendObserver};
