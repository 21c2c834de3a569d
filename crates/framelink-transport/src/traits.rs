use std::fmt;
use std::rc::Rc;

use serde_json::Value;

/// One inbound cross-frame event, as seen by the receiving window.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageEvent {
    /// Origin of the window that posted the event.
    pub origin: String,
    /// Structured-clone payload. Never trusted as typed on arrival.
    pub data: Value,
}

impl MessageEvent {
    pub fn new(origin: impl Into<String>, data: Value) -> Self {
        Self {
            origin: origin.into(),
            data,
        }
    }
}

/// Identifies a listener attached to a [`MessageSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// Callback invoked for every inbound event on a source.
pub type Listener = Rc<dyn Fn(&MessageEvent)>;

/// A window or frame that messages can be posted into.
///
/// Delivery is fire-and-forget: the call never fails from the caller's point
/// of view, and the transport may silently drop the event if the target is
/// gone or its origin does not match `target_origin`.
pub trait MessageTarget {
    fn post_message(&self, data: Value, target_origin: &str);
}

/// A window whose inbound message events can be observed.
pub trait MessageSource {
    /// Attach a listener for every inbound event.
    fn add_listener(&self, listener: Listener) -> ListenerId;

    /// Detach a listener. Returns `false` if it was not attached.
    fn remove_listener(&self, id: ListenerId) -> bool;
}

impl<T: MessageTarget + ?Sized> MessageTarget for Rc<T> {
    fn post_message(&self, data: Value, target_origin: &str) {
        (**self).post_message(data, target_origin)
    }
}

impl<T: MessageSource + ?Sized> MessageSource for Rc<T> {
    fn add_listener(&self, listener: Listener) -> ListenerId {
        (**self).add_listener(listener)
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        (**self).remove_listener(id)
    }
}
