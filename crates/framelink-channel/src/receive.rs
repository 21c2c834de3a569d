use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use framelink_transport::{ListenerId, MessageEvent, MessageSource, Origin};
use tracing::{debug, trace, warn};

use crate::error::{panic_message, ChannelError, Result};
use crate::message::{ChannelId, Message};

/// Callback invoked for a matching message.
pub type HandlerCallback = Rc<dyn Fn(&Message) -> Result<()>>;

/// Callback invoked when a handler fails.
pub type ErrorCallback = Rc<dyn Fn(&ChannelError)>;

/// Identifies a registered handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

struct Registration {
    id: HandlerId,
    once: bool,
    callback: HandlerCallback,
    on_error: Option<ErrorCallback>,
}

#[derive(Default)]
struct ReceiveState {
    listener: Option<ListenerId>,
    handlers: HashMap<String, Vec<Registration>>,
    queue: VecDeque<Message>,
    draining: bool,
    next_handler_id: u64,
}

struct ReceiveInner {
    source: Rc<dyn MessageSource>,
    origin: Origin,
    channel: ChannelId,
    state: RefCell<ReceiveState>,
}

/// Receives messages addressed to one channel from one origin.
///
/// Inbound events that fail any filter (origin, shape, channel) are dropped
/// without error. Accepted messages are queued and drained in arrival order;
/// a message that arrives while another is being handled waits in the queue,
/// so handlers registered by the earlier callback still see it.
#[derive(Clone)]
pub struct ReceiveChannel {
    inner: Rc<ReceiveInner>,
}

impl ReceiveChannel {
    pub fn new(source: Rc<dyn MessageSource>, origin: Origin, channel: ChannelId) -> Self {
        Self {
            inner: Rc::new(ReceiveInner {
                source,
                origin,
                channel,
                state: RefCell::new(ReceiveState::default()),
            }),
        }
    }

    /// Attach to the source window. Starting twice is a no-op.
    pub fn start(&self) {
        if self.inner.state.borrow().listener.is_some() {
            debug!(channel = %self.inner.channel, "receive channel already started");
            return;
        }

        let weak: Weak<ReceiveInner> = Rc::downgrade(&self.inner);
        let listener_id = self.inner.source.add_listener(Rc::new(move |event: &MessageEvent| {
            if let Some(inner) = weak.upgrade() {
                inner.accept(event);
            }
        }));
        self.inner.state.borrow_mut().listener = Some(listener_id);
        debug!(channel = %self.inner.channel, origin = %self.inner.origin, "receive channel started");
    }

    /// Detach from the source and drop every handler and queued message.
    pub fn stop(&self) {
        let listener = {
            let mut state = self.inner.state.borrow_mut();
            state.handlers.clear();
            state.queue.clear();
            state.listener.take()
        };

        match listener {
            Some(id) => {
                self.inner.source.remove_listener(id);
                debug!(channel = %self.inner.channel, "receive channel stopped");
            }
            None => warn!(channel = %self.inner.channel, "stop called on a receive channel that is not started"),
        }
    }

    pub fn is_started(&self) -> bool {
        self.inner.state.borrow().listener.is_some()
    }

    /// Register a persistent handler for `name`.
    pub fn on<F>(&self, name: &str, callback: F) -> HandlerId
    where
        F: Fn(&Message) -> Result<()> + 'static,
    {
        self.register(name, false, Rc::new(callback), None)
    }

    /// Register a persistent handler with its own error callback.
    pub fn on_with_error<F, E>(&self, name: &str, callback: F, on_error: E) -> HandlerId
    where
        F: Fn(&Message) -> Result<()> + 'static,
        E: Fn(&ChannelError) + 'static,
    {
        self.register(name, false, Rc::new(callback), Some(Rc::new(on_error)))
    }

    /// Register a handler that is removed after its first invocation.
    pub fn once<F>(&self, name: &str, callback: F) -> HandlerId
    where
        F: Fn(&Message) -> Result<()> + 'static,
    {
        self.register(name, true, Rc::new(callback), None)
    }

    /// Register a one-shot handler with its own error callback.
    pub fn once_with_error<F, E>(&self, name: &str, callback: F, on_error: E) -> HandlerId
    where
        F: Fn(&Message) -> Result<()> + 'static,
        E: Fn(&ChannelError) + 'static,
    {
        self.register(name, true, Rc::new(callback), Some(Rc::new(on_error)))
    }

    /// Remove a handler. Returns `false` if it was not registered.
    pub fn off(&self, id: HandlerId) -> bool {
        let mut state = self.inner.state.borrow_mut();
        let mut removed = false;
        for registrations in state.handlers.values_mut() {
            let before = registrations.len();
            registrations.retain(|registration| registration.id != id);
            removed |= registrations.len() != before;
        }
        state.handlers.retain(|_, registrations| !registrations.is_empty());
        removed
    }

    /// Number of handlers currently registered for `name`.
    pub fn handler_count(&self, name: &str) -> usize {
        self.inner
            .state
            .borrow()
            .handlers
            .get(name)
            .map_or(0, Vec::len)
    }

    pub fn channel(&self) -> &ChannelId {
        &self.inner.channel
    }

    pub fn origin(&self) -> &Origin {
        &self.inner.origin
    }

    fn register(
        &self,
        name: &str,
        once: bool,
        callback: HandlerCallback,
        on_error: Option<ErrorCallback>,
    ) -> HandlerId {
        let mut state = self.inner.state.borrow_mut();
        state.next_handler_id += 1;
        let id = HandlerId(state.next_handler_id);
        state
            .handlers
            .entry(name.to_string())
            .or_default()
            .push(Registration {
                id,
                once,
                callback,
                on_error,
            });
        id
    }
}

impl ReceiveInner {
    fn accept(&self, event: &MessageEvent) {
        if !self.origin.matches(&event.origin) {
            trace!(origin = %event.origin, expected = %self.origin, "ignoring event from foreign origin");
            return;
        }
        let Some(message) = Message::from_value(&event.data) else {
            trace!("ignoring event that is not a channel message");
            return;
        };
        if message.channel() != &self.channel {
            trace!(
                channel = %message.channel(),
                expected = %self.channel,
                "ignoring message for another channel"
            );
            return;
        }

        {
            let mut state = self.state.borrow_mut();
            state.queue.push_back(message);
            if state.draining {
                // The outer drain loop picks it up after the current message.
                return;
            }
            state.draining = true;
        }

        self.drain();
    }

    fn drain(&self) {
        loop {
            let next = {
                let mut state = self.state.borrow_mut();
                match state.queue.pop_front() {
                    Some(message) => message,
                    None => {
                        state.draining = false;
                        return;
                    }
                }
            };
            self.dispatch(&next);
        }
    }

    fn dispatch(&self, message: &Message) {
        // Snapshot outside the borrow: handlers may register, remove or stop.
        let snapshot: Vec<(HandlerCallback, Option<ErrorCallback>)> = {
            let mut state = self.state.borrow_mut();
            let Some(registrations) = state.handlers.get_mut(&message.name) else {
                warn!(
                    message_name = %message.name,
                    channel = %self.channel,
                    "no handlers registered for message; dropping"
                );
                return;
            };

            let snapshot: Vec<_> = registrations
                .iter()
                .map(|registration| {
                    (
                        Rc::clone(&registration.callback),
                        registration.on_error.clone(),
                    )
                })
                .collect();
            registrations.retain(|registration| !registration.once);
            if registrations.is_empty() {
                state.handlers.remove(&message.name);
            }
            snapshot
        };

        trace!(message_name = %message.name, handlers = snapshot.len(), "dispatching message");

        for (callback, on_error) in snapshot {
            let outcome = match catch_unwind(AssertUnwindSafe(|| callback(message))) {
                Ok(outcome) => outcome,
                Err(panic) => Err(ChannelError::HandlerPanicked {
                    name: message.name.clone(),
                    message: panic_message(&*panic),
                }),
            };

            if let Err(err) = outcome {
                match on_error {
                    Some(on_error) => {
                        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| on_error(&err))) {
                            warn!(
                                message_name = %message.name,
                                "error callback panicked: {}",
                                panic_message(&*panic)
                            );
                        }
                    }
                    None => warn!(message_name = %message.name, error = %err, "message handler failed"),
                }
            }
        }
    }
}

impl fmt::Debug for ReceiveChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("ReceiveChannel")
            .field("origin", &self.inner.origin)
            .field("channel", &self.inner.channel)
            .field("started", &state.listener.is_some())
            .field("handled_names", &state.handlers.len())
            .field("queued", &state.queue.len())
            .finish()
    }
}
