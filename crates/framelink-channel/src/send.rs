use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use framelink_transport::{MessageTarget, Origin};
use serde_json::Value;
use tracing::{trace, warn};

use crate::error::panic_message;
use crate::message::{ChannelId, Message, MessageId};

/// Diagnostic hook invoked with every sent message.
pub type SendObserver = Rc<dyn Fn(&Message)>;

/// Sends channel-stamped messages to one target window.
///
/// No acknowledgement, retry or queuing: if the target frame is gone the
/// transport drops the message and the sender never finds out.
#[derive(Clone)]
pub struct SendChannel {
    target: Rc<dyn MessageTarget>,
    origin: Origin,
    channel: ChannelId,
    observer: Option<SendObserver>,
}

impl SendChannel {
    /// Create a send channel for `target`, restricted to `origin`.
    pub fn new(target: Rc<dyn MessageTarget>, origin: Origin, channel: ChannelId) -> Self {
        Self {
            target,
            origin,
            channel,
            observer: None,
        }
    }

    /// Attach a diagnostic observer.
    pub fn with_observer(mut self, observer: SendObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Send a message. Always succeeds from the caller's point of view.
    pub fn send(&self, name: &str, payload: Value) -> MessageId {
        let message = Message::new(name, payload, self.channel.clone());
        trace!(
            message_name = name,
            channel = %self.channel,
            id = %message.id(),
            "sending message"
        );
        self.target
            .post_message(message.to_value(), self.origin.as_str());

        if let Some(observer) = &self.observer {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| observer(&message))) {
                warn!(
                    message_name = name,
                    "send observer panicked: {}",
                    panic_message(&*panic)
                );
            }
        }

        message.envelope.id
    }

    pub fn channel(&self) -> &ChannelId {
        &self.channel
    }

    pub fn origin(&self) -> &Origin {
        &self.origin
    }
}

impl fmt::Debug for SendChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendChannel")
            .field("origin", &self.origin)
            .field("channel", &self.channel)
            .field("observed", &self.observer.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use framelink_transport::{LocalBus, MessageEvent, MessageSource};
    use serde_json::json;

    use super::*;

    #[test]
    fn send_stamps_channel_and_posts_to_origin() {
        let bus = LocalBus::new();
        let host = bus.open_window("https://host.test");
        let frame = bus.open_window("https://guest.test");

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        frame.add_listener(Rc::new(move |event: &MessageEvent| {
            sink.borrow_mut().push(event.clone())
        }));

        let channel = SendChannel::new(
            Rc::new(frame.proxy_from(&host)),
            Origin::parse("https://guest.test").unwrap(),
            ChannelId::new("chan-1"),
        );
        let id = channel.send("host.navigate", json!({"path": "x"}));
        bus.run_until_idle();

        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].origin, "https://host.test");
        let message = Message::from_value(&seen[0].data).unwrap();
        assert_eq!(message.name, "host.navigate");
        assert_eq!(message.channel().as_str(), "chan-1");
        assert_eq!(message.id(), &id);
        assert_eq!(message.payload, json!({"path": "x"}));
    }

    #[test]
    fn wrong_origin_is_silently_dropped() {
        let bus = LocalBus::new();
        let host = bus.open_window("https://host.test");
        let frame = bus.open_window("https://guest.test");

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        frame.add_listener(Rc::new(move |event: &MessageEvent| {
            sink.borrow_mut().push(event.clone())
        }));

        let channel = SendChannel::new(
            Rc::new(frame.proxy_from(&host)),
            Origin::parse("https://other.test").unwrap(),
            ChannelId::new("chan-1"),
        );
        channel.send("host.navigate", json!({}));
        assert_eq!(bus.run_until_idle(), 1);
        assert!(seen.borrow().is_empty());
        assert_eq!(bus.pending(), 0);
    }

    #[test]
    fn observer_sees_messages_and_panics_do_not_block_delivery() {
        let bus = LocalBus::new();
        let host = bus.open_window("https://host.test");
        let frame = bus.open_window("https://guest.test");

        let observed = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&observed);
        let channel = SendChannel::new(
            Rc::new(frame.proxy_from(&host)),
            Origin::wildcard(),
            ChannelId::new("chan-1"),
        )
        .with_observer(Rc::new(move |message: &Message| {
            sink.borrow_mut().push(message.name.clone());
            if message.name == "host.deauthenticated" {
                panic!("observer failure");
            }
        }));

        channel.send("host.deauthenticated", json!({}));
        channel.send("host.navigate", json!({}));

        assert_eq!(bus.pending(), 2);
        assert_eq!(
            *observed.borrow(),
            vec!["host.deauthenticated".to_string(), "host.navigate".to_string()]
        );
    }
}
