//! Guest-side counterpart of [`Connection`](crate::Connection).
//!
//! Speaks the same protocol from inside the frame. Used to drive host-side
//! sessions in tests and in the simulator.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use framelink_channel::names::{
    catalog, Direction, HOST_CONNECT, PEER_CONNECT, PEER_CONNECTED, PEER_LOGGED_IN, PEER_LOGOUT,
    PEER_NAVIGATED, PEER_REDIRECT, PEER_SET_TITLE,
};
use framelink_channel::{ChannelId, Message, MessageId, ReceiveChannel, SendChannel, SendObserver};
use framelink_transport::{MessageSource, MessageTarget, Origin};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::host::channel_from_frame_url;
use crate::navigation::{NavigationPath, NextRequest};
use crate::payload::{
    ConnectPayload, HostConnectPayload, LoggedInPayload, NavigatePayload, RedirectPayload,
    SetTitlePayload, WireNextRequest,
};

struct GuestInner {
    send: SendChannel,
    receive: ReceiveChannel,
    silent: bool,
    connected: Cell<bool>,
    received: RefCell<Vec<Message>>,
}

/// Simulated embedded application.
#[derive(Clone)]
pub struct GuestPeer {
    inner: Rc<GuestInner>,
}

impl GuestPeer {
    /// `target` posts into the host window; `source` is the frame's own window.
    pub fn new(
        target: Rc<dyn MessageTarget>,
        source: Rc<dyn MessageSource>,
        host_origin: Origin,
        channel: ChannelId,
    ) -> Self {
        Self::builder(target, source, host_origin, channel).build()
    }

    pub fn builder(
        target: Rc<dyn MessageTarget>,
        source: Rc<dyn MessageSource>,
        host_origin: Origin,
        channel: ChannelId,
    ) -> GuestBuilder {
        GuestBuilder {
            target,
            source,
            host_origin,
            channel,
            observer: None,
            silent: false,
        }
    }

    /// Take the channel from the `channelId` parameter of the frame URL.
    pub fn from_frame_url(
        url: &str,
        target: Rc<dyn MessageTarget>,
        source: Rc<dyn MessageSource>,
        host_origin: Origin,
    ) -> Option<GuestBuilder> {
        let channel = channel_from_frame_url(url)?;
        Some(Self::builder(target, source, host_origin, channel))
    }

    /// Listen for host messages and, unless silent, send the hello.
    pub fn start(&self) {
        let receive = &self.inner.receive;
        for entry in catalog()
            .iter()
            .filter(|entry| entry.direction == Direction::HostToGuest)
        {
            let weak = Rc::downgrade(&self.inner);
            receive.on(entry.name, move |message: &Message| {
                if let Some(inner) = weak.upgrade() {
                    inner.record(message);
                }
                Ok(())
            });
        }
        receive.start();

        if self.inner.silent {
            debug!(channel = %self.channel(), "silent guest; not greeting host");
            return;
        }
        self.inner.send_payload(
            PEER_CONNECT,
            &ConnectPayload {
                channel: self.channel().to_string(),
            },
        );
    }

    pub fn stop(&self) {
        self.inner.receive.stop();
    }

    pub fn channel(&self) -> &ChannelId {
        self.inner.send.channel()
    }

    /// Whether the host answered the hello.
    pub fn is_connected(&self) -> bool {
        self.inner.connected.get()
    }

    /// Every host message received so far, in arrival order.
    pub fn received(&self) -> Vec<Message> {
        self.inner.received.borrow().clone()
    }

    pub fn received_names(&self) -> Vec<String> {
        self.inner
            .received
            .borrow()
            .iter()
            .map(|message| message.name.clone())
            .collect()
    }

    pub fn take_received(&self) -> Vec<Message> {
        self.inner.received.take()
    }

    pub fn navigated(&self, path: &NavigationPath) -> MessageId {
        self.inner
            .send_payload(PEER_NAVIGATED, &NavigatePayload::from(path))
    }

    pub fn set_title(&self, title: &str) -> MessageId {
        self.inner.send_payload(
            PEER_SET_TITLE,
            &SetTitlePayload {
                title: title.to_string(),
            },
        )
    }

    pub fn logout(&self) -> MessageId {
        self.inner.send.send(PEER_LOGOUT, json!({}))
    }

    pub fn redirect(&self, url: &str) -> MessageId {
        self.inner.send_payload(
            PEER_REDIRECT,
            &RedirectPayload {
                url: url.to_string(),
            },
        )
    }

    pub fn logged_in(&self, token: &str, expires: f64, next: Option<&NextRequest>) -> MessageId {
        self.inner.send_payload(
            PEER_LOGGED_IN,
            &LoggedInPayload {
                token: token.to_string(),
                expires,
                next_request: next.map(WireNextRequest::from),
            },
        )
    }

    /// Send an arbitrary message on the guest's channel.
    pub fn send_raw(&self, name: &str, payload: Value) -> MessageId {
        self.inner.send.send(name, payload)
    }
}

/// Options for a [`GuestPeer`].
pub struct GuestBuilder {
    target: Rc<dyn MessageTarget>,
    source: Rc<dyn MessageSource>,
    host_origin: Origin,
    channel: ChannelId,
    observer: Option<SendObserver>,
    silent: bool,
}

impl GuestBuilder {
    /// Never greet the host.
    pub fn silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    pub fn observer(mut self, observer: SendObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn build(self) -> GuestPeer {
        let mut send =
            SendChannel::new(self.target, self.host_origin.clone(), self.channel.clone());
        if let Some(observer) = self.observer {
            send = send.with_observer(observer);
        }
        GuestPeer {
            inner: Rc::new(GuestInner {
                send,
                receive: ReceiveChannel::new(self.source, self.host_origin, self.channel),
                silent: self.silent,
                connected: Cell::new(false),
                received: RefCell::new(Vec::new()),
            }),
        }
    }
}

impl GuestInner {
    fn record(&self, message: &Message) {
        self.received.borrow_mut().push(message.clone());
        if message.name != HOST_CONNECT || self.connected.get() {
            return;
        }
        match message.payload_as::<HostConnectPayload>() {
            Ok(payload) => {
                debug!(channel = %payload.channel_id, "host answered hello");
                self.connected.set(true);
                self.send.send(PEER_CONNECTED, json!({}));
            }
            Err(err) => warn!("malformed host.connect: {err}"),
        }
    }

    fn send_payload<T: Serialize>(&self, name: &str, payload: &T) -> MessageId {
        let value = serde_json::to_value(payload).unwrap_or_else(|err| {
            warn!(message_name = name, "failed to encode payload: {err}");
            Value::Null
        });
        self.send.send(name, value)
    }
}

impl fmt::Debug for GuestPeer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuestPeer")
            .field("channel", self.channel())
            .field("silent", &self.inner.silent)
            .field("connected", &self.is_connected())
            .finish()
    }
}
