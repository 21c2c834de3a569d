use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use framelink_channel::names::{
    HOST_AUTHENTICATED, HOST_AUTHNAVIGATE, HOST_CONNECT, HOST_DEAUTHENTICATED, HOST_NAVIGATE,
    PEER_CONNECT, PEER_CONNECTED, PEER_LOGGED_IN, PEER_LOGOUT, PEER_NAVIGATED, PEER_REDIRECT,
    PEER_SET_TITLE,
};
use framelink_channel::{
    ChannelError, ChannelId, Message, ReceiveChannel, SendChannel, SendObserver,
};
use framelink_schema::SchemaRegistry;
use framelink_transport::{MessageSource, MessageTarget, Origin};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::error::{ConnectionError, Result};
use crate::host::{AuthResolution, LoginRequest};
use crate::navigation::{NavigationPath, NextRequest};
use crate::payload::{
    AuthNavigatePayload, AuthenticatedPayload, ConnectPayload, DeauthenticatedPayload,
    HostConnectPayload, LoggedInPayload, NavigatePayload, Navigation, RedirectPayload,
    SetTitlePayload,
};

type ChannelResult<T> = framelink_channel::Result<T>;
type ConnectCallback = Box<dyn FnOnce(Result<()>)>;

/// Configuration for a [`Connection`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Where a login without a next request lands.
    pub default_landing: NavigationPath,
}

impl ConnectionConfig {
    pub fn with_default_landing(mut self, landing: NavigationPath) -> Self {
        self.default_landing = landing;
        self
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            default_landing: NavigationPath::host("dashboard"),
        }
    }
}

/// Everything needed to talk to one embedded frame.
#[derive(Clone)]
pub struct FrameLink {
    /// Posts into the frame.
    pub target: Rc<dyn MessageTarget>,
    /// The host window the frame posts into.
    pub source: Rc<dyn MessageSource>,
    /// The frame's origin. Only events from it are accepted.
    pub origin: Origin,
    pub channel: ChannelId,
    pub observer: Option<SendObserver>,
}

impl FrameLink {
    pub fn new(
        target: Rc<dyn MessageTarget>,
        source: Rc<dyn MessageSource>,
        origin: Origin,
        channel: ChannelId,
    ) -> Self {
        Self {
            target,
            source,
            origin,
            channel,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: SendObserver) -> Self {
        self.observer = Some(observer);
        self
    }
}

impl fmt::Debug for FrameLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameLink")
            .field("origin", &self.origin)
            .field("channel", &self.channel)
            .field("observed", &self.observer.is_some())
            .finish_non_exhaustive()
    }
}

/// Application-level events raised by a connected peer.
pub trait ConnectionEvents {
    /// The guest navigated internally. Update the host location without
    /// adding a history entry.
    fn navigated(&self, path: &NavigationPath);

    fn title_changed(&self, title: &str);

    fn logged_out(&self);

    fn redirect_requested(&self, url: &str);

    /// The guest logged in. The host must call `request.resolution.resolve()`
    /// once it has validated and stored the token.
    fn logged_in(&self, request: LoginRequest);

    /// A resolved login points at a host route.
    fn host_navigation_requested(&self, path: &NavigationPath);
}

/// The send/receive pair owned by a live connection.
#[derive(Clone, Debug)]
pub struct Channels {
    pub send: SendChannel,
    pub receive: ReceiveChannel,
}

/// Connection lifecycle. Only the live states own channels.
#[derive(Clone, Debug)]
pub enum ConnectionState {
    None,
    Connecting(Channels),
    AwaitingStart(Channels),
    Connected(Channels),
    Error(String),
}

impl ConnectionState {
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionState::None => "none",
            ConnectionState::Connecting(_) => "connecting",
            ConnectionState::AwaitingStart(_) => "awaiting-start",
            ConnectionState::Connected(_) => "connected",
            ConnectionState::Error(_) => "error",
        }
    }

    fn into_channels(self) -> Option<Channels> {
        match self {
            ConnectionState::Connecting(channels)
            | ConnectionState::AwaitingStart(channels)
            | ConnectionState::Connected(channels) => Some(channels),
            ConnectionState::None | ConnectionState::Error(_) => None,
        }
    }
}

struct ConnectionInner {
    link: FrameLink,
    events: Rc<dyn ConnectionEvents>,
    config: ConnectionConfig,
    schemas: Rc<SchemaRegistry>,
    state: RefCell<ConnectionState>,
    pending: RefCell<Option<ConnectCallback>>,
}

/// Host side of one embedded-frame session.
///
/// Drives the handshake (`peer.connect` → `host.connect` →
/// `peer.connected`), then maps guest messages to [`ConnectionEvents`] and
/// host operations to outbound messages.
#[derive(Clone)]
pub struct Connection {
    inner: Rc<ConnectionInner>,
}

impl Connection {
    /// Create a connection validating inbound payloads with the builtin schemas.
    pub fn new(
        link: FrameLink,
        events: Rc<dyn ConnectionEvents>,
        config: ConnectionConfig,
    ) -> Result<Self> {
        let schemas = Rc::new(SchemaRegistry::builtin()?);
        Ok(Self::with_registry(link, events, config, schemas))
    }

    pub fn with_registry(
        link: FrameLink,
        events: Rc<dyn ConnectionEvents>,
        config: ConnectionConfig,
        schemas: Rc<SchemaRegistry>,
    ) -> Self {
        Self {
            inner: Rc::new(ConnectionInner {
                link,
                events,
                config,
                schemas,
                state: RefCell::new(ConnectionState::None),
                pending: RefCell::new(None),
            }),
        }
    }

    pub fn channel(&self) -> &ChannelId {
        &self.inner.link.channel
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state.borrow().clone()
    }

    pub fn state_label(&self) -> &'static str {
        self.inner.state.borrow().label()
    }

    pub fn is_connected(&self) -> bool {
        matches!(*self.inner.state.borrow(), ConnectionState::Connected(_))
    }

    /// Start the handshake; `on_connected` runs once the peer acknowledged.
    ///
    /// There is no internal deadline. If the peer never answers, the callback
    /// only runs when the connection fails or is disconnected.
    pub fn connect_with<F>(&self, on_connected: F) -> Result<()>
    where
        F: FnOnce(Result<()>) + 'static,
    {
        {
            let state = self.inner.state.borrow();
            if !matches!(*state, ConnectionState::None) {
                return Err(ConnectionError::InvalidState {
                    expected: "none",
                    actual: state.label(),
                });
            }
        }

        let link = &self.inner.link;
        let mut send = SendChannel::new(
            Rc::clone(&link.target),
            link.origin.clone(),
            link.channel.clone(),
        );
        if let Some(observer) = &link.observer {
            send = send.with_observer(Rc::clone(observer));
        }
        let receive = ReceiveChannel::new(
            Rc::clone(&link.source),
            link.origin.clone(),
            link.channel.clone(),
        );

        *self.inner.pending.borrow_mut() = Some(Box::new(on_connected));
        *self.inner.state.borrow_mut() = ConnectionState::Connecting(Channels {
            send,
            receive: receive.clone(),
        });

        receive.once(PEER_CONNECT, bind(&self.inner, ConnectionInner::on_hello));
        receive.start();
        info!(channel = %link.channel, origin = %link.origin, "connecting to peer");
        Ok(())
    }

    /// Start the handshake and return a future resolving once the peer
    /// acknowledged.
    pub fn connect(&self) -> Result<ConnectFuture> {
        let (sender, receiver) = oneshot::channel();
        self.connect_with(move |result| {
            let _ = sender.send(result);
        })?;
        Ok(ConnectFuture { receiver })
    }

    /// Attach the application-level handlers. Only valid once the peer has
    /// acknowledged the handshake.
    pub fn start(&self) -> Result<()> {
        let channels = {
            let mut state = self.inner.state.borrow_mut();
            match std::mem::replace(&mut *state, ConnectionState::None) {
                ConnectionState::AwaitingStart(channels) => {
                    *state = ConnectionState::Connected(channels.clone());
                    channels
                }
                other => {
                    let actual = other.label();
                    *state = other;
                    return Err(ConnectionError::InvalidState {
                        expected: "awaiting-start",
                        actual,
                    });
                }
            }
        };

        let receive = &channels.receive;
        receive.on(PEER_NAVIGATED, bind(&self.inner, ConnectionInner::on_navigated));
        receive.on(PEER_SET_TITLE, bind(&self.inner, ConnectionInner::on_set_title));
        receive.on(PEER_LOGOUT, bind(&self.inner, ConnectionInner::on_logout));
        receive.on(PEER_REDIRECT, bind(&self.inner, ConnectionInner::on_redirect));
        receive.on(PEER_LOGGED_IN, bind(&self.inner, ConnectionInner::on_logged_in));
        info!(channel = %self.inner.link.channel, "connection started");
        Ok(())
    }

    /// Ask the guest to navigate. No-op unless connected.
    pub fn navigate(&self, path: &NavigationPath) {
        let payload = NavigatePayload {
            kind: None,
            ..NavigatePayload::from(path)
        };
        self.inner.send_connected(HOST_NAVIGATE, &payload);
    }

    /// Tell the guest it is signed in. No-op unless connected.
    pub fn authenticate(&self, token: &str, navigation: Option<&NavigationPath>) {
        let payload = AuthenticatedPayload {
            token: token.to_string(),
            navigation: navigation.map(Navigation::from),
        };
        self.inner.send_connected(HOST_AUTHENTICATED, &payload);
    }

    /// Tell the guest it is signed out. No-op unless connected.
    pub fn deauthenticate(&self, navigation: Option<&NavigationPath>) {
        let payload = DeauthenticatedPayload {
            navigation: navigation.map(Navigation::from),
        };
        self.inner.send_connected(HOST_DEAUTHENTICATED, &payload);
    }

    /// Establish auth state and location in one message. No-op unless
    /// connected.
    pub fn authnavigate(&self, token: Option<&str>, navigation: &NavigationPath) {
        let payload = AuthNavigatePayload {
            token: token.map(str::to_string),
            navigation: Navigation::from(navigation),
        };
        self.inner.send_connected(HOST_AUTHNAVIGATE, &payload);
    }

    /// Enter the terminal error state, releasing the channels. A pending
    /// connect resolves with [`ConnectionError::Failed`].
    pub fn fail(&self, reason: impl Into<String>) {
        let reason = reason.into();
        let previous = {
            let mut state = self.inner.state.borrow_mut();
            match std::mem::replace(&mut *state, ConnectionState::Error(reason.clone())) {
                ConnectionState::Error(first) => {
                    *state = ConnectionState::Error(first);
                    return;
                }
                other => other,
            }
        };
        warn!(channel = %self.inner.link.channel, reason = %reason, "connection failed");
        if let Some(channels) = previous.into_channels() {
            channels.receive.stop();
        }
        self.inner.resolve_pending(Err(ConnectionError::Failed(reason)));
    }

    /// Stop receiving and drop every handler. Safe in any state.
    pub fn disconnect(&self) {
        let channels = {
            let mut state = self.inner.state.borrow_mut();
            match std::mem::replace(&mut *state, ConnectionState::None) {
                ConnectionState::Error(reason) => {
                    *state = ConnectionState::Error(reason);
                    None
                }
                other => other.into_channels(),
            }
        };
        if let Some(channels) = channels {
            channels.receive.stop();
            info!(channel = %self.inner.link.channel, "connection closed");
        }
        self.inner.resolve_pending(Err(ConnectionError::Disconnected(
            "connection closed before the handshake completed".to_string(),
        )));
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("link", &self.inner.link)
            .field("state", &self.state_label())
            .finish()
    }
}

type Handler = fn(&Rc<ConnectionInner>, &Message) -> ChannelResult<()>;

fn bind(inner: &Rc<ConnectionInner>, handler: Handler) -> impl Fn(&Message) -> ChannelResult<()> {
    let weak = Rc::downgrade(inner);
    move |message: &Message| match weak.upgrade() {
        Some(inner) => handler(&inner, message),
        None => Ok(()),
    }
}

impl ConnectionInner {
    fn decode<T: DeserializeOwned>(&self, message: &Message) -> ChannelResult<T> {
        self.schemas
            .validate(&message.name, &message.payload)
            .map_err(|err| ChannelError::Validation {
                name: message.name.clone(),
                message: err.to_string(),
            })?;
        message.payload_as()
    }

    /// Put a consumed handshake handler back after a malformed message, so a
    /// later well-formed one can still complete the handshake.
    fn rearm(self: &Rc<Self>, name: &str, handler: Handler) {
        let receive = match &*self.state.borrow() {
            ConnectionState::Connecting(channels) => channels.receive.clone(),
            _ => return,
        };
        debug!(message_name = name, "re-arming handshake handler after invalid payload");
        receive.once(name, bind(self, handler));
    }

    fn on_hello(self: &Rc<Self>, message: &Message) -> ChannelResult<()> {
        let hello: ConnectPayload = match self.decode(message) {
            Ok(hello) => hello,
            Err(err) => {
                self.rearm(PEER_CONNECT, ConnectionInner::on_hello);
                return Err(err);
            }
        };
        let channels = match &*self.state.borrow() {
            ConnectionState::Connecting(channels) => channels.clone(),
            other => {
                debug!(state = other.label(), "ignoring hello outside of handshake");
                return Ok(());
            }
        };
        if hello.channel != channels.send.channel().as_str() {
            debug!(
                announced = %hello.channel,
                channel = %channels.send.channel(),
                "peer announced a different channel"
            );
        }

        channels
            .receive
            .once(PEER_CONNECTED, bind(self, ConnectionInner::on_hello_ack_ack));
        let reply = HostConnectPayload {
            channel_id: channels.send.channel().to_string(),
        };
        send_payload(&channels.send, HOST_CONNECT, &reply);
        debug!(channel = %channels.send.channel(), "answered peer hello");
        Ok(())
    }

    fn on_hello_ack_ack(self: &Rc<Self>, message: &Message) -> ChannelResult<()> {
        if let Err(err) = self.decode::<Value>(message) {
            self.rearm(PEER_CONNECTED, ConnectionInner::on_hello_ack_ack);
            return Err(err);
        }
        {
            let mut state = self.state.borrow_mut();
            match std::mem::replace(&mut *state, ConnectionState::None) {
                ConnectionState::Connecting(channels) => {
                    *state = ConnectionState::AwaitingStart(channels);
                }
                other => {
                    debug!(state = other.label(), "ignoring handshake acknowledgement");
                    *state = other;
                    return Ok(());
                }
            }
        }
        info!(channel = %self.link.channel, "peer acknowledged handshake");
        self.resolve_pending(Ok(()));
        Ok(())
    }

    fn on_navigated(self: &Rc<Self>, message: &Message) -> ChannelResult<()> {
        let payload: NavigatePayload = self.decode(message)?;
        let path = payload.to_path();
        debug!(path = %path, "peer navigated");
        self.events.navigated(&path);
        Ok(())
    }

    fn on_set_title(self: &Rc<Self>, message: &Message) -> ChannelResult<()> {
        let payload: SetTitlePayload = self.decode(message)?;
        self.events.title_changed(&payload.title);
        Ok(())
    }

    fn on_logout(self: &Rc<Self>, message: &Message) -> ChannelResult<()> {
        let _: Value = self.decode(message)?;
        debug!("peer logged out");
        self.events.logged_out();
        Ok(())
    }

    fn on_redirect(self: &Rc<Self>, message: &Message) -> ChannelResult<()> {
        let payload: RedirectPayload = self.decode(message)?;
        debug!(url = %payload.url, "peer requested redirect");
        self.events.redirect_requested(&payload.url);
        Ok(())
    }

    fn on_logged_in(self: &Rc<Self>, message: &Message) -> ChannelResult<()> {
        let payload: LoggedInPayload = self.decode(message)?;
        let next = match &payload.next_request {
            Some(next) => NextRequest::from(next),
            None => NextRequest::new(self.config.default_landing.clone()),
        };
        debug!(next = %next.path, "peer logged in");

        let weak = Rc::downgrade(self);
        let token = payload.token.clone();
        let target = next.clone();
        let resolution = AuthResolution::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.resolve_login(token, target);
            }
        });
        self.events.logged_in(LoginRequest {
            token: payload.token,
            expires: payload.expires,
            next,
            resolution,
        });
        Ok(())
    }

    fn resolve_login(&self, token: String, next: NextRequest) {
        if next.path.is_guest() {
            let payload = AuthenticatedPayload {
                token,
                navigation: Some(Navigation::from(&next.path)),
            };
            self.send_connected(HOST_AUTHENTICATED, &payload);
        } else {
            debug!(path = %next.path, "login resolved to a host route");
            self.events.host_navigation_requested(&next.path);
        }
    }

    fn send_connected<T: Serialize>(&self, name: &str, payload: &T) {
        let send = match &*self.state.borrow() {
            ConnectionState::Connected(channels) => channels.send.clone(),
            other => {
                debug!(message_name = name, state = other.label(), "not connected; skipping send");
                return;
            }
        };
        send_payload(&send, name, payload);
    }

    fn resolve_pending(&self, result: Result<()>) {
        let pending = self.pending.borrow_mut().take();
        if let Some(callback) = pending {
            callback(result);
        }
    }
}

impl Drop for ConnectionInner {
    fn drop(&mut self) {
        let state = std::mem::replace(self.state.get_mut(), ConnectionState::None);
        if let Some(channels) = state.into_channels() {
            if channels.receive.is_started() {
                channels.receive.stop();
            }
        }
    }
}

fn send_payload<T: Serialize>(send: &SendChannel, name: &str, payload: &T) {
    match serde_json::to_value(payload) {
        Ok(value) => {
            send.send(name, value);
        }
        Err(err) => warn!(message_name = name, "failed to encode payload: {err}"),
    }
}

/// Resolves once the peer acknowledged the handshake.
#[derive(Debug)]
pub struct ConnectFuture {
    receiver: oneshot::Receiver<Result<()>>,
}

impl ConnectFuture {
    /// The outcome, if the handshake already finished.
    pub fn try_result(&mut self) -> Option<Result<()>> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(dropped())),
        }
    }
}

impl Future for ConnectFuture {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| Err(dropped())))
    }
}

fn dropped() -> ConnectionError {
    ConnectionError::Disconnected("connection dropped before the handshake completed".to_string())
}
