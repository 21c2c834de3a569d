use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;

use framelink_channel::{ChannelId, SendObserver};
use framelink_transport::{MessageSource, Origin};
use tracing::{debug, info, warn};

use crate::connection::{Connection, ConnectionConfig, ConnectionEvents, FrameLink};
use crate::error::{ConnectionError, Result};
use crate::host::{frame_url_with_channel, FrameRequest, HistoryMode, HostEnvironment, LoginRequest};
use crate::monitor::{MonitorConfig, MonitorState, TimeoutMonitor};
use crate::navigation::{guest_path_from_host, host_location_for, NavigationPath};
use crate::timer::Scheduler;

/// Callback invoked on every render state change.
pub type RenderObserver = Rc<dyn Fn(&RenderState)>;

/// Configuration for a [`FrameOrchestrator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Guest application URL. The channel id is appended as `channelId`.
    pub frame_url: String,
    pub guest_origin: Origin,
    /// Host path prefix under which guest routes are mounted.
    pub legacy_prefix: String,
    /// Handshake deadline.
    pub connect_timeout: Duration,
    /// Tick interval of the handshake monitor.
    pub interval: Duration,
    /// Connecting time after which the overlay shows progress.
    pub progress_threshold: Duration,
    /// Where a login without a next request lands.
    pub default_landing: NavigationPath,
}

impl OrchestratorConfig {
    pub fn new(frame_url: impl Into<String>, guest_origin: Origin) -> Self {
        Self {
            frame_url: frame_url.into(),
            guest_origin,
            legacy_prefix: "/legacy".to_string(),
            connect_timeout: Duration::from_secs(30),
            interval: Duration::from_millis(100),
            progress_threshold: Duration::from_millis(500),
            default_landing: ConnectionConfig::default().default_landing,
        }
    }

    pub fn with_legacy_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.legacy_prefix = prefix.into();
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_progress_threshold(mut self, threshold: Duration) -> Self {
        self.progress_threshold = threshold;
        self
    }

    pub fn with_default_landing(mut self, landing: NavigationPath) -> Self {
        self.default_landing = landing;
        self
    }

    fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig::new(self.connect_timeout).with_interval(self.interval)
    }
}

/// What the embedding UI should render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderState {
    None,
    Connecting {
        elapsed: Duration,
        timeout: Duration,
        progress_threshold: Duration,
    },
    Connected,
    Error(String),
}

/// Blocking overlay shown until the guest is connected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Overlay {
    Spinner,
    Progress { percent: u8 },
    ErrorPanel { message: String },
}

impl RenderState {
    pub fn label(&self) -> &'static str {
        match self {
            RenderState::None => "none",
            RenderState::Connecting { .. } => "connecting",
            RenderState::Connected => "connected",
            RenderState::Error(_) => "error",
        }
    }

    /// The overlay for this state. `None` once connected or before mount.
    pub fn overlay(&self) -> Option<Overlay> {
        match self {
            RenderState::None | RenderState::Connected => None,
            RenderState::Connecting {
                elapsed,
                timeout,
                progress_threshold,
            } => {
                if elapsed < progress_threshold {
                    return Some(Overlay::Spinner);
                }
                let percent = if timeout.is_zero() {
                    100
                } else {
                    (elapsed.as_nanos() * 100 / timeout.as_nanos()).min(100) as u8
                };
                Some(Overlay::Progress { percent })
            }
            RenderState::Error(message) => Some(Overlay::ErrorPanel {
                message: message.clone(),
            }),
        }
    }
}

struct Session {
    connection: Connection,
    monitor: TimeoutMonitor,
}

struct OrchestratorInner {
    host: Rc<dyn HostEnvironment>,
    window: Rc<dyn MessageSource>,
    scheduler: Rc<dyn Scheduler>,
    config: OrchestratorConfig,
    mounted: Cell<bool>,
    session: RefCell<Option<Session>>,
    render: RefCell<RenderState>,
    render_observer: RefCell<Option<RenderObserver>>,
    send_observer: RefCell<Option<SendObserver>>,
    last_sent: RefCell<Option<NavigationPath>>,
    last_token: RefCell<Option<String>>,
}

/// Mounts the guest frame and keeps it in sync with the host.
///
/// One [`Connection`] per mount, one [`TimeoutMonitor`] per handshake.
/// After connecting, host location and auth token changes are forwarded
/// to the guest, and guest events are applied to the host.
#[derive(Clone)]
pub struct FrameOrchestrator {
    inner: Rc<OrchestratorInner>,
}

impl FrameOrchestrator {
    /// `window` is the host window the frame posts into.
    pub fn new(
        host: Rc<dyn HostEnvironment>,
        window: Rc<dyn MessageSource>,
        scheduler: Rc<dyn Scheduler>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            inner: Rc::new(OrchestratorInner {
                host,
                window,
                scheduler,
                config,
                mounted: Cell::new(false),
                session: RefCell::new(None),
                render: RefCell::new(RenderState::None),
                render_observer: RefCell::new(None),
                send_observer: RefCell::new(None),
                last_sent: RefCell::new(None),
                last_token: RefCell::new(None),
            }),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.inner.config
    }

    /// Observe render state changes.
    pub fn on_render<F>(&self, observer: F)
    where
        F: Fn(&RenderState) + 'static,
    {
        *self.inner.render_observer.borrow_mut() = Some(Rc::new(observer));
    }

    /// Observe every message sent to the guest. Applies from the next mount.
    pub fn observe_sends(&self, observer: SendObserver) {
        *self.inner.send_observer.borrow_mut() = Some(observer);
    }

    /// Create the frame and start the handshake. Runs once per mount; later
    /// calls are no-ops until [`FrameOrchestrator::unmount`].
    pub fn mount(&self) -> Result<()> {
        if self.inner.mounted.replace(true) {
            debug!("frame already mounted");
            return Ok(());
        }

        match OrchestratorInner::mount(&self.inner) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.inner.mounted.set(false);
                Err(err)
            }
        }
    }

    /// Tear down the connection and monitor.
    pub fn unmount(&self) {
        let session = self.inner.session.borrow_mut().take();
        if let Some(session) = session {
            session.monitor.stop();
            session.connection.disconnect();
            info!(channel = %session.connection.channel(), "frame unmounted");
        }
        self.inner.mounted.set(false);
        self.inner.last_sent.take();
        self.inner.last_token.take();
        self.inner.set_render(RenderState::None);
    }

    /// The host location changed. Forwarded to the guest if it maps to a
    /// different guest path than the one last sent.
    pub fn location_changed(&self) {
        let Some(connection) = self.inner.connected() else {
            return;
        };
        let location = self.inner.host.current_path();
        let Some(path) = guest_path_from_host(&location, &self.inner.config.legacy_prefix) else {
            debug!(location = %location, "location is outside the guest prefix");
            return;
        };
        if self.inner.last_sent.borrow().as_ref() == Some(&path) {
            return;
        }
        connection.navigate(&path);
        *self.inner.last_sent.borrow_mut() = Some(path);
    }

    /// The host auth token changed.
    pub fn token_changed(&self) {
        let Some(connection) = self.inner.connected() else {
            return;
        };
        let current = self.inner.host.auth_token();
        let previous = self.inner.last_token.replace(current.clone());
        match (previous, current) {
            (None, Some(token)) => {
                debug!("host signed in");
                connection.authenticate(&token, None);
            }
            (Some(_), None) => {
                debug!("host signed out");
                connection.deauthenticate(None);
            }
            (Some(previous), Some(token)) if previous != token => {
                debug!("host token replaced; re-authenticating guest");
                connection.authenticate(&token, None);
            }
            _ => {}
        }
    }

    pub fn render_state(&self) -> RenderState {
        self.inner.render.borrow().clone()
    }

    pub fn overlay(&self) -> Option<Overlay> {
        self.inner.render.borrow().overlay()
    }

    pub fn is_mounted(&self) -> bool {
        self.inner.mounted.get()
    }

    pub fn connection(&self) -> Option<Connection> {
        self.inner
            .session
            .borrow()
            .as_ref()
            .map(|session| session.connection.clone())
    }

    pub fn channel(&self) -> Option<ChannelId> {
        self.connection().map(|connection| connection.channel().clone())
    }

    pub fn monitor_state(&self) -> Option<MonitorState> {
        self.inner
            .session
            .borrow()
            .as_ref()
            .map(|session| session.monitor.state())
    }

    /// Elapsed time at which the handshake timed out, if it did.
    pub fn timed_out(&self) -> Option<Duration> {
        match self.monitor_state()? {
            MonitorState::TimedOut { elapsed } => Some(elapsed),
            _ => None,
        }
    }
}

impl fmt::Debug for FrameOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameOrchestrator")
            .field("config", &self.inner.config)
            .field("mounted", &self.inner.mounted.get())
            .field("render", &*self.inner.render.borrow())
            .finish_non_exhaustive()
    }
}

impl OrchestratorInner {
    fn mount(inner: &Rc<Self>) -> Result<()> {
        let config = &inner.config;
        let channel = ChannelId::generate();
        let url = frame_url_with_channel(&config.frame_url, &channel);
        let target = inner.host.create_frame(FrameRequest {
            url,
            origin: config.guest_origin.clone(),
            channel: channel.clone(),
        });

        let mut link = FrameLink::new(
            target,
            Rc::clone(&inner.window),
            config.guest_origin.clone(),
            channel.clone(),
        );
        if let Some(observer) = inner.send_observer.borrow().clone() {
            link = link.with_observer(observer);
        }
        let events = Rc::new(HostEvents {
            inner: Rc::downgrade(inner),
        });
        let connection = Connection::new(
            link,
            events,
            ConnectionConfig::default().with_default_landing(config.default_landing.clone()),
        )?;

        let on_timeout = Rc::downgrade(inner);
        let on_interval = Rc::downgrade(inner);
        let monitor = TimeoutMonitor::new(
            Rc::clone(&inner.scheduler),
            config.monitor_config(),
            move |elapsed| {
                if let Some(inner) = on_timeout.upgrade() {
                    inner.handshake_timed_out(elapsed);
                }
            },
        )
        .with_on_interval(move |elapsed| {
            if let Some(inner) = on_interval.upgrade() {
                inner.connecting(elapsed);
            }
        });

        *inner.session.borrow_mut() = Some(Session {
            connection: connection.clone(),
            monitor: monitor.clone(),
        });
        info!(channel = %channel, origin = %config.guest_origin, "mounting frame");

        let weak = Rc::downgrade(inner);
        connection.connect_with(move |result| {
            if let Some(inner) = weak.upgrade() {
                inner.handshake_finished(result);
            }
        })?;
        monitor.start();
        Ok(())
    }

    fn session_parts(&self) -> Option<(Connection, TimeoutMonitor)> {
        self.session
            .borrow()
            .as_ref()
            .map(|session| (session.connection.clone(), session.monitor.clone()))
    }

    fn connected(&self) -> Option<Connection> {
        let (connection, _) = self.session_parts()?;
        connection.is_connected().then_some(connection)
    }

    fn connecting(&self, elapsed: Duration) {
        if !matches!(
            *self.render.borrow(),
            RenderState::None | RenderState::Connecting { .. }
        ) {
            return;
        }
        self.set_render(RenderState::Connecting {
            elapsed,
            timeout: self.config.connect_timeout,
            progress_threshold: self.config.progress_threshold,
        });
    }

    fn handshake_finished(&self, result: Result<()>) {
        if let Err(err) = result {
            debug!("handshake abandoned: {err}");
            return;
        }
        let Some((connection, monitor)) = self.session_parts() else {
            return;
        };
        monitor.stop();
        if let Err(err) = connection.start() {
            warn!("failed to start connection: {err}");
            connection.fail(err.to_string());
            self.set_render(RenderState::Error(err.to_string()));
            return;
        }
        self.set_render(RenderState::Connected);

        let token = self.host.auth_token();
        let location = self.host.current_path();
        let path = guest_path_from_host(&location, &self.config.legacy_prefix)
            .unwrap_or_else(|| NavigationPath::guest(""));
        connection.authnavigate(token.as_deref(), &path);
        *self.last_token.borrow_mut() = token;
        *self.last_sent.borrow_mut() = Some(path);
    }

    fn handshake_timed_out(&self, elapsed: Duration) {
        let err = ConnectionError::HandshakeTimeout(elapsed);
        let message = format!("the embedded application did not respond: {err}");
        self.set_render(RenderState::Error(message.clone()));
        if let Some((connection, _)) = self.session_parts() {
            connection.fail(message);
        }
    }

    fn set_render(&self, state: RenderState) {
        {
            let mut render = self.render.borrow_mut();
            if *render == state {
                return;
            }
            if render.label() != state.label() {
                info!(from = render.label(), to = state.label(), "render state changed");
            }
            *render = state.clone();
        }
        let observer = self.render_observer.borrow().clone();
        if let Some(observer) = observer {
            observer(&state);
        }
    }
}

/// Applies guest events to the host environment.
struct HostEvents {
    inner: Weak<OrchestratorInner>,
}

impl HostEvents {
    fn with(&self, apply: impl FnOnce(&OrchestratorInner)) {
        if let Some(inner) = self.inner.upgrade() {
            apply(&inner);
        }
    }
}

impl ConnectionEvents for HostEvents {
    fn navigated(&self, path: &NavigationPath) {
        self.with(|inner| {
            let location = host_location_for(path, &inner.config.legacy_prefix);
            if path.is_guest() {
                *inner.last_sent.borrow_mut() = Some(path.clone());
            }
            inner.host.navigate(&location, HistoryMode::Replace);
        });
    }

    fn title_changed(&self, title: &str) {
        self.with(|inner| inner.host.set_title(title));
    }

    fn logged_out(&self) {
        self.with(|inner| inner.host.logout());
    }

    fn redirect_requested(&self, url: &str) {
        self.with(|inner| inner.host.redirect(url));
    }

    fn logged_in(&self, request: LoginRequest) {
        self.with(|inner| inner.host.login(request));
    }

    fn host_navigation_requested(&self, path: &NavigationPath) {
        self.with(|inner| {
            let location = host_location_for(path, &inner.config.legacy_prefix);
            inner.host.navigate(&location, HistoryMode::Push);
        });
    }
}

#[cfg(test)]
mod tests {
    use framelink_channel::names::{
        HOST_AUTHENTICATED, HOST_AUTHNAVIGATE, HOST_DEAUTHENTICATED, HOST_NAVIGATE,
    };
    use framelink_channel::Message;
    use framelink_transport::{LocalBus, LocalWindow, MessageTarget};
    use serde_json::json;

    use super::*;
    use crate::guest::GuestPeer;
    use crate::timer::ManualScheduler;

    const HOST: &str = "https://host.test";
    const GUEST: &str = "https://guest.test";

    struct FakeHost {
        bus: LocalBus,
        window: LocalWindow,
        frame: LocalWindow,
        token: RefCell<Option<String>>,
        path: RefCell<String>,
        frames: RefCell<Vec<FrameRequest>>,
        navigations: RefCell<Vec<(String, HistoryMode)>>,
        titles: RefCell<Vec<String>>,
        redirects: RefCell<Vec<String>>,
        logins: RefCell<Vec<LoginRequest>>,
        logouts: Cell<usize>,
    }

    impl HostEnvironment for FakeHost {
        fn auth_token(&self) -> Option<String> {
            self.token.borrow().clone()
        }

        fn current_path(&self) -> String {
            self.path.borrow().clone()
        }

        fn navigate(&self, location: &str, mode: HistoryMode) {
            *self.path.borrow_mut() = location.to_string();
            self.navigations
                .borrow_mut()
                .push((location.to_string(), mode));
        }

        fn redirect(&self, url: &str) {
            self.redirects.borrow_mut().push(url.to_string());
        }

        fn set_title(&self, title: &str) {
            self.titles.borrow_mut().push(title.to_string());
        }

        fn login(&self, request: LoginRequest) {
            self.logins.borrow_mut().push(request);
        }

        fn logout(&self) {
            self.logouts.set(self.logouts.get() + 1);
        }

        fn create_frame(&self, request: FrameRequest) -> Rc<dyn MessageTarget> {
            self.frames.borrow_mut().push(request);
            Rc::new(self.frame.proxy_from(&self.window))
        }
    }

    struct Fixture {
        host: Rc<FakeHost>,
        scheduler: Rc<ManualScheduler>,
        orchestrator: FrameOrchestrator,
    }

    impl Fixture {
        fn new(path: &str, token: Option<&str>) -> Self {
            let bus = LocalBus::new();
            let window = bus.open_window(HOST);
            let frame = bus.open_window(GUEST);
            let host = Rc::new(FakeHost {
                bus,
                window: window.clone(),
                frame,
                token: RefCell::new(token.map(str::to_string)),
                path: RefCell::new(path.to_string()),
                frames: RefCell::new(Vec::new()),
                navigations: RefCell::new(Vec::new()),
                titles: RefCell::new(Vec::new()),
                redirects: RefCell::new(Vec::new()),
                logins: RefCell::new(Vec::new()),
                logouts: Cell::new(0),
            });
            let scheduler = Rc::new(ManualScheduler::new());
            let config = OrchestratorConfig::new(
                "https://guest.test/app",
                Origin::parse(GUEST).unwrap(),
            )
            .with_connect_timeout(Duration::from_secs(2));
            let orchestrator =
                FrameOrchestrator::new(host.clone(), Rc::new(window), scheduler.clone(), config);
            Self {
                host,
                scheduler,
                orchestrator,
            }
        }

        fn guest(&self, silent: bool) -> GuestPeer {
            let url = self.host.frames.borrow()[0].url.clone();
            let guest = GuestPeer::from_frame_url(
                &url,
                Rc::new(self.host.window.proxy_from(&self.host.frame)),
                Rc::new(self.host.frame.clone()),
                Origin::parse(HOST).unwrap(),
            )
            .unwrap()
            .silent(silent)
            .build();
            guest.start();
            guest
        }

        fn run(&self) {
            self.host.bus.run_until_idle();
        }

        fn connected(&self) -> GuestPeer {
            self.orchestrator.mount().unwrap();
            let guest = self.guest(false);
            self.run();
            assert_eq!(self.orchestrator.render_state(), RenderState::Connected);
            guest
        }

        fn sent(&self, guest: &GuestPeer) -> Vec<Message> {
            self.run();
            guest.take_received()
        }
    }

    fn names(messages: &[Message]) -> Vec<&str> {
        messages.iter().map(|m| m.name.as_str()).collect()
    }

    #[test]
    fn mount_creates_one_frame_with_channel_in_url() {
        let fixture = Fixture::new("/legacy", None);
        fixture.orchestrator.mount().unwrap();
        fixture.orchestrator.mount().unwrap();

        let frames = fixture.host.frames.borrow();
        assert_eq!(frames.len(), 1);
        let channel = fixture.orchestrator.channel().unwrap();
        assert!(frames[0].url.ends_with(&format!("channelId={channel}")));
        assert_eq!(frames[0].channel, channel);
        assert_eq!(frames[0].origin.as_str(), GUEST);
        assert!(matches!(
            fixture.orchestrator.render_state(),
            RenderState::Connecting { .. }
        ));
        assert_eq!(fixture.orchestrator.overlay(), Some(Overlay::Spinner));
    }

    #[test]
    fn connect_sends_combined_authnavigate() {
        let fixture = Fixture::new("/legacy/orgs/view?id=7", Some("abc"));
        let guest = fixture.connected();

        let received = fixture.sent(&guest);
        assert_eq!(names(&received), vec!["host.connect", HOST_AUTHNAVIGATE]);
        assert_eq!(
            received[1].payload,
            json!({"token": "abc", "navigation": {"path": "orgs/view", "params": {"id": "7"}}})
        );
        assert_eq!(fixture.orchestrator.overlay(), None);
        assert_eq!(fixture.orchestrator.monitor_state(), Some(MonitorState::Stopped));
    }

    #[test]
    fn silent_guest_times_out_after_deadline() {
        let fixture = Fixture::new("/legacy", None);
        fixture.orchestrator.mount().unwrap();
        let connection = fixture.orchestrator.connection().unwrap();
        let guest = fixture.guest(true);
        fixture.run();
        assert_eq!(connection.state_label(), "connecting");

        fixture.scheduler.advance(Duration::from_millis(1999));
        assert!(fixture.orchestrator.timed_out().is_none());
        assert_eq!(
            fixture.orchestrator.overlay(),
            Some(Overlay::Progress { percent: 95 })
        );
        assert_eq!(connection.state_label(), "connecting");
        assert!(guest.received().is_empty());

        fixture.scheduler.advance(Duration::from_millis(200));
        let elapsed = fixture.orchestrator.timed_out().unwrap();
        assert!(elapsed >= Duration::from_secs(2));
        assert_eq!(connection.state_label(), "error");
        match fixture.orchestrator.overlay() {
            Some(Overlay::ErrorPanel { message }) => assert!(message.contains("timed out")),
            other => panic!("unexpected overlay {other:?}"),
        }
    }

    #[test]
    fn peer_navigated_replaces_host_location() {
        let fixture = Fixture::new("/legacy", None);
        let guest = fixture.connected();
        fixture.sent(&guest);

        guest.navigated(&NavigationPath::guest("foo/bar"));
        fixture.run();
        assert_eq!(
            *fixture.host.navigations.borrow(),
            vec![("/legacy/foo/bar".to_string(), HistoryMode::Replace)]
        );

        // The host reacts to its own location change; nothing echoes back.
        fixture.orchestrator.location_changed();
        assert!(fixture.sent(&guest).is_empty());
    }

    #[test]
    fn location_changes_are_diffed() {
        let fixture = Fixture::new("/legacy/home", None);
        let guest = fixture.connected();
        fixture.sent(&guest);

        fixture.orchestrator.location_changed();
        assert!(fixture.sent(&guest).is_empty());

        *fixture.host.path.borrow_mut() = "/legacy/search?q=x&page=2".to_string();
        fixture.orchestrator.location_changed();
        let sent = fixture.sent(&guest);
        assert_eq!(names(&sent), vec![HOST_NAVIGATE]);
        assert_eq!(sent[0].payload, json!({"path": "search", "params": {"page": "2", "q": "x"}}));

        *fixture.host.path.borrow_mut() = "/legacy/search?page=2&q=x".to_string();
        fixture.orchestrator.location_changed();
        assert!(fixture.sent(&guest).is_empty());

        *fixture.host.path.borrow_mut() = "/settings".to_string();
        fixture.orchestrator.location_changed();
        assert!(fixture.sent(&guest).is_empty());
    }

    #[test]
    fn token_sign_in_then_sign_out() {
        let fixture = Fixture::new("/legacy", None);
        let guest = fixture.connected();
        fixture.sent(&guest);

        *fixture.host.token.borrow_mut() = Some("abc".into());
        fixture.orchestrator.token_changed();
        let sent = fixture.sent(&guest);
        assert_eq!(names(&sent), vec![HOST_AUTHENTICATED]);
        assert_eq!(sent[0].payload, json!({"token": "abc"}));

        fixture.orchestrator.token_changed();
        assert!(fixture.sent(&guest).is_empty());

        *fixture.host.token.borrow_mut() = None;
        fixture.orchestrator.token_changed();
        assert_eq!(names(&fixture.sent(&guest)), vec![HOST_DEAUTHENTICATED]);
    }

    #[test]
    fn token_replacement_reauthenticates() {
        let fixture = Fixture::new("/legacy", Some("first"));
        let guest = fixture.connected();
        fixture.sent(&guest);

        *fixture.host.token.borrow_mut() = Some("second".into());
        fixture.orchestrator.token_changed();
        let sent = fixture.sent(&guest);
        assert_eq!(names(&sent), vec![HOST_AUTHENTICATED]);
        assert_eq!(sent[0].payload["token"], "second");
    }

    #[test]
    fn changes_before_connect_are_ignored() {
        let fixture = Fixture::new("/legacy", None);
        fixture.orchestrator.mount().unwrap();
        *fixture.host.token.borrow_mut() = Some("abc".into());
        fixture.orchestrator.token_changed();
        fixture.orchestrator.location_changed();

        let guest = fixture.guest(false);
        let sent = fixture.sent(&guest);
        assert_eq!(names(&sent), vec!["host.connect", HOST_AUTHNAVIGATE]);
        assert_eq!(sent[1].payload["token"], "abc");
    }

    #[test]
    fn login_without_next_request_navigates_to_landing() {
        let fixture = Fixture::new("/legacy", None);
        let guest = fixture.connected();
        fixture.sent(&guest);

        guest.logged_in("t0k", 3600.0, None);
        fixture.run();
        assert!(fixture.host.navigations.borrow().is_empty());

        let login = fixture.host.logins.borrow_mut().remove(0);
        assert_eq!(login.next.path, NavigationPath::host("dashboard"));
        login.resolution.resolve();
        assert_eq!(
            *fixture.host.navigations.borrow(),
            vec![("/dashboard".to_string(), HistoryMode::Push)]
        );
        assert!(fixture.sent(&guest).is_empty());
    }

    #[test]
    fn guest_title_logout_and_redirect_reach_the_host() {
        let fixture = Fixture::new("/legacy", None);
        let guest = fixture.connected();

        guest.set_title("Collections");
        guest.redirect("https://elsewhere.test/");
        guest.logout();
        fixture.run();

        assert_eq!(*fixture.host.titles.borrow(), vec!["Collections".to_string()]);
        assert_eq!(
            *fixture.host.redirects.borrow(),
            vec!["https://elsewhere.test/".to_string()]
        );
        assert_eq!(fixture.host.logouts.get(), 1);
    }

    #[test]
    fn unmount_allows_a_fresh_mount() {
        let fixture = Fixture::new("/legacy", None);
        let guest = fixture.connected();
        let first = fixture.orchestrator.channel().unwrap();

        fixture.orchestrator.unmount();
        assert_eq!(fixture.orchestrator.render_state(), RenderState::None);
        guest.set_title("ignored");
        fixture.run();
        assert!(fixture.host.titles.borrow().is_empty());

        fixture.orchestrator.mount().unwrap();
        assert_eq!(fixture.host.frames.borrow().len(), 2);
        assert_ne!(fixture.orchestrator.channel().unwrap(), first);
    }

    #[test]
    fn render_observer_sees_transitions() {
        let fixture = Fixture::new("/legacy", None);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        fixture
            .orchestrator
            .on_render(move |state| sink.borrow_mut().push(state.label()));
        let _guest = fixture.connected();
        assert_eq!(*seen.borrow(), vec!["connecting", "connected"]);
    }

    #[test]
    fn overlay_progress_is_clamped() {
        let state = RenderState::Connecting {
            elapsed: Duration::from_millis(400),
            timeout: Duration::from_secs(1),
            progress_threshold: Duration::from_millis(500),
        };
        assert_eq!(state.overlay(), Some(Overlay::Spinner));

        let state = RenderState::Connecting {
            elapsed: Duration::from_millis(750),
            timeout: Duration::from_secs(1),
            progress_threshold: Duration::from_millis(500),
        };
        assert_eq!(state.overlay(), Some(Overlay::Progress { percent: 75 }));

        let state = RenderState::Connecting {
            elapsed: Duration::from_secs(5),
            timeout: Duration::from_secs(1),
            progress_threshold: Duration::from_millis(500),
        };
        assert_eq!(state.overlay(), Some(Overlay::Progress { percent: 100 }));
        assert_eq!(RenderState::Connected.overlay(), None);
    }

    #[test]
    fn overlay_handles_sub_millisecond_timeouts() {
        let state = RenderState::Connecting {
            elapsed: Duration::ZERO,
            timeout: Duration::from_micros(500),
            progress_threshold: Duration::ZERO,
        };
        assert_eq!(state.overlay(), Some(Overlay::Progress { percent: 0 }));

        let state = RenderState::Connecting {
            elapsed: Duration::from_micros(250),
            timeout: Duration::from_micros(500),
            progress_threshold: Duration::ZERO,
        };
        assert_eq!(state.overlay(), Some(Overlay::Progress { percent: 50 }));

        let state = RenderState::Connecting {
            elapsed: Duration::ZERO,
            timeout: Duration::ZERO,
            progress_threshold: Duration::ZERO,
        };
        assert_eq!(state.overlay(), Some(Overlay::Progress { percent: 100 }));
    }
}
