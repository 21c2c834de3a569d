use std::cell::RefCell;
use std::rc::Rc;

use framelink_channel::{Direction, Message, SendObserver};
use framelink_peer::{
    ConnectionError, FrameOrchestrator, FrameRequest, GuestPeer, HistoryMode, HostEnvironment,
    LoginRequest, ManualScheduler, NavigationPath, OrchestratorConfig, RenderState,
};
use framelink_transport::{LocalBus, LocalWindow, MessageTarget, Origin};
use tracing::{debug, info};

use crate::cmd::{parse_duration, SimulateArgs};
use crate::exit::{connection_error, transport_error, CliError, CliResult, FAILURE, SUCCESS};
use crate::output::{print_simulation, OutputFormat, SimulationReport, TranscriptEntry};

/// Seconds since the epoch reported as the expiry of simulated logins.
const SIMULATED_EXPIRY: f64 = 4_102_444_800.0;

/// Host page backed by a window on the local bus.
struct SimulatedHost {
    window: LocalWindow,
    frame: LocalWindow,
    token: RefCell<Option<String>>,
    path: RefCell<String>,
    title: RefCell<Option<String>>,
    frame_url: RefCell<Option<String>>,
}

impl HostEnvironment for SimulatedHost {
    fn auth_token(&self) -> Option<String> {
        self.token.borrow().clone()
    }

    fn current_path(&self) -> String {
        self.path.borrow().clone()
    }

    fn navigate(&self, location: &str, mode: HistoryMode) {
        info!(location, ?mode, "host navigated");
        *self.path.borrow_mut() = location.to_string();
    }

    fn redirect(&self, url: &str) {
        info!(url, "host redirect requested");
    }

    fn set_title(&self, title: &str) {
        info!(title, "host title changed");
        *self.title.borrow_mut() = Some(title.to_string());
    }

    fn login(&self, request: LoginRequest) {
        info!(expires = request.expires, next = %request.next.path, "host signing in");
        *self.token.borrow_mut() = Some(request.token);
        request.resolution.resolve();
    }

    fn logout(&self) {
        info!("host signing out");
        self.token.borrow_mut().take();
    }

    fn create_frame(&self, request: FrameRequest) -> Rc<dyn MessageTarget> {
        debug!(url = %request.url, origin = %request.origin, "creating frame");
        *self.frame_url.borrow_mut() = Some(request.url);
        Rc::new(self.frame.proxy_from(&self.window))
    }
}

pub fn run(args: SimulateArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let guest_origin =
        Origin::parse(&args.guest_origin).map_err(|err| transport_error("--guest-origin", err))?;
    let host_origin =
        Origin::parse(&args.host_origin).map_err(|err| transport_error("--host-origin", err))?;

    let bus = LocalBus::new();
    let host = Rc::new(SimulatedHost {
        window: bus.open_window(host_origin.as_str()),
        frame: bus.open_window(guest_origin.as_str()),
        token: RefCell::new(args.token.clone()),
        path: RefCell::new(args.path.clone()),
        title: RefCell::new(None),
        frame_url: RefCell::new(None),
    });
    let scheduler = Rc::new(ManualScheduler::new());
    let transcript = Rc::new(RefCell::new(Vec::new()));

    let config = OrchestratorConfig::new(format!("{guest_origin}/app"), guest_origin)
        .with_connect_timeout(timeout);
    let orchestrator = FrameOrchestrator::new(
        host.clone(),
        Rc::new(host.window.clone()),
        scheduler.clone(),
        config,
    );
    orchestrator.observe_sends(recorder(&transcript, &scheduler, Direction::HostToGuest));
    orchestrator.on_render(|state| debug!(state = state.label(), "render"));
    orchestrator
        .mount()
        .map_err(|err| connection_error("mount", err))?;

    let frame_url = host
        .frame_url
        .borrow()
        .clone()
        .ok_or_else(|| CliError::new(FAILURE, "mount did not create a frame"))?;
    let guest = GuestPeer::from_frame_url(
        &frame_url,
        Rc::new(host.window.proxy_from(&host.frame)),
        Rc::new(host.frame.clone()),
        host_origin,
    )
    .ok_or_else(|| CliError::new(FAILURE, "frame url carries no channel id"))?
    .silent(args.silent_guest)
    .observer(recorder(&transcript, &scheduler, Direction::GuestToHost))
    .build();
    guest.start();

    let outcome = drive_handshake(&bus, &scheduler, &orchestrator);
    if outcome.is_ok() {
        exercise(&args, &bus, &host, &guest, &orchestrator);
    }

    let report = SimulationReport {
        channel: guest.channel().to_string(),
        state: render_label(&orchestrator.render_state()),
        host_path: host.current_path(),
        title: host.title.borrow().clone(),
        elapsed_ms: scheduler.elapsed().as_millis() as u64,
        messages: transcript.take(),
    };
    print_simulation(&report, format);

    guest.stop();
    orchestrator.unmount();
    bus.run_until_idle();

    outcome
        .map(|()| SUCCESS)
        .map_err(|err| connection_error("simulate", err))
}

fn recorder(
    transcript: &Rc<RefCell<Vec<TranscriptEntry>>>,
    scheduler: &Rc<ManualScheduler>,
    direction: Direction,
) -> SendObserver {
    let transcript = Rc::clone(transcript);
    let scheduler = Rc::clone(scheduler);
    Rc::new(move |message: &Message| {
        transcript
            .borrow_mut()
            .push(TranscriptEntry::record(scheduler.elapsed(), direction, message));
    })
}

/// Deliver messages and advance virtual time until the handshake settles.
fn drive_handshake(
    bus: &LocalBus,
    scheduler: &ManualScheduler,
    orchestrator: &FrameOrchestrator,
) -> Result<(), ConnectionError> {
    loop {
        bus.run_until_idle();
        match orchestrator.render_state() {
            RenderState::Connected => {
                info!(elapsed = ?scheduler.elapsed(), "guest connected");
                return Ok(());
            }
            RenderState::Error(message) => {
                return Err(match orchestrator.timed_out() {
                    Some(elapsed) => ConnectionError::HandshakeTimeout(elapsed),
                    None => ConnectionError::Failed(message),
                });
            }
            RenderState::None | RenderState::Connecting { .. } => {}
        }
        if scheduler.advance_to_next().is_none() {
            return Err(ConnectionError::Failed(
                "handshake stalled with no pending timers".to_string(),
            ));
        }
    }
}

/// Guest and host activity requested on the command line, in a fixed order.
fn exercise(
    args: &SimulateArgs,
    bus: &LocalBus,
    host: &SimulatedHost,
    guest: &GuestPeer,
    orchestrator: &FrameOrchestrator,
) {
    if let Some(path) = &args.navigate {
        guest.navigated(&NavigationPath::guest(path));
        bus.run_until_idle();
        orchestrator.location_changed();
        bus.run_until_idle();
    }
    if let Some(title) = &args.title {
        guest.set_title(title);
        bus.run_until_idle();
    }
    if let Some(token) = &args.login {
        guest.logged_in(token, SIMULATED_EXPIRY, None);
        bus.run_until_idle();
    }
    if args.sign_out {
        host.token.borrow_mut().take();
        orchestrator.token_changed();
        bus.run_until_idle();
    }
}

fn render_label(state: &RenderState) -> String {
    match state {
        RenderState::Error(message) => format!("error: {message}"),
        other => other.label().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(silent: bool) -> SimulateArgs {
        SimulateArgs {
            path: "/legacy/foo/bar".to_string(),
            token: Some("tok".to_string()),
            timeout: "2s".to_string(),
            guest_origin: "https://guest.localhost".to_string(),
            host_origin: "https://host.localhost".to_string(),
            silent_guest: silent,
            navigate: None,
            title: None,
            login: None,
            sign_out: false,
        }
    }

    #[test]
    fn connected_simulation_succeeds() {
        assert_eq!(run(args(false), OutputFormat::Json).unwrap(), SUCCESS);
    }

    #[test]
    fn silent_guest_times_out_with_124() {
        let err = run(args(true), OutputFormat::Json).unwrap_err();
        assert_eq!(err.code, crate::exit::TIMEOUT);
    }

    #[test]
    fn invalid_guest_origin_is_usage_error() {
        let mut args = args(false);
        args.guest_origin = "nope".to_string();
        let err = run(args, OutputFormat::Json).unwrap_err();
        assert_eq!(err.code, crate::exit::USAGE);
    }
}
