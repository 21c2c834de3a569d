//! Collaborators the host application provides to the orchestrator.

use std::fmt;
use std::rc::Rc;

use framelink_channel::ChannelId;
use framelink_transport::{MessageTarget, Origin};

use crate::navigation::NextRequest;
use crate::payload::Redacted;

/// How a host navigation affects browser history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryMode {
    Push,
    Replace,
}

/// Continuation handed to the host with a login request.
///
/// Invoke [`AuthResolution::resolve`] once the token has been validated and
/// stored.
pub struct AuthResolution {
    resolve: Box<dyn FnOnce()>,
}

impl AuthResolution {
    pub fn new<F>(resolve: F) -> Self
    where
        F: FnOnce() + 'static,
    {
        Self {
            resolve: Box::new(resolve),
        }
    }

    pub fn resolve(self) {
        (self.resolve)()
    }
}

impl fmt::Debug for AuthResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthResolution { .. }")
    }
}

/// A login reported by the guest.
pub struct LoginRequest {
    pub token: String,
    /// Expiry as reported by the guest, in seconds since the epoch.
    pub expires: f64,
    pub next: NextRequest,
    pub resolution: AuthResolution,
}

impl fmt::Debug for LoginRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoginRequest")
            .field("token", &Redacted(Some(&self.token)))
            .field("expires", &self.expires)
            .field("next", &self.next)
            .finish_non_exhaustive()
    }
}

/// Parameters for creating the embedded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameRequest {
    /// Frame URL, including the `channelId` query parameter.
    pub url: String,
    pub origin: Origin,
    pub channel: ChannelId,
}

/// The host application as seen by the orchestrator.
pub trait HostEnvironment {
    /// The current auth token, if signed in.
    fn auth_token(&self) -> Option<String>;

    /// The current host location, e.g. `/legacy/foo/bar?x=1`.
    fn current_path(&self) -> String;

    fn navigate(&self, location: &str, mode: HistoryMode);

    /// Full top-level navigation away from the host.
    fn redirect(&self, url: &str);

    fn set_title(&self, title: &str);

    fn login(&self, request: LoginRequest);

    fn logout(&self);

    /// Create the embedded frame and return a handle for posting into it.
    fn create_frame(&self, request: FrameRequest) -> Rc<dyn MessageTarget>;
}

impl<T: HostEnvironment + ?Sized> HostEnvironment for Rc<T> {
    fn auth_token(&self) -> Option<String> {
        (**self).auth_token()
    }

    fn current_path(&self) -> String {
        (**self).current_path()
    }

    fn navigate(&self, location: &str, mode: HistoryMode) {
        (**self).navigate(location, mode)
    }

    fn redirect(&self, url: &str) {
        (**self).redirect(url)
    }

    fn set_title(&self, title: &str) {
        (**self).set_title(title)
    }

    fn login(&self, request: LoginRequest) {
        (**self).login(request)
    }

    fn logout(&self) {
        (**self).logout()
    }

    fn create_frame(&self, request: FrameRequest) -> Rc<dyn MessageTarget> {
        (**self).create_frame(request)
    }
}

/// Build the frame URL carrying `channel` as the `channelId` parameter.
pub fn frame_url_with_channel(base: &str, channel: &ChannelId) -> String {
    let (base, fragment) = match base.split_once('#') {
        Some((base, fragment)) => (base, Some(fragment)),
        None => (base, None),
    };
    let separator = if base.contains('?') { '&' } else { '?' };
    let mut url = format!(
        "{base}{separator}channelId={}",
        urlencoding::encode(channel.as_str())
    );
    if let Some(fragment) = fragment {
        url.push('#');
        url.push_str(fragment);
    }
    url
}

/// Extract the `channelId` parameter from a frame URL.
pub fn channel_from_frame_url(url: &str) -> Option<ChannelId> {
    let (_, query) = url.split_once('?')?;
    let query = query.split_once('#').map_or(query, |(query, _)| query);
    query.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        if key != "channelId" || value.is_empty() {
            return None;
        }
        let value = urlencoding::decode(value).ok()?;
        Some(ChannelId::new(value.into_owned()))
    })
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    #[test]
    fn frame_url_round_trips_channel() {
        let channel = ChannelId::new("4b1c-9e");
        let url = frame_url_with_channel("https://guest.test/app", &channel);
        assert_eq!(url, "https://guest.test/app?channelId=4b1c-9e");
        assert_eq!(channel_from_frame_url(&url), Some(channel.clone()));

        let url = frame_url_with_channel("https://guest.test/app?embed=1#top", &channel);
        assert_eq!(url, "https://guest.test/app?embed=1&channelId=4b1c-9e#top");
        assert_eq!(channel_from_frame_url(&url), Some(channel));
    }

    #[test]
    fn frame_url_without_channel() {
        assert_eq!(channel_from_frame_url("https://guest.test/app"), None);
        assert_eq!(channel_from_frame_url("https://guest.test/app?channelId="), None);
    }

    #[test]
    fn auth_resolution_runs_once() {
        let calls = std::rc::Rc::new(Cell::new(0));
        let counter = calls.clone();
        let resolution = AuthResolution::new(move || counter.set(counter.get() + 1));
        resolution.resolve();
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn login_request_debug_redacts_token() {
        let request = LoginRequest {
            token: "secret-token".into(),
            expires: 1.0,
            next: NextRequest::new(crate::navigation::NavigationPath::host("dashboard")),
            resolution: AuthResolution::new(|| {}),
        };
        let rendered = format!("{request:?}");
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("<redacted:12 bytes>"));
    }
}
