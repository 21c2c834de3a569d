use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::error::{Result, TransportError};
use crate::origin::WILDCARD_ORIGIN;
use crate::traits::{Listener, ListenerId, MessageEvent, MessageSource, MessageTarget};

/// Upper bound on deliveries performed by a single [`LocalBus::run_until_idle`].
///
/// Two windows that answer every message with another message would otherwise
/// never go idle.
pub const MAX_DELIVERIES_PER_RUN: usize = 10_000;

struct Delivery {
    target: LocalWindow,
    target_origin: String,
    event: MessageEvent,
}

/// In-process message bus shared by a set of simulated windows.
///
/// Posting is asynchronous, as with `postMessage`: events are queued and only
/// delivered when the bus is run, in the order they were posted.
#[derive(Clone, Default)]
pub struct LocalBus {
    queue: Rc<RefCell<VecDeque<Delivery>>>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new window with the given origin on this bus.
    pub fn open_window(&self, origin: impl Into<String>) -> LocalWindow {
        LocalWindow {
            inner: Rc::new(WindowInner {
                origin: origin.into(),
                bus: self.clone(),
                listeners: RefCell::new(Vec::new()),
                next_listener_id: Cell::new(1),
                closed: Cell::new(false),
            }),
        }
    }

    /// Number of queued, undelivered events.
    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Deliver one queued event. Returns `false` when the queue is empty.
    pub fn deliver_next(&self) -> bool {
        let next = self.queue.borrow_mut().pop_front();
        let Some(delivery) = next else {
            return false;
        };

        let target = &delivery.target;
        if target.is_closed() {
            debug!(origin = %target.origin(), "dropping event for closed window");
            return true;
        }
        if delivery.target_origin != WILDCARD_ORIGIN
            && !delivery
                .target_origin
                .eq_ignore_ascii_case(target.origin())
        {
            debug!(
                target_origin = %delivery.target_origin,
                window_origin = %target.origin(),
                "dropping event for mismatched target origin"
            );
            return true;
        }

        target.deliver(&delivery.event);
        true
    }

    /// Deliver queued events, including ones posted during delivery, until the
    /// queue is empty. Returns the number of events taken off the queue.
    pub fn run_until_idle(&self) -> usize {
        let mut delivered = 0usize;
        while delivered < MAX_DELIVERIES_PER_RUN {
            if !self.deliver_next() {
                return delivered;
            }
            delivered += 1;
        }
        warn!(
            pending = self.pending(),
            "bus still busy after {MAX_DELIVERIES_PER_RUN} deliveries"
        );
        delivered
    }

    fn enqueue(&self, delivery: Delivery) {
        self.queue.borrow_mut().push_back(delivery);
    }
}

impl fmt::Debug for LocalBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalBus")
            .field("pending", &self.pending())
            .finish()
    }
}

struct WindowInner {
    origin: String,
    bus: LocalBus,
    listeners: RefCell<Vec<(ListenerId, Listener)>>,
    next_listener_id: Cell<u64>,
    closed: Cell<bool>,
}

/// A simulated window (top-level page or frame) on a [`LocalBus`].
#[derive(Clone)]
pub struct LocalWindow {
    inner: Rc<WindowInner>,
}

impl LocalWindow {
    pub fn origin(&self) -> &str {
        &self.inner.origin
    }

    /// A handle for `source` to post into this window.
    ///
    /// Events posted through the proxy carry `source`'s origin.
    pub fn proxy_from(&self, source: &LocalWindow) -> WindowProxy {
        WindowProxy {
            target: self.clone(),
            source_origin: source.origin().to_string(),
        }
    }

    /// Post an event into this window as if sent from `source_origin`.
    pub fn post_from(&self, source_origin: &str, data: Value, target_origin: &str) {
        self.inner.bus.enqueue(Delivery {
            target: self.clone(),
            target_origin: target_origin.to_string(),
            event: MessageEvent::new(source_origin, data),
        });
    }

    /// Deliver an event synchronously, bypassing the bus queue.
    pub fn dispatch(&self, event: MessageEvent) -> Result<()> {
        if self.is_closed() {
            return Err(TransportError::Closed(self.inner.origin.clone()));
        }
        self.deliver(&event);
        Ok(())
    }

    /// Close the window. Queued and future events are silently dropped.
    pub fn close(&self) {
        self.inner.closed.set(true);
        self.inner.listeners.borrow_mut().clear();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.get()
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners.borrow().len()
    }

    fn deliver(&self, event: &MessageEvent) {
        // Snapshot so listeners can attach or detach while being called.
        let listeners: Vec<Listener> = self
            .inner
            .listeners
            .borrow()
            .iter()
            .map(|(_, listener)| Rc::clone(listener))
            .collect();

        trace!(
            origin = %event.origin,
            window = %self.inner.origin,
            listeners = listeners.len(),
            "delivering message event"
        );

        for listener in listeners {
            listener(event);
        }
    }
}

impl MessageSource for LocalWindow {
    fn add_listener(&self, listener: Listener) -> ListenerId {
        let id = ListenerId(self.inner.next_listener_id.get());
        self.inner.next_listener_id.set(id.0 + 1);
        self.inner.listeners.borrow_mut().push((id, listener));
        id
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.inner.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }
}

impl fmt::Debug for LocalWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalWindow")
            .field("origin", &self.inner.origin)
            .field("listeners", &self.listener_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Posting handle from one [`LocalWindow`] into another.
#[derive(Clone, Debug)]
pub struct WindowProxy {
    target: LocalWindow,
    source_origin: String,
}

impl WindowProxy {
    pub fn target(&self) -> &LocalWindow {
        &self.target
    }
}

impl MessageTarget for WindowProxy {
    fn post_message(&self, data: Value, target_origin: &str) {
        self.target
            .post_from(&self.source_origin, data, target_origin);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn recorder(window: &LocalWindow) -> Rc<RefCell<Vec<MessageEvent>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        window.add_listener(Rc::new(move |event: &MessageEvent| {
            sink.borrow_mut().push(event.clone());
        }));
        seen
    }

    #[test]
    fn posting_is_queued_until_run() {
        let bus = LocalBus::new();
        let host = bus.open_window("https://host.test");
        let frame = bus.open_window("https://guest.test");
        let seen = recorder(&frame);

        frame
            .proxy_from(&host)
            .post_message(json!({"n": 1}), "https://guest.test");
        assert!(seen.borrow().is_empty());
        assert_eq!(bus.pending(), 1);

        assert_eq!(bus.run_until_idle(), 1);
        let seen = seen.borrow();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].origin, "https://host.test");
        assert_eq!(seen[0].data, json!({"n": 1}));
    }

    #[test]
    fn delivery_is_fifo() {
        let bus = LocalBus::new();
        let host = bus.open_window("https://host.test");
        let frame = bus.open_window("https://guest.test");
        let seen = recorder(&frame);
        let proxy = frame.proxy_from(&host);

        for n in 0..5 {
            proxy.post_message(json!(n), "*");
        }
        bus.run_until_idle();

        let order: Vec<Value> = seen.borrow().iter().map(|e| e.data.clone()).collect();
        assert_eq!(order, vec![json!(0), json!(1), json!(2), json!(3), json!(4)]);
    }

    #[test]
    fn mismatched_target_origin_is_dropped() {
        let bus = LocalBus::new();
        let host = bus.open_window("https://host.test");
        let frame = bus.open_window("https://guest.test");
        let seen = recorder(&frame);

        frame
            .proxy_from(&host)
            .post_message(json!({}), "https://elsewhere.test");
        assert_eq!(bus.run_until_idle(), 1);
        assert!(seen.borrow().is_empty());
    }

    #[test]
    fn closed_window_drops_silently() {
        let bus = LocalBus::new();
        let host = bus.open_window("https://host.test");
        let frame = bus.open_window("https://guest.test");
        let seen = recorder(&frame);
        let proxy = frame.proxy_from(&host);

        proxy.post_message(json!({}), "*");
        frame.close();
        proxy.post_message(json!({}), "*");

        assert_eq!(bus.run_until_idle(), 2);
        assert!(seen.borrow().is_empty());
        assert!(matches!(
            frame.dispatch(MessageEvent::new("https://host.test", json!({}))),
            Err(TransportError::Closed(_))
        ));
    }

    #[test]
    fn remove_listener_detaches() {
        let bus = LocalBus::new();
        let window = bus.open_window("https://host.test");
        let id = window.add_listener(Rc::new(|_: &MessageEvent| {}));
        assert_eq!(window.listener_count(), 1);
        assert!(window.remove_listener(id));
        assert!(!window.remove_listener(id));
        assert_eq!(window.listener_count(), 0);
    }

    #[test]
    fn ping_pong_is_bounded() {
        let bus = LocalBus::new();
        let a = bus.open_window("https://a.test");
        let b = bus.open_window("https://b.test");

        let to_b = b.proxy_from(&a);
        let to_a = a.proxy_from(&b);
        a.add_listener(Rc::new(move |_: &MessageEvent| {
            to_b.post_message(json!("ping"), "*")
        }));
        b.add_listener(Rc::new(move |_: &MessageEvent| {
            to_a.post_message(json!("pong"), "*")
        }));

        a.post_from("https://b.test", json!("start"), "*");
        assert_eq!(bus.run_until_idle(), MAX_DELIVERIES_PER_RUN);
        assert_eq!(bus.pending(), 1);
    }
}
