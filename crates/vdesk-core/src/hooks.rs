//! Listener registrations and message delivery for desktop changes.
//!
//! Listeners are windows that receive a posted message with code
//! `offset + code` whenever something changes. Delivery is at-least-once:
//! a failed post is retried one time before being logged and dropped.

use std::{collections::HashMap, sync::Arc};

use parking_lot::Mutex;
use tracing::{debug, warn};
use vdesk_ids::WindowHandle;

use crate::events::DesktopEvent;

/// Message codes added to a listener's offset.
pub mod code {
    /// Current desktop changed.
    pub const CURRENT_CHANGED: u32 = 0;
    /// A view moved between desktops or changed pin state.
    pub const WINDOW_CHANGED: u32 = 1;
    /// A desktop was removed.
    pub const DESTROYED: u32 = 2;
    /// Removal of a desktop failed.
    pub const DESTROY_FAILED: u32 = 3;
    /// Removal of a desktop started.
    pub const DESTROY_BEGIN: u32 = 4;
    /// A desktop was created.
    pub const CREATED: u32 = 5;
    /// A desktop changed position.
    pub const MOVED: u32 = 6;
    /// A desktop was renamed.
    pub const RENAMED: u32 = 7;
    /// The desktop count changed outside any notification.
    pub const COUNT_CHANGED: u32 = 8;
    /// Shell interfaces were re-acquired.
    pub const SHELL_RECONNECTED: u32 = 9;
}

/// Posts a message to a window's queue without waiting for it to be handled.
pub trait MessageSink: Send + Sync {
    /// Post `msg` to `target`. Returns `false` when the post failed.
    fn post(&self, target: WindowHandle, msg: u32, wparam: usize, lparam: isize) -> bool;
}

/// Sink that accepts and discards every message.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl MessageSink for NullSink {
    fn post(&self, _target: WindowHandle, _msg: u32, _wparam: usize, _lparam: isize) -> bool {
        true
    }
}

/// Message payload for `event`: `(code, wparam, lparam)`.
#[must_use]
pub fn encode(event: &DesktopEvent) -> (u32, usize, isize) {
    fn lp(n: usize) -> isize {
        isize::try_from(n).unwrap_or(isize::MAX)
    }
    match event {
        DesktopEvent::CurrentChanged { old, new } => {
            (code::CURRENT_CHANGED, old.unwrap_or(usize::MAX), lp(*new))
        }
        DesktopEvent::WindowChanged { window } => (code::WINDOW_CHANGED, window.raw() as usize, 0),
        DesktopEvent::Destroyed { number, fallback } => (code::DESTROYED, *number, lp(*fallback)),
        DesktopEvent::DestroyFailed { number, fallback } => {
            (code::DESTROY_FAILED, *number, lp(*fallback))
        }
        DesktopEvent::DestroyBegin { number, fallback } => {
            (code::DESTROY_BEGIN, *number, lp(*fallback))
        }
        DesktopEvent::Created { number } => (code::CREATED, *number, 0),
        DesktopEvent::Moved { from, to } => (code::MOVED, *from, lp(*to)),
        DesktopEvent::Renamed { number, .. } => (code::RENAMED, *number, 0),
        DesktopEvent::CountChanged { count } => (code::COUNT_CHANGED, *count, 0),
        DesktopEvent::ShellReconnected => (code::SHELL_RECONNECTED, 0, 0),
    }
}

/// Registry of listener windows.
pub struct HookManager {
    /// Listener window to message offset.
    listeners: Mutex<HashMap<WindowHandle, u32>>,
    /// Delivery mechanism.
    sink: Arc<dyn MessageSink>,
}

impl HookManager {
    /// Manager delivering through `sink`.
    #[must_use]
    pub fn new(sink: Arc<dyn MessageSink>) -> Self {
        Self {
            listeners: Mutex::new(HashMap::new()),
            sink,
        }
    }

    /// Register `listener`, replacing any earlier offset for it.
    pub fn register(&self, listener: WindowHandle, offset: u32) {
        if let Some(prev) = self.listeners.lock().insert(listener, offset) {
            debug!(%listener, prev, offset, "listener re-registered");
        } else {
            debug!(%listener, offset, "listener registered");
        }
    }

    /// Remove `listener`. Unknown listeners are ignored.
    pub fn unregister(&self, listener: WindowHandle) {
        if self.listeners.lock().remove(&listener).is_some() {
            debug!(%listener, "listener unregistered");
        }
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn len(&self) -> usize {
        self.listeners.lock().len()
    }

    /// True when nobody is listening.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.listeners.lock().is_empty()
    }

    /// Post `event` to every listener. Returns the number of successful posts.
    pub fn deliver(&self, event: &DesktopEvent) -> usize {
        let targets: Vec<(WindowHandle, u32)> = self
            .listeners
            .lock()
            .iter()
            .map(|(w, offset)| (*w, *offset))
            .collect();
        if targets.is_empty() {
            return 0;
        }
        let (code, wparam, lparam) = encode(event);
        let mut delivered = 0;
        for (target, offset) in targets {
            let msg = offset.wrapping_add(code);
            if self.sink.post(target, msg, wparam, lparam)
                || self.sink.post(target, msg, wparam, lparam)
            {
                delivered += 1;
            } else {
                warn!(%target, msg, "failed to post desktop notification");
            }
        }
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingSink;

    fn manager() -> (HookManager, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        (HookManager::new(sink.clone()), sink)
    }

    #[test]
    fn reregistering_replaces_offset() {
        let (hooks, sink) = manager();
        let w = WindowHandle::new(7);
        hooks.register(w, 0x400);
        hooks.register(w, 0x500);
        assert_eq!(hooks.len(), 1);
        hooks.deliver(&DesktopEvent::Created { number: 2 });
        assert_eq!(sink.posts(), vec![(w, 0x500 + code::CREATED, 2, 0)]);
    }

    #[test]
    fn unregistering_unknown_listener_is_a_noop() {
        let (hooks, sink) = manager();
        hooks.unregister(WindowHandle::new(9));
        assert!(hooks.is_empty());
        assert_eq!(hooks.deliver(&DesktopEvent::ShellReconnected), 0);
        assert!(sink.posts().is_empty());
    }

    #[test]
    fn failed_post_is_retried_once() {
        let (hooks, sink) = manager();
        let w = WindowHandle::new(3);
        hooks.register(w, 100);
        sink.fail_next(1);
        assert_eq!(hooks.deliver(&DesktopEvent::CountChanged { count: 4 }), 1);
        sink.fail_next(2);
        assert_eq!(hooks.deliver(&DesktopEvent::CountChanged { count: 5 }), 0);
        assert_eq!(sink.attempts(), 4);
    }

    #[test]
    fn current_change_from_unknown_uses_sentinel() {
        let (code, wparam, lparam) = encode(&DesktopEvent::CurrentChanged { old: None, new: 1 });
        assert_eq!((code, wparam, lparam), (0, usize::MAX, 1));
        let (code, wparam, lparam) = encode(&DesktopEvent::Moved { from: 3, to: 0 });
        assert_eq!((code, wparam, lparam), (6, 3, 0));
    }
}
