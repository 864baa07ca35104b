//! Window to desktop assignment and pin state.

use std::sync::Arc;

use tracing::debug;
use vdesk_ids::{DesktopId, WindowHandle};
use vdesk_shell::Result;

use crate::{cache::WindowEntry, shared::Shared};

/// Window-desktop index handle. Cheap to clone.
#[derive(Clone)]
pub struct WindowIndex {
    /// Accessor state.
    shared: Arc<Shared>,
}

impl WindowIndex {
    /// Handle over `shared`.
    pub(crate) const fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Desktop `window` is on. Pinned windows report the current desktop.
    pub fn desktop_of(&self, window: WindowHandle) -> Result<DesktopId> {
        self.shared.window_fact(
            window,
            "window_desktop",
            |e| e.desktop,
            move |s| s.window_desktop(window),
            |desktop| WindowEntry {
                desktop: Some(desktop),
                ..WindowEntry::default()
            },
        )
    }

    /// Number of the desktop `window` is on.
    pub fn number_of(&self, window: WindowHandle) -> Result<usize> {
        let desktop = self.desktop_of(window)?;
        self.shared.number_of(desktop)
    }

    /// Whether `window` shows on the current desktop.
    pub fn is_on_current(&self, window: WindowHandle) -> Result<bool> {
        Ok(self.desktop_of(window)? == self.shared.current()?)
    }

    /// Whether `window` is on desktop `number`.
    pub fn is_on_number(&self, window: WindowHandle, number: usize) -> Result<bool> {
        let target = self.shared.desktop_at(number)?;
        Ok(self.desktop_of(window)? == target)
    }

    /// Move `window` to desktop `number`.
    ///
    /// Returns `false` when the shell has no view for the window.
    pub fn move_to(&self, window: WindowHandle, number: usize) -> Result<bool> {
        let target = self.shared.desktop_at(number)?;
        let moved = self
            .shared
            .interop
            .call("move_window", move |s| s.move_window(window, target))?;
        if moved {
            self.shared.cache.write().invalidate_window(window);
        } else {
            debug!(%window, "move skipped: no view");
        }
        Ok(moved)
    }

    /// Whether `window` itself is pinned.
    pub fn is_pinned_window(&self, window: WindowHandle) -> Result<bool> {
        self.shared.window_fact(
            window,
            "is_window_pinned",
            |e| e.pinned_window,
            move |s| s.is_window_pinned(window),
            |pinned| WindowEntry {
                pinned_window: Some(pinned),
                ..WindowEntry::default()
            },
        )
    }

    /// Pin `window` to every desktop. No-op when already pinned.
    pub fn pin_window(&self, window: WindowHandle) -> Result<()> {
        self.set_window_pinned(window, true)
    }

    /// Unpin `window`. No-op when not pinned.
    pub fn unpin_window(&self, window: WindowHandle) -> Result<()> {
        self.set_window_pinned(window, false)
    }

    /// Whether the application owning `window` is pinned.
    pub fn is_pinned_app(&self, window: WindowHandle) -> Result<bool> {
        self.shared.window_fact(
            window,
            "is_app_pinned",
            |e| e.pinned_app,
            move |s| s.is_app_pinned(window),
            |pinned| WindowEntry {
                pinned_app: Some(pinned),
                ..WindowEntry::default()
            },
        )
    }

    /// Pin the application owning `window`. No-op when already pinned.
    pub fn pin_app(&self, window: WindowHandle) -> Result<()> {
        self.set_app_pinned(window, true)
    }

    /// Unpin the application owning `window`. No-op when not pinned.
    pub fn unpin_app(&self, window: WindowHandle) -> Result<()> {
        self.set_app_pinned(window, false)
    }

    /// Bring the window pin to `pinned`, skipping the request when already there.
    fn set_window_pinned(&self, window: WindowHandle, pinned: bool) -> Result<()> {
        let changed = self.shared.interop.call("set_window_pinned", move |s| {
            if s.is_window_pinned(window)? == pinned {
                return Ok(false);
            }
            s.set_window_pinned(window, pinned)?;
            Ok(true)
        })?;
        if changed {
            debug!(%window, pinned, "window pin changed");
            self.shared.cache.write().invalidate_window(window);
        }
        Ok(())
    }

    /// Bring the app pin to `pinned`, skipping the request when already there.
    fn set_app_pinned(&self, window: WindowHandle, pinned: bool) -> Result<()> {
        let changed = self.shared.interop.call("set_app_pinned", move |s| {
            if s.is_app_pinned(window)? == pinned {
                return Ok(false);
            }
            s.set_app_pinned(window, pinned)?;
            Ok(true)
        })?;
        if changed {
            debug!(%window, pinned, "app pin changed");
            // Every window of the application is affected.
            self.shared.cache.write().invalidate_windows();
        }
        Ok(())
    }
}
