//! View introspection: Z-order, activation order, focus.
//!
//! Views are not cached. Every ordering is one shell enumeration taken on the
//! interop worker together with the current desktop, so a snapshot never mixes
//! states from different moments.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use vdesk_ids::WindowHandle;
use vdesk_shell::{Result, ViewRecord};

use crate::shared::Shared;

/// Restricts which views an ordering includes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewFilter {
    /// Only views listed in the task switcher.
    pub switcher_only: bool,
    /// Only views shown on the current desktop.
    pub current_desktop_only: bool,
}

impl ViewFilter {
    /// Every view.
    pub const ALL: Self = Self {
        switcher_only: false,
        current_desktop_only: false,
    };
}

/// View tracker handle. Cheap to clone.
#[derive(Clone)]
pub struct ViewTracker {
    /// Accessor state.
    shared: Arc<Shared>,
}

impl ViewTracker {
    /// Handle over `shared`.
    pub(crate) const fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Filtered views, front-to-back.
    pub fn snapshot(&self, filter: ViewFilter) -> Result<Vec<ViewRecord>> {
        let (current, views) = self
            .shared
            .interop
            .call("views", |s| Ok((s.current_desktop()?, s.views()?)))?;
        Ok(views
            .into_iter()
            .filter(|v| !v.thumbnail.is_null())
            .filter(|v| !filter.switcher_only || v.in_switchers)
            .filter(|v| !filter.current_desktop_only || v.desktop == current)
            .collect())
    }

    /// Window handles front-to-back.
    pub fn by_z_order(&self, filter: ViewFilter) -> Result<Vec<WindowHandle>> {
        Ok(self
            .snapshot(filter)?
            .into_iter()
            .map(|v| v.window)
            .collect())
    }

    /// Filtered views, most recently activated first.
    ///
    /// Views with equal or unknown timestamps keep their Z-order; unknown
    /// timestamps sort last.
    pub fn snapshot_by_activation(&self, filter: ViewFilter) -> Result<Vec<ViewRecord>> {
        let mut views = self.snapshot(filter)?;
        views.sort_by(|a, b| b.last_activation.cmp(&a.last_activation));
        Ok(views)
    }

    /// Window handles, most recently activated first.
    pub fn by_activation_order(&self, filter: ViewFilter) -> Result<Vec<WindowHandle>> {
        Ok(self
            .snapshot_by_activation(filter)?
            .into_iter()
            .map(|v| v.window)
            .collect())
    }

    /// Whether `window` is listed in the task switcher.
    pub fn is_shown_in_switchers(&self, window: WindowHandle) -> Result<bool> {
        Ok(self.view(window)?.in_switchers)
    }

    /// Whether `window` is visible.
    pub fn is_visible(&self, window: WindowHandle) -> Result<bool> {
        Ok(self.view(window)?.visible)
    }

    /// Thumbnail window of `window`, if it has one.
    pub fn thumbnail(&self, window: WindowHandle) -> Result<Option<WindowHandle>> {
        let thumbnail = self.view(window)?.thumbnail;
        Ok((!thumbnail.is_null()).then_some(thumbnail))
    }

    /// Last activation timestamp of `window`.
    pub fn last_activation(&self, window: WindowHandle) -> Result<Option<u64>> {
        Ok(self.view(window)?.last_activation)
    }

    /// The focused view.
    pub fn focused(&self) -> Result<Option<WindowHandle>> {
        self.shared.interop.call("focused_view", |s| s.focused_view())
    }

    /// Focus `window` on its desktop.
    pub fn set_focus(&self, window: WindowHandle) -> Result<()> {
        self.shared
            .interop
            .call("set_focus", move |s| s.set_focus(window))
    }

    /// Switch to `window`, changing desktops if needed.
    pub fn switch_to(&self, window: WindowHandle) -> Result<()> {
        self.shared
            .interop
            .call("switch_to_view", move |s| s.switch_to_view(window))?;
        self.shared.cache.write().invalidate_current();
        Ok(())
    }

    /// The view record of `window`.
    pub fn view(&self, window: WindowHandle) -> Result<ViewRecord> {
        self.shared.interop.call("view", move |s| s.view(window))
    }
}
