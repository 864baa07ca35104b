//! The backend trait and the records it produces.

use crossbeam_channel::Sender;
use serde::Serialize;
use vdesk_ids::{DesktopId, WindowHandle};

use crate::error::Result;

/// One desktop as reported by the shell, in ordinal order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DesktopRecord {
    /// Stable identifier.
    pub id: DesktopId,
    /// User-assigned name, if any.
    pub name: Option<String>,
}

/// A window's on-screen representation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ViewRecord {
    /// Top-level window the view belongs to.
    pub window: WindowHandle,
    /// Window used for the switcher thumbnail; null when the view has none.
    pub thumbnail: WindowHandle,
    /// Desktop the view is shown on. Pinned views report the current desktop.
    pub desktop: DesktopId,
    /// Shown on the current desktop (directly or through a pin).
    pub on_current: bool,
    /// Visible (not cloaked).
    pub visible: bool,
    /// Listed in the task switcher.
    pub in_switchers: bool,
    /// Last activation timestamp as reported by the shell.
    pub last_activation: Option<u64>,
    /// Window is minimized.
    pub minimized: bool,
}

/// Change notifications produced by a watched backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ShellEvent {
    /// A desktop was appended.
    DesktopCreated(DesktopId),
    /// The shell started removing `destroyed`; windows will land on `fallback`.
    DesktopDestroyBegin {
        /// Desktop being removed.
        destroyed: DesktopId,
        /// Desktop receiving its windows.
        fallback: DesktopId,
    },
    /// Removal of `destroyed` was abandoned.
    DesktopDestroyFailed {
        /// Desktop that was to be removed.
        destroyed: DesktopId,
        /// Desktop that was to receive its windows.
        fallback: DesktopId,
    },
    /// `destroyed` is gone.
    DesktopDestroyed {
        /// Removed desktop.
        destroyed: DesktopId,
        /// Desktop that received its windows.
        fallback: DesktopId,
    },
    /// A desktop changed ordinal position.
    DesktopMoved {
        /// Desktop that moved.
        desktop: DesktopId,
        /// Previous number.
        from: usize,
        /// New number.
        to: usize,
    },
    /// A desktop was renamed.
    DesktopRenamed {
        /// Renamed desktop.
        desktop: DesktopId,
        /// New name.
        name: String,
    },
    /// The current desktop changed.
    CurrentChanged {
        /// Previous desktop, when the shell reported one.
        old: Option<DesktopId>,
        /// New current desktop.
        new: DesktopId,
    },
    /// A view moved between desktops or changed pin state.
    ViewChanged(WindowHandle),
    /// The backend lost its connection to the shell.
    Disconnected,
    /// Interfaces were re-acquired after a restart.
    Reconnected,
}

/// Channel on which backends deliver [`ShellEvent`]s.
pub type EventSink = Sender<ShellEvent>;

/// Primitive queries and mutations against the shell's desktop manager.
///
/// Implementations are created and used on a single thread and need not be
/// `Send`. Every method validates its handles against live shell state.
pub trait Shell {
    /// All desktops in ordinal order.
    fn desktops(&self) -> Result<Vec<DesktopRecord>>;
    /// The current desktop.
    fn current_desktop(&self) -> Result<DesktopId>;
    /// Request a switch to `desktop`.
    fn switch_desktop(&self, desktop: DesktopId) -> Result<()>;
    /// Append a desktop and return its identifier.
    fn create_desktop(&self) -> Result<DesktopId>;
    /// Remove `desktop`, moving its windows to `fallback`.
    fn remove_desktop(&self, desktop: DesktopId, fallback: DesktopId) -> Result<()>;
    /// Rename `desktop`.
    fn rename_desktop(&self, desktop: DesktopId, name: &str) -> Result<()>;
    /// Desktop of `window`; the current desktop for pinned windows.
    fn window_desktop(&self, window: WindowHandle) -> Result<DesktopId>;
    /// Move `window` to `desktop`. Returns `false` when the shell has no view for it.
    fn move_window(&self, window: WindowHandle, desktop: DesktopId) -> Result<bool>;
    /// Whether `window` itself is pinned.
    fn is_window_pinned(&self, window: WindowHandle) -> Result<bool>;
    /// Pin or unpin `window`.
    fn set_window_pinned(&self, window: WindowHandle, pinned: bool) -> Result<()>;
    /// Whether the application owning `window` is pinned.
    fn is_app_pinned(&self, window: WindowHandle) -> Result<bool>;
    /// Pin or unpin the application owning `window`.
    fn set_app_pinned(&self, window: WindowHandle, pinned: bool) -> Result<()>;
    /// Every view, front-to-back in Z-order.
    fn views(&self) -> Result<Vec<ViewRecord>>;
    /// The view of `window`.
    fn view(&self, window: WindowHandle) -> Result<ViewRecord>;
    /// The focused view, if any.
    fn focused_view(&self) -> Result<Option<WindowHandle>>;
    /// Give focus to `window` without changing desktops.
    fn set_focus(&self, window: WindowHandle) -> Result<()>;
    /// Switch to `window`, changing desktops if needed.
    fn switch_to_view(&self, window: WindowHandle) -> Result<()>;
    /// Minimize `window` without activating it.
    fn minimize(&self, window: WindowHandle) -> Result<()>;
    /// Deliver change notifications to `sink` until the backend is dropped.
    fn watch(&mut self, sink: EventSink) -> Result<()>;
    /// False once the backend knows its interfaces are stale.
    fn is_connected(&self) -> bool;
}

/// Creates backends on the interop worker thread.
pub type BackendFactory = Box<dyn Fn() -> Result<Box<dyn Shell>> + Send>;
