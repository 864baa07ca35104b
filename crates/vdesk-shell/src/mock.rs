//! Scriptable in-memory shell for tests.
//!
//! [`MockShell`] is the controller tests hold; [`MockShell::factory`] hands the
//! interop worker backends bound to the controller's state. Each backend
//! remembers the generation it was created in: [`MockShell::simulate_restart`]
//! bumps the generation so every older backend starts failing with
//! [`Error::ShellRestarted`], the way stale interface pointers do.

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    thread,
    time::Duration,
};

use parking_lot::Mutex;
use vdesk_ids::{DesktopId, WindowHandle};

use crate::{
    error::{Error, Result},
    shell::{BackendFactory, DesktopRecord, EventSink, Shell, ShellEvent, ViewRecord},
};

/// Per-window mock state.
#[derive(Clone, Debug)]
struct MockWindow {
    /// Assigned desktop.
    desktop: DesktopId,
    /// Window-level pin.
    pinned: bool,
    /// Owning application id.
    app: String,
    /// Not cloaked.
    visible: bool,
    /// Listed in the switcher.
    in_switchers: bool,
    /// Minimized.
    minimized: bool,
    /// Activation timestamp; 0 means unknown.
    last_activation: u64,
    /// Thumbnail window.
    thumbnail: WindowHandle,
    /// Whether the shell holds a view for the window.
    has_view: bool,
}

/// Shared mock state.
#[derive(Debug, Default)]
struct MockState {
    /// Desktops in ordinal order.
    desktops: Vec<DesktopRecord>,
    /// Current desktop.
    current: DesktopId,
    /// Known windows.
    windows: HashMap<WindowHandle, MockWindow>,
    /// Front-to-back stacking order.
    z_order: Vec<WindowHandle>,
    /// Pinned application ids.
    pinned_apps: HashSet<String>,
    /// Focused window.
    focused: Option<WindowHandle>,
    /// Registered sink and the generation it was registered in.
    sink: Option<(u64, EventSink)>,
    /// Log of backend calls.
    calls: Vec<String>,
    /// Delay applied to every backend call.
    hang: Option<Duration>,
    /// Bumped by simulated restarts.
    generation: u64,
    /// When false the factory fails as if the shell were still starting.
    unavailable: bool,
    /// Successful backend creations.
    creations: usize,
    /// Un-minimize windows on the target desktop when switching.
    restore_on_switch: bool,
    /// Source of fresh desktop ids.
    next_id: u128,
    /// Activation clock.
    clock: u64,
}

impl MockState {
    /// Allocate a fresh desktop id.
    fn fresh_id(&mut self) -> DesktopId {
        self.next_id += 1;
        DesktopId::from_u128(0x5eed_0000_0000_0000_0000_0000_0000_0000 | self.next_id)
    }

    /// Send `event` to the sink registered in the current generation.
    fn emit(&self, event: ShellEvent) {
        if let Some((generation, sink)) = &self.sink
            && *generation == self.generation
        {
            sink.send(event).ok();
        }
    }

    /// Position of `id` among the desktops.
    fn position(&self, id: DesktopId) -> Option<usize> {
        self.desktops.iter().position(|d| d.id == id)
    }

    /// Fail unless `id` names a live desktop.
    fn require_desktop(&self, id: DesktopId) -> Result<()> {
        self.position(id)
            .map(|_| ())
            .ok_or(Error::DesktopNotFound(id))
    }

    /// The window entry for `w`.
    fn window(&self, w: WindowHandle) -> Result<&MockWindow> {
        self.windows.get(&w).ok_or(Error::WindowNotFound(w))
    }

    /// Mutable window entry for `w`.
    fn window_mut(&mut self, w: WindowHandle) -> Result<&mut MockWindow> {
        self.windows.get_mut(&w).ok_or(Error::WindowNotFound(w))
    }

    /// Whether `win` shows on every desktop.
    fn is_pinned(&self, win: &MockWindow) -> bool {
        win.pinned || self.pinned_apps.contains(&win.app)
    }

    /// Desktop `win` reports, resolving pins to the current desktop.
    fn effective_desktop(&self, win: &MockWindow) -> DesktopId {
        if self.is_pinned(win) {
            self.current
        } else {
            win.desktop
        }
    }

    /// Build the view record for `w`.
    fn view(&self, w: WindowHandle) -> Result<ViewRecord> {
        let win = self.window(w)?;
        if !win.has_view {
            return Err(Error::WindowNotFound(w));
        }
        let desktop = self.effective_desktop(win);
        Ok(ViewRecord {
            window: w,
            thumbnail: win.thumbnail,
            desktop,
            on_current: desktop == self.current,
            visible: win.visible,
            in_switchers: win.in_switchers,
            last_activation: (win.last_activation != 0).then_some(win.last_activation),
            minimized: win.minimized,
        })
    }

    /// Move `w` to the front of the stacking order and stamp its activation.
    fn activate(&mut self, w: WindowHandle) {
        self.clock += 1;
        let clock = self.clock;
        if let Some(win) = self.windows.get_mut(&w) {
            win.last_activation = clock;
        }
        self.z_order.retain(|x| *x != w);
        self.z_order.insert(0, w);
        self.focused = Some(w);
    }

    /// Make `target` current, emitting the change.
    fn switch(&mut self, target: DesktopId) -> Result<()> {
        self.require_desktop(target)?;
        let old = self.current;
        self.current = target;
        if self.restore_on_switch {
            for win in self.windows.values_mut() {
                if win.desktop == target {
                    win.minimized = false;
                }
            }
        }
        if old != target {
            self.emit(ShellEvent::CurrentChanged {
                old: Some(old),
                new: target,
            });
        }
        Ok(())
    }
}

/// Controller for a scriptable in-memory shell.
#[derive(Clone, Debug)]
pub struct MockShell {
    /// Shared state.
    state: Arc<Mutex<MockState>>,
}

impl MockShell {
    /// A shell with `count` unnamed desktops; the first is current.
    #[must_use]
    pub fn new(count: usize) -> Self {
        let mut state = MockState::default();
        for _ in 0..count.max(1) {
            let id = state.fresh_id();
            state.desktops.push(DesktopRecord { id, name: None });
        }
        state.current = state.desktops[0].id;
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Factory producing backends bound to this controller.
    #[must_use]
    pub fn factory(&self) -> BackendFactory {
        let state = self.state.clone();
        Box::new(move || {
            let mut s = state.lock();
            s.calls.push("connect".into());
            if s.unavailable {
                return Err(Error::ShellRestarted);
            }
            s.creations += 1;
            Ok(Box::new(MockBackend {
                state: state.clone(),
                generation: s.generation,
            }) as Box<dyn Shell>)
        })
    }

    /// Add a window on desktop number `desktop`, on top of the stacking order.
    pub fn add_window(&self, raw: isize, desktop: usize) -> WindowHandle {
        let w = WindowHandle::new(raw);
        let mut s = self.state.lock();
        let desktop = s.desktops[desktop].id;
        s.windows.insert(
            w,
            MockWindow {
                desktop,
                pinned: false,
                app: format!("app-{raw}"),
                visible: true,
                in_switchers: true,
                minimized: false,
                last_activation: 0,
                thumbnail: w,
                has_view: true,
            },
        );
        s.activate(w);
        w
    }

    /// Remove a window entirely, as if it were destroyed.
    pub fn remove_window(&self, w: WindowHandle) {
        let mut s = self.state.lock();
        s.windows.remove(&w);
        s.z_order.retain(|x| *x != w);
        if s.focused == Some(w) {
            s.focused = None;
        }
    }

    /// Keep the window but drop its view.
    pub fn remove_view(&self, w: WindowHandle) {
        self.update(w, |win| win.has_view = false);
    }

    /// Assign the owning application id.
    pub fn set_app(&self, w: WindowHandle, app: &str) {
        self.update(w, |win| win.app = app.to_string());
    }

    /// Set the minimized flag.
    pub fn set_minimized(&self, w: WindowHandle, minimized: bool) {
        self.update(w, |win| win.minimized = minimized);
    }

    /// Set the thumbnail window; `0` means none.
    pub fn set_thumbnail(&self, w: WindowHandle, raw: isize) {
        self.update(w, |win| win.thumbnail = WindowHandle::new(raw));
    }

    /// Set switcher membership.
    pub fn set_in_switchers(&self, w: WindowHandle, shown: bool) {
        self.update(w, |win| win.in_switchers = shown);
    }

    /// Set visibility.
    pub fn set_visible(&self, w: WindowHandle, visible: bool) {
        self.update(w, |win| win.visible = visible);
    }

    /// Set the activation timestamp; `0` means unknown.
    pub fn set_last_activation(&self, w: WindowHandle, ts: u64) {
        self.update(w, |win| win.last_activation = ts);
    }

    /// Delay every backend call by `hang`.
    pub fn set_hang(&self, hang: Option<Duration>) {
        self.state.lock().hang = hang;
    }

    /// Make the factory fail, as if the shell had not come back yet.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unavailable = unavailable;
    }

    /// Restore minimized windows on the target desktop when switching.
    pub fn set_restore_on_switch(&self, restore: bool) {
        self.state.lock().restore_on_switch = restore;
    }

    /// Invalidate every backend created so far.
    pub fn simulate_restart(&self) {
        let mut s = self.state.lock();
        s.generation += 1;
        s.sink = None;
    }

    /// Switch desktops from outside the accessor, as a user would.
    pub fn external_switch(&self, number: usize) {
        let mut s = self.state.lock();
        let id = s.desktops[number].id;
        s.switch(id).ok();
    }

    /// Append a desktop without notifying, so only reconciliation can see it.
    pub fn silent_create(&self) -> DesktopId {
        let mut s = self.state.lock();
        let id = s.fresh_id();
        s.desktops.push(DesktopRecord { id, name: None });
        id
    }

    /// Deliver `event` to the registered sink.
    pub fn emit(&self, event: ShellEvent) {
        self.state.lock().emit(event);
    }

    /// Desktop ids in ordinal order.
    #[must_use]
    pub fn desktop_ids(&self) -> Vec<DesktopId> {
        self.state.lock().desktops.iter().map(|d| d.id).collect()
    }

    /// Number of desktops.
    #[must_use]
    pub fn desktop_count(&self) -> usize {
        self.state.lock().desktops.len()
    }

    /// Number of the current desktop.
    #[must_use]
    pub fn current_number(&self) -> usize {
        let s = self.state.lock();
        s.position(s.current).unwrap_or(0)
    }

    /// Number of the desktop `w` is assigned to, ignoring pins.
    #[must_use]
    pub fn window_number(&self, w: WindowHandle) -> Option<usize> {
        let s = self.state.lock();
        let desktop = s.windows.get(&w)?.desktop;
        s.position(desktop)
    }

    /// Minimized flag of `w`.
    #[must_use]
    pub fn is_minimized(&self, w: WindowHandle) -> bool {
        self.state.lock().windows.get(&w).is_some_and(|win| win.minimized)
    }

    /// Whether a sink is registered for the current generation.
    #[must_use]
    pub fn is_watched(&self) -> bool {
        let s = self.state.lock();
        s.sink.as_ref().is_some_and(|(g, _)| *g == s.generation)
    }

    /// Successful backend creations.
    #[must_use]
    pub fn creations(&self) -> usize {
        self.state.lock().creations
    }

    /// Snapshot of the call log.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    /// Number of logged calls named `op`.
    #[must_use]
    pub fn call_count(&self, op: &str) -> usize {
        self.state.lock().calls.iter().filter(|c| *c == op).count()
    }

    /// Clear the call log.
    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Apply `f` to the window entry for `w`, if present.
    fn update(&self, w: WindowHandle, f: impl FnOnce(&mut MockWindow)) {
        if let Some(win) = self.state.lock().windows.get_mut(&w) {
            f(win);
        }
    }
}

/// Backend handed to the interop worker.
struct MockBackend {
    /// Shared state.
    state: Arc<Mutex<MockState>>,
    /// Generation this backend was created in.
    generation: u64,
}

impl MockBackend {
    /// Log `op`, apply the configured hang, and fail if this backend is stale.
    fn enter(&self, op: &str) -> Result<()> {
        let hang = {
            let mut s = self.state.lock();
            s.calls.push(op.to_string());
            s.hang
        };
        if let Some(hang) = hang {
            thread::sleep(hang);
        }
        if self.state.lock().generation == self.generation {
            Ok(())
        } else {
            Err(Error::ShellRestarted)
        }
    }

    /// Run `f` with the state locked after the standard entry checks.
    fn with<T>(&self, op: &str, f: impl FnOnce(&mut MockState) -> Result<T>) -> Result<T> {
        self.enter(op)?;
        f(&mut self.state.lock())
    }
}

impl Shell for MockBackend {
    fn desktops(&self) -> Result<Vec<DesktopRecord>> {
        self.with("desktops", |s| Ok(s.desktops.clone()))
    }

    fn current_desktop(&self) -> Result<DesktopId> {
        self.with("current_desktop", |s| Ok(s.current))
    }

    fn switch_desktop(&self, desktop: DesktopId) -> Result<()> {
        self.with("switch_desktop", |s| s.switch(desktop))
    }

    fn create_desktop(&self) -> Result<DesktopId> {
        self.with("create_desktop", |s| {
            let id = s.fresh_id();
            s.desktops.push(DesktopRecord { id, name: None });
            s.emit(ShellEvent::DesktopCreated(id));
            Ok(id)
        })
    }

    fn remove_desktop(&self, desktop: DesktopId, fallback: DesktopId) -> Result<()> {
        self.with("remove_desktop", |s| {
            s.require_desktop(desktop)?;
            s.require_desktop(fallback)?;
            s.emit(ShellEvent::DesktopDestroyBegin {
                destroyed: desktop,
                fallback,
            });
            for win in s.windows.values_mut() {
                if win.desktop == desktop {
                    win.desktop = fallback;
                }
            }
            if s.current == desktop {
                s.switch(fallback)?;
            }
            s.desktops.retain(|d| d.id != desktop);
            s.emit(ShellEvent::DesktopDestroyed {
                destroyed: desktop,
                fallback,
            });
            Ok(())
        })
    }

    fn rename_desktop(&self, desktop: DesktopId, name: &str) -> Result<()> {
        self.with("rename_desktop", |s| {
            let record = s
                .desktops
                .iter_mut()
                .find(|d| d.id == desktop)
                .ok_or(Error::DesktopNotFound(desktop))?;
            record.name = Some(name.to_string());
            s.emit(ShellEvent::DesktopRenamed {
                desktop,
                name: name.to_string(),
            });
            Ok(())
        })
    }

    fn window_desktop(&self, window: WindowHandle) -> Result<DesktopId> {
        self.with("window_desktop", |s| {
            let win = s.window(window)?;
            Ok(s.effective_desktop(win))
        })
    }

    fn move_window(&self, window: WindowHandle, desktop: DesktopId) -> Result<bool> {
        self.with("move_window", |s| {
            s.require_desktop(desktop)?;
            let win = s.window_mut(window)?;
            if !win.has_view {
                return Ok(false);
            }
            win.desktop = desktop;
            s.emit(ShellEvent::ViewChanged(window));
            Ok(true)
        })
    }

    fn is_window_pinned(&self, window: WindowHandle) -> Result<bool> {
        self.with("is_window_pinned", |s| Ok(s.window(window)?.pinned))
    }

    fn set_window_pinned(&self, window: WindowHandle, pinned: bool) -> Result<()> {
        let op = if pinned { "pin_window" } else { "unpin_window" };
        self.with(op, |s| {
            s.window_mut(window)?.pinned = pinned;
            s.emit(ShellEvent::ViewChanged(window));
            Ok(())
        })
    }

    fn is_app_pinned(&self, window: WindowHandle) -> Result<bool> {
        self.with("is_app_pinned", |s| {
            let app = &s.window(window)?.app;
            Ok(s.pinned_apps.contains(app))
        })
    }

    fn set_app_pinned(&self, window: WindowHandle, pinned: bool) -> Result<()> {
        let op = if pinned { "pin_app" } else { "unpin_app" };
        self.with(op, |s| {
            let app = s.window(window)?.app.clone();
            if pinned {
                s.pinned_apps.insert(app);
            } else {
                s.pinned_apps.remove(&app);
            }
            s.emit(ShellEvent::ViewChanged(window));
            Ok(())
        })
    }

    fn views(&self) -> Result<Vec<ViewRecord>> {
        self.with("views", |s| {
            Ok(s.z_order
                .iter()
                .filter_map(|w| s.view(*w).ok())
                .collect())
        })
    }

    fn view(&self, window: WindowHandle) -> Result<ViewRecord> {
        self.with("view", |s| s.view(window))
    }

    fn focused_view(&self) -> Result<Option<WindowHandle>> {
        self.with("focused_view", |s| Ok(s.focused))
    }

    fn set_focus(&self, window: WindowHandle) -> Result<()> {
        self.with("set_focus", |s| {
            s.view(window)?;
            s.activate(window);
            Ok(())
        })
    }

    fn switch_to_view(&self, window: WindowHandle) -> Result<()> {
        self.with("switch_to_view", |s| {
            let view = s.view(window)?;
            s.switch(view.desktop)?;
            s.activate(window);
            Ok(())
        })
    }

    fn minimize(&self, window: WindowHandle) -> Result<()> {
        self.with("minimize", |s| {
            s.window_mut(window)?.minimized = true;
            Ok(())
        })
    }

    fn watch(&mut self, sink: EventSink) -> Result<()> {
        self.with("watch", |s| {
            s.sink = Some((s.generation, sink));
            Ok(())
        })
    }

    fn is_connected(&self) -> bool {
        self.state.lock().generation == self.generation
    }
}

#[cfg(test)]
mod tests {
    use crossbeam_channel::unbounded;

    use super::*;

    #[test]
    fn stale_backend_reports_restart() {
        let mock = MockShell::new(2);
        let backend = (mock.factory())().unwrap();
        assert_eq!(backend.desktops().unwrap().len(), 2);
        mock.simulate_restart();
        assert!(!backend.is_connected());
        assert_eq!(backend.desktops(), Err(Error::ShellRestarted));
        let fresh = (mock.factory())().unwrap();
        assert!(fresh.current_desktop().is_ok());
        assert_eq!(mock.creations(), 2);
    }

    #[test]
    fn pinned_windows_follow_current() {
        let mock = MockShell::new(3);
        let w = mock.add_window(10, 2);
        let backend = (mock.factory())().unwrap();
        let ids = mock.desktop_ids();
        assert_eq!(backend.window_desktop(w).unwrap(), ids[2]);
        backend.set_window_pinned(w, true).unwrap();
        assert_eq!(backend.window_desktop(w).unwrap(), ids[0]);
        assert!(backend.view(w).unwrap().on_current);
    }

    #[test]
    fn mutations_notify_watcher() {
        let mock = MockShell::new(2);
        let mut backend = (mock.factory())().unwrap();
        let (tx, rx) = unbounded();
        backend.watch(tx).unwrap();
        let ids = mock.desktop_ids();
        backend.switch_desktop(ids[1]).unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            ShellEvent::CurrentChanged {
                old: Some(ids[0]),
                new: ids[1]
            }
        );
        let created = backend.create_desktop().unwrap();
        assert_eq!(rx.try_recv().unwrap(), ShellEvent::DesktopCreated(created));
    }
}
