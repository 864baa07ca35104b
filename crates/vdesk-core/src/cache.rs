//! Shared cache of desktop and window state.
//!
//! Every mutation bumps `generation`. Readers that miss record the generation,
//! fetch from the shell without holding the lock, and store the result only if
//! nothing invalidated the cache in the meantime.

use std::{collections::HashMap, sync::Arc};

use tracing::trace;
use vdesk_ids::{DesktopId, WindowHandle};
use vdesk_shell::DesktopRecord;

/// Cached facts about one window. `None` means unknown.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WindowEntry {
    /// Desktop the shell reported.
    pub desktop: Option<DesktopId>,
    /// Window-level pin.
    pub pinned_window: Option<bool>,
    /// Application-level pin.
    pub pinned_app: Option<bool>,
}

/// Desktop and window state mirrored from the shell.
#[derive(Debug, Default)]
pub struct Cache {
    /// Desktops in ordinal order.
    desktops: Option<Arc<[DesktopRecord]>>,
    /// Current desktop.
    current: Option<DesktopId>,
    /// Per-window facts.
    windows: HashMap<WindowHandle, WindowEntry>,
    /// Bumped on every mutation.
    generation: u64,
}

impl Cache {
    /// Generation to pass back to the `store_*` methods after a fetch.
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Cached desktop list.
    pub fn desktops(&self) -> Option<Arc<[DesktopRecord]>> {
        self.desktops.clone()
    }

    /// Cached current desktop.
    pub const fn current(&self) -> Option<DesktopId> {
        self.current
    }

    /// Cached facts for `window`.
    pub fn window(&self, window: WindowHandle) -> WindowEntry {
        self.windows.get(&window).copied().unwrap_or_default()
    }

    /// Store a fetched desktop list.
    pub fn store_desktops(&mut self, generation: u64, desktops: Arc<[DesktopRecord]>) {
        if self.fresh(generation, "desktops") {
            self.desktops = Some(desktops);
        }
    }

    /// Store a fetched current desktop.
    pub fn store_current(&mut self, generation: u64, current: DesktopId) {
        if self.fresh(generation, "current") {
            self.current = Some(current);
        }
    }

    /// Merge fetched facts about `window`.
    pub fn store_window(&mut self, generation: u64, window: WindowHandle, update: WindowEntry) {
        if !self.fresh(generation, "window") {
            return;
        }
        let entry = self.windows.entry(window).or_default();
        entry.desktop = update.desktop.or(entry.desktop);
        entry.pinned_window = update.pinned_window.or(entry.pinned_window);
        entry.pinned_app = update.pinned_app.or(entry.pinned_app);
    }

    /// Forget the desktop list.
    pub fn invalidate_desktops(&mut self) {
        self.bump();
        self.desktops = None;
    }

    /// Forget the current desktop and everything derived from it.
    pub fn invalidate_current(&mut self) {
        self.bump();
        self.current = None;
        self.windows.clear();
    }

    /// Forget everything about `window`.
    pub fn invalidate_window(&mut self, window: WindowHandle) {
        self.bump();
        self.windows.remove(&window);
    }

    /// Forget every window entry.
    pub fn invalidate_windows(&mut self) {
        self.bump();
        self.windows.clear();
    }

    /// Forget everything.
    pub fn invalidate_all(&mut self) {
        self.bump();
        self.desktops = None;
        self.current = None;
        self.windows.clear();
    }

    /// Advance the generation.
    fn bump(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }

    /// True when `generation` is still current; logs the dropped store otherwise.
    fn fresh(&self, generation: u64, what: &'static str) -> bool {
        let fresh = generation == self.generation;
        if !fresh {
            trace!(what, generation, now = self.generation, "discarding stale fetch");
        }
        fresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(n: u128) -> DesktopRecord {
        DesktopRecord {
            id: DesktopId::from_u128(n),
            name: None,
        }
    }

    #[test]
    fn stale_fetch_does_not_overwrite_invalidation() {
        let mut cache = Cache::default();
        let generation = cache.generation();
        cache.invalidate_current();
        cache.store_current(generation, DesktopId::from_u128(1));
        assert_eq!(cache.current(), None);

        let generation = cache.generation();
        cache.store_current(generation, DesktopId::from_u128(2));
        assert_eq!(cache.current(), Some(DesktopId::from_u128(2)));
    }

    #[test]
    fn window_updates_merge() {
        let mut cache = Cache::default();
        let w = WindowHandle::new(5);
        let generation = cache.generation();
        cache.store_window(
            generation,
            w,
            WindowEntry {
                desktop: Some(DesktopId::from_u128(1)),
                ..WindowEntry::default()
            },
        );
        cache.store_window(
            generation,
            w,
            WindowEntry {
                pinned_window: Some(true),
                ..WindowEntry::default()
            },
        );
        let entry = cache.window(w);
        assert_eq!(entry.desktop, Some(DesktopId::from_u128(1)));
        assert_eq!(entry.pinned_window, Some(true));
        assert_eq!(entry.pinned_app, None);
    }

    #[test]
    fn current_invalidation_drops_window_entries() {
        let mut cache = Cache::default();
        let generation = cache.generation();
        cache.store_desktops(generation, vec![record(1), record(2)].into());
        let w = WindowHandle::new(9);
        cache.store_window(
            generation,
            w,
            WindowEntry {
                desktop: Some(DesktopId::from_u128(1)),
                ..WindowEntry::default()
            },
        );
        cache.invalidate_current();
        assert_eq!(cache.window(w), WindowEntry::default());
        assert_eq!(cache.desktops().map(|d| d.len()), Some(2));
    }
}
