//! State shared by the accessor handles and the notification pump.

use std::sync::Arc;

use parking_lot::RwLock;
use vdesk_ids::{DesktopId, WindowHandle};
use vdesk_shell::{DesktopRecord, Error, Interop, Result, Shell};

use crate::{
    cache::{Cache, WindowEntry},
    config::AccessorCfg,
    events::EventHub,
    hooks::HookManager,
};

/// Everything an accessor owns.
pub struct Shared {
    /// Interop worker.
    pub interop: Interop,
    /// Mirrored shell state.
    pub cache: RwLock<Cache>,
    /// Listener windows.
    pub hooks: HookManager,
    /// Rust subscribers.
    pub hub: EventHub,
    /// Settings the accessor was started with.
    pub cfg: AccessorCfg,
}

impl Shared {
    /// Desktop list, from cache or the shell.
    pub fn desktops(&self) -> Result<Arc<[DesktopRecord]>> {
        let generation = {
            let cache = self.cache.read();
            if let Some(desktops) = cache.desktops() {
                return Ok(desktops);
            }
            cache.generation()
        };
        let desktops: Arc<[DesktopRecord]> =
            self.interop.call("desktops", |s| s.desktops())?.into();
        self.cache
            .write()
            .store_desktops(generation, desktops.clone());
        Ok(desktops)
    }

    /// Desktop list straight from the shell, replacing the cached copy.
    pub fn refetch_desktops(&self) -> Result<Arc<[DesktopRecord]>> {
        self.cache.write().invalidate_desktops();
        self.desktops()
    }

    /// Current desktop, from cache or the shell.
    pub fn current(&self) -> Result<DesktopId> {
        let generation = {
            let cache = self.cache.read();
            if let Some(current) = cache.current() {
                return Ok(current);
            }
            cache.generation()
        };
        let current = self.interop.call("current_desktop", |s| s.current_desktop())?;
        self.cache.write().store_current(generation, current);
        Ok(current)
    }

    /// Identifier of desktop `number`, failing with `InvalidNumber`.
    pub fn desktop_at(&self, number: usize) -> Result<DesktopId> {
        let desktops = self.desktops()?;
        desktops
            .get(number)
            .map(|d| d.id)
            .ok_or_else(|| Error::InvalidNumber {
                number: wide(number),
                count: desktops.len(),
            })
    }

    /// Number of desktop `id`, re-reading the list once on a miss.
    pub fn number_of(&self, id: DesktopId) -> Result<usize> {
        if let Some(n) = position(&self.desktops()?, id) {
            return Ok(n);
        }
        position(&self.refetch_desktops()?, id).ok_or(Error::DesktopNotFound(id))
    }

    /// One cached fact about `window`, fetched with `fetch` on a miss.
    pub fn window_fact<T, R, F, S>(
        &self,
        window: WindowHandle,
        op: &'static str,
        read: R,
        fetch: F,
        store: S,
    ) -> Result<T>
    where
        T: Copy + Send + 'static,
        R: Fn(&WindowEntry) -> Option<T>,
        F: Fn(&dyn Shell) -> Result<T> + Send + 'static,
        S: FnOnce(T) -> WindowEntry,
    {
        let generation = {
            let cache = self.cache.read();
            if let Some(v) = read(&cache.window(window)) {
                return Ok(v);
            }
            cache.generation()
        };
        let value = self.interop.call(op, fetch)?;
        self.cache
            .write()
            .store_window(generation, window, store(value));
        Ok(value)
    }
}

/// Position of `id` in `desktops`.
pub fn position(desktops: &[DesktopRecord], id: DesktopId) -> Option<usize> {
    desktops.iter().position(|d| d.id == id)
}

/// Desktop number as carried in errors.
pub fn wide(number: usize) -> i64 {
    i64::try_from(number).unwrap_or(i64::MAX)
}
