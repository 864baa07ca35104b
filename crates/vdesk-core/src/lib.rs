//! vdesk-core: cached desktop state with change notifications.
//!
//! An [`Accessor`] owns the interop worker, the shared cache, the notification
//! pump, the listener registry and the event hub. Clients reach the state
//! through three cheap handles:
//!
//! - [`Registry`]: desktop enumeration, numbering, switching.
//! - [`WindowIndex`]: window to desktop assignment and pins.
//! - [`ViewTracker`]: Z-order, activation order, focus.
#![warn(missing_docs)]

mod cache;
mod config;
mod events;
pub mod hooks;
pub mod index;
mod pump;
pub mod registry;
mod shared;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;
pub mod views;
pub mod wait;

use std::sync::Arc;

use crossbeam_channel::unbounded;
use parking_lot::{Mutex, RwLock};
use tokio::time::Instant as TokioInstant;
use tracing::{debug, warn};
pub use vdesk_ids::{DesktopId, WindowHandle};
use vdesk_shell::Interop;
pub use vdesk_shell::{BackendFactory, Error, ErrorKind, Result, ViewRecord, status};

pub use crate::{
    config::{AccessorCfg, ConfigError},
    events::{DEFAULT_EVENT_CAPACITY, DesktopEvent, EventCursor, Lag},
    hooks::{HookManager, MessageSink, NullSink},
    index::WindowIndex,
    registry::{Desktop, Registry},
    views::{ViewFilter, ViewTracker},
    wait::{WaitConfig, WaitError},
};
use crate::{cache::Cache, events::EventHub, pump::Pump, shared::Shared};

/// Virtual desktop accessor.
pub struct Accessor {
    /// State shared with handles and the pump.
    shared: Arc<Shared>,
    /// Notification pump; `None` after shutdown.
    pump: Mutex<Option<Pump>>,
}

impl Accessor {
    /// Start an accessor over backends from `factory`.
    ///
    /// Connects to the shell right away to register for notifications and
    /// prime state. An unavailable shell at startup is logged, and later
    /// calls retry the connection.
    pub fn spawn(
        factory: BackendFactory,
        cfg: AccessorCfg,
        sink: Arc<dyn MessageSink>,
    ) -> Result<Self> {
        cfg.validate()
            .map_err(|e| Error::InvalidArgument(e.to_string()))?;
        let interop = Interop::spawn(factory, cfg.interop_cfg())?;
        let (tx, rx) = unbounded();
        if let Err(e) = interop.watch(tx) {
            warn!(error = %e, "could not watch shell notifications yet");
        }
        let shared = Arc::new(Shared {
            interop,
            cache: RwLock::new(Cache::default()),
            hooks: HookManager::new(sink),
            hub: EventHub::new(cfg.event_capacity),
            cfg,
        });
        let pump = Pump::start(shared.clone(), rx)?;
        debug!("accessor started");
        Ok(Self {
            shared,
            pump: Mutex::new(Some(pump)),
        })
    }

    /// Desktop registry.
    #[must_use]
    pub fn registry(&self) -> Registry {
        Registry::new(self.shared.clone())
    }

    /// Window-desktop index.
    #[must_use]
    pub fn index(&self) -> WindowIndex {
        WindowIndex::new(self.shared.clone())
    }

    /// View tracker.
    #[must_use]
    pub fn views(&self) -> ViewTracker {
        ViewTracker::new(self.shared.clone())
    }

    /// Settings in effect.
    #[must_use]
    pub fn config(&self) -> &AccessorCfg {
        &self.shared.cfg
    }

    /// Post change messages to `listener` at `offset + code`.
    pub fn register_hook(&self, listener: WindowHandle, offset: u32) {
        self.shared.hooks.register(listener, offset);
    }

    /// Stop posting to `listener`. Unknown listeners are ignored.
    pub fn unregister_hook(&self, listener: WindowHandle) {
        self.shared.hooks.unregister(listener);
    }

    /// Subscribe to change events published from now on.
    #[must_use]
    pub fn subscribe(&self) -> EventCursor {
        self.shared.hub.subscribe()
    }

    /// Next event for `cursor`, or `None` on timeout or shutdown.
    pub async fn next_event_until(
        &self,
        cursor: &mut EventCursor,
        deadline: TokioInstant,
    ) -> Option<DesktopEvent> {
        self.shared.hub.next_event_until(cursor, deadline).await
    }

    /// Re-minimize windows the shell restores during desktop switches.
    pub fn set_keep_minimized(&self, enabled: bool) {
        debug!(enabled, "keep-minimized");
        self.shared.interop.set_keep_minimized(enabled);
    }

    /// Current keep-minimized setting.
    #[must_use]
    pub fn keep_minimized(&self) -> bool {
        self.shared.interop.keep_minimized()
    }

    /// Re-acquire every shell interface and drop cached state.
    pub fn restart(&self) -> Result<()> {
        self.shared.cache.write().invalidate_all();
        self.shared.interop.restart()
    }

    /// Number of shell reconnects so far.
    #[must_use]
    pub fn restart_count(&self) -> u64 {
        self.shared.interop.restart_count()
    }

    /// Stop the pump, close subscriptions and stop the interop worker.
    pub fn shutdown(&self) {
        if let Some(mut pump) = self.pump.lock().take() {
            pump.stop();
            self.shared.hub.close();
            self.shared.interop.shutdown();
            debug!("accessor stopped");
        }
    }
}

impl Drop for Accessor {
    fn drop(&mut self) {
        self.shutdown();
    }
}
