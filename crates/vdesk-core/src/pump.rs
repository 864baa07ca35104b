//! Notification pump: applies shell events to the cache and fans them out.
//!
//! The pump owns a copy of the desktop list so that identifiers in shell
//! events can be translated to numbers as they were at the time of the event.
//! For each event it updates that copy, invalidates the affected cache entries
//! under the write lock, releases the lock, and only then posts to listeners
//! and publishes to subscribers.

use std::{
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_channel::{Receiver, Sender, bounded, never, select, tick};
use tracing::{debug, info, warn};
use vdesk_ids::DesktopId;
use vdesk_shell::{DesktopRecord, Error, Result, ShellEvent};

use crate::{
    cache::Cache,
    events::DesktopEvent,
    shared::{Shared, position},
};

/// Handle to the pump thread.
pub struct Pump {
    /// Dropped or signalled to stop the thread.
    stop: Option<Sender<()>>,
    /// Thread handle.
    thread: Option<JoinHandle<()>>,
}

impl Pump {
    /// Start pumping `events` into `shared`.
    ///
    /// The desktop list is read once before returning so that events already
    /// queued can be translated. A failed read is retried on the first event.
    pub fn start(shared: Arc<Shared>, events: Receiver<ShellEvent>) -> Result<Self> {
        let (stop_tx, stop_rx) = bounded(1);
        let interval = shared.cfg.reconcile_interval();
        let mut state = PumpState::default();
        // Nothing to compare against yet, so this reports no changes.
        state.reconcile(&shared);
        let thread = thread::Builder::new()
            .name("vdesk-pump".into())
            .spawn(move || run(state, &shared, &events, &stop_rx, interval))
            .map_err(|e| Error::Unavailable(format!("spawn notification pump: {e}")))?;
        Ok(Self {
            stop: Some(stop_tx),
            thread: Some(thread),
        })
    }

    /// Stop the thread and wait for it.
    pub fn stop(&mut self) {
        drop(self.stop.take());
        if let Some(handle) = self.thread.take()
            && handle.join().is_err()
        {
            warn!("notification pump panicked");
        }
    }
}

impl Drop for Pump {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Pump thread body.
fn run(
    mut state: PumpState,
    shared: &Shared,
    events: &Receiver<ShellEvent>,
    stop: &Receiver<()>,
    interval: Option<Duration>,
) {
    let ticker = interval.map_or_else(never, tick);
    loop {
        select! {
            recv(events) -> msg => match msg {
                Ok(event) => state.handle(shared, event),
                Err(_) => break,
            },
            recv(ticker) -> _ => {
                let out = state.reconcile(shared);
                dispatch(shared, &out);
            }
            recv(stop) -> _ => break,
        }
    }
    debug!("notification pump exiting");
}

/// Post to listeners and publish to subscribers. Called without locks held.
fn dispatch(shared: &Shared, events: &[DesktopEvent]) {
    for event in events {
        debug!(?event, "desktop event");
        shared.hooks.deliver(event);
        shared.hub.publish(event);
    }
}

/// Desktop state as last observed by the pump.
#[derive(Default)]
struct PumpState {
    /// Desktops in ordinal order; `None` until the first successful read.
    known: Option<Vec<DesktopRecord>>,
    /// Current desktop.
    current: Option<DesktopId>,
}

impl PumpState {
    /// Apply one shell event end to end.
    fn handle(&mut self, shared: &Shared, event: ShellEvent) {
        invalidate(&mut shared.cache.write(), &event);
        let out = match event {
            ShellEvent::Disconnected => {
                warn!("shell connection lost; restarting interop");
                if let Err(e) = shared.interop.restart() {
                    warn!(error = %e, "reconnect after disconnect failed");
                }
                return;
            }
            ShellEvent::Reconnected => {
                info!("shell reconnected");
                let mut out = vec![DesktopEvent::ShellReconnected];
                out.extend(self.reconcile(shared));
                out
            }
            ShellEvent::ViewChanged(window) => vec![DesktopEvent::WindowChanged { window }],
            other => {
                if self.known.is_none() {
                    self.reconcile(shared);
                }
                match self.apply(&other) {
                    Some(event) => vec![event],
                    None => {
                        debug!(event = ?other, "event names an unknown desktop; reconciling");
                        self.reconcile(shared)
                    }
                }
            }
        };
        dispatch(shared, &out);
    }

    /// Update the known list for a desktop event and translate it to numbers.
    ///
    /// Returns `None` when the event cannot be placed against the known list.
    fn apply(&mut self, event: &ShellEvent) -> Option<DesktopEvent> {
        let known = self.known.as_mut()?;
        match event {
            ShellEvent::DesktopCreated(id) => {
                if position(known, *id).is_none() {
                    known.push(DesktopRecord {
                        id: *id,
                        name: None,
                    });
                }
                let number = position(known, *id)?;
                Some(DesktopEvent::Created { number })
            }
            ShellEvent::DesktopDestroyBegin {
                destroyed,
                fallback,
            } => Some(DesktopEvent::DestroyBegin {
                number: position(known, *destroyed)?,
                fallback: position(known, *fallback)?,
            }),
            ShellEvent::DesktopDestroyFailed {
                destroyed,
                fallback,
            } => Some(DesktopEvent::DestroyFailed {
                number: position(known, *destroyed)?,
                fallback: position(known, *fallback)?,
            }),
            ShellEvent::DesktopDestroyed {
                destroyed,
                fallback,
            } => {
                let number = position(known, *destroyed)?;
                known.remove(number);
                let fallback = position(known, *fallback)?;
                Some(DesktopEvent::Destroyed { number, fallback })
            }
            ShellEvent::DesktopMoved { desktop, from, to } => {
                let at = position(known, *desktop)?;
                let record = known.remove(at);
                let to_index = (*to).min(known.len());
                known.insert(to_index, record);
                Some(DesktopEvent::Moved {
                    from: *from,
                    to: *to,
                })
            }
            ShellEvent::DesktopRenamed { desktop, name } => {
                let number = position(known, *desktop)?;
                known[number].name = Some(name.clone());
                Some(DesktopEvent::Renamed {
                    number,
                    name: name.clone(),
                })
            }
            ShellEvent::CurrentChanged { old, new } => {
                let new_number = position(known, *new)?;
                let old_number = old
                    .or(self.current)
                    .and_then(|id| position(known, id));
                self.current = Some(*new);
                Some(DesktopEvent::CurrentChanged {
                    old: old_number,
                    new: new_number,
                })
            }
            ShellEvent::ViewChanged(_) | ShellEvent::Disconnected | ShellEvent::Reconnected => None,
        }
    }

    /// Re-read desktops and the current desktop, returning the changes the
    /// pump had not seen. The first successful read reports nothing.
    ///
    /// The fresh state is also stored in the cache unless a client mutation
    /// invalidated it while the read was in flight.
    fn reconcile(&mut self, shared: &Shared) -> Vec<DesktopEvent> {
        let generation = shared.cache.read().generation();
        let fetched = shared
            .interop
            .call("reconcile", |s| Ok((s.desktops()?, s.current_desktop()?)));
        let (desktops, current) = match fetched {
            Ok(state) => state,
            Err(e) => {
                debug!(error = %e, "reconcile failed");
                return Vec::new();
            }
        };
        let mut out = Vec::new();
        if let Some(known) = &self.known {
            if known.len() != desktops.len() {
                out.push(DesktopEvent::CountChanged {
                    count: desktops.len(),
                });
            }
            if self.current != Some(current)
                && let Some(new) = position(&desktops, current)
            {
                out.push(DesktopEvent::CurrentChanged {
                    old: self.current.and_then(|id| position(known, id)),
                    new,
                });
            }
        }
        if !out.is_empty() {
            info!(changes = out.len(), "reconcile found missed changes");
        }
        {
            let mut cache = shared.cache.write();
            cache.store_desktops(generation, desktops.as_slice().into());
            cache.store_current(generation, current);
        }
        self.known = Some(desktops);
        self.current = Some(current);
        out
    }
}

/// Drop the cache entries `event` makes stale.
fn invalidate(cache: &mut Cache, event: &ShellEvent) {
    match event {
        ShellEvent::DesktopCreated(_)
        | ShellEvent::DesktopMoved { .. }
        | ShellEvent::DesktopRenamed { .. } => cache.invalidate_desktops(),
        ShellEvent::DesktopDestroyBegin { .. } | ShellEvent::DesktopDestroyFailed { .. } => {}
        ShellEvent::CurrentChanged { .. } => cache.invalidate_current(),
        ShellEvent::ViewChanged(window) => cache.invalidate_window(*window),
        ShellEvent::DesktopDestroyed { .. }
        | ShellEvent::Disconnected
        | ShellEvent::Reconnected => cache.invalidate_all(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u128) -> DesktopId {
        DesktopId::from_u128(n)
    }

    fn state(ids: &[u128], current: u128) -> PumpState {
        PumpState {
            known: Some(
                ids.iter()
                    .map(|n| DesktopRecord {
                        id: id(*n),
                        name: None,
                    })
                    .collect(),
            ),
            current: Some(id(current)),
        }
    }

    #[test]
    fn destroyed_reports_former_number_and_new_fallback() {
        let mut s = state(&[1, 2, 3], 1);
        let out = s.apply(&ShellEvent::DesktopDestroyed {
            destroyed: id(1),
            fallback: id(3),
        });
        assert_eq!(
            out,
            Some(DesktopEvent::Destroyed {
                number: 0,
                fallback: 1
            })
        );
        assert_eq!(s.known.as_ref().map(Vec::len), Some(2));
    }

    #[test]
    fn moved_reorders_known_list() {
        let mut s = state(&[1, 2, 3], 1);
        s.apply(&ShellEvent::DesktopMoved {
            desktop: id(3),
            from: 2,
            to: 0,
        });
        let order: Vec<DesktopId> = s
            .known
            .iter()
            .flatten()
            .map(|d| d.id)
            .collect();
        assert_eq!(order, vec![id(3), id(1), id(2)]);
    }

    #[test]
    fn current_change_without_old_uses_last_known() {
        let mut s = state(&[1, 2], 2);
        let out = s.apply(&ShellEvent::CurrentChanged {
            old: None,
            new: id(1),
        });
        assert_eq!(
            out,
            Some(DesktopEvent::CurrentChanged {
                old: Some(1),
                new: 0
            })
        );
        assert_eq!(s.current, Some(id(1)));
    }

    #[test]
    fn unknown_desktop_is_not_translated() {
        let mut s = state(&[1], 1);
        assert_eq!(
            s.apply(&ShellEvent::DesktopRenamed {
                desktop: id(9),
                name: "x".into()
            }),
            None
        );
        let mut empty = PumpState::default();
        assert_eq!(empty.apply(&ShellEvent::DesktopCreated(id(1))), None);
    }
}
