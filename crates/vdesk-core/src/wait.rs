//! Bounded waits for desktop state, driven by the event hub.
//!
//! Desktop switches complete asynchronously. These helpers re-check a
//! predicate each time an event arrives (or after an idle slice) until it holds
//! or the overall deadline passes.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use thiserror::Error;
use tokio::{task, time::Instant as TokioInstant};
use vdesk_shell::Error as ShellError;

use crate::{Accessor, registry::Registry};

/// Bounds for a wait.
#[derive(Clone, Copy, Debug)]
pub struct WaitConfig {
    /// Total time allowed.
    pub overall: Duration,
    /// Longest stretch without events before the predicate is re-checked.
    pub idle: Duration,
}

impl WaitConfig {
    /// Wait configuration with the given bounds.
    #[must_use]
    pub const fn new(overall: Duration, idle: Duration) -> Self {
        Self { overall, idle }
    }
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            overall: Duration::from_secs(5),
            idle: Duration::from_millis(100),
        }
    }
}

/// Errors surfaced by waits.
#[derive(Debug, Error)]
pub enum WaitError {
    /// The condition did not hold before the deadline.
    #[error("timeout waiting for {condition} after {elapsed:?} (events={events}, lost={lost})")]
    Timeout {
        /// What was awaited.
        condition: &'static str,
        /// Time spent.
        elapsed: Duration,
        /// Events observed while waiting.
        events: usize,
        /// Events dropped from the subscription buffer while waiting.
        lost: u64,
    },
    /// The accessor shut down while waiting.
    #[error("event stream closed while waiting for {condition} after {elapsed:?}")]
    StreamClosed {
        /// What was awaited.
        condition: &'static str,
        /// Time spent.
        elapsed: Duration,
    },
    /// Evaluating the predicate failed.
    #[error(transparent)]
    Shell(#[from] ShellError),
    /// The blocking predicate task was cancelled or panicked.
    #[error("predicate task failed: {0}")]
    Join(String),
}

/// Wait until `predicate` holds against the registry.
///
/// The predicate runs on Tokio's blocking pool since it may call into the shell.
pub async fn wait_until<F>(
    accessor: &Accessor,
    condition: &'static str,
    cfg: WaitConfig,
    predicate: F,
) -> Result<(), WaitError>
where
    F: Fn(&Registry) -> vdesk_shell::Result<bool> + Send + Sync + 'static,
{
    let mut cursor = accessor.subscribe();
    let baseline_lost = cursor.lag.total();
    let predicate = Arc::new(predicate);
    let start = Instant::now();
    let deadline = TokioInstant::now() + cfg.overall;
    let mut events = 0;
    loop {
        let registry = accessor.registry();
        let check = predicate.clone();
        let satisfied = task::spawn_blocking(move || check(&registry))
            .await
            .map_err(|e| WaitError::Join(e.to_string()))??;
        if satisfied {
            return Ok(());
        }
        let now = TokioInstant::now();
        if now >= deadline {
            return Err(WaitError::Timeout {
                condition,
                elapsed: start.elapsed(),
                events,
                lost: cursor.lag.total().saturating_sub(baseline_lost),
            });
        }
        let slice = (now + cfg.idle).min(deadline);
        match accessor.next_event_until(&mut cursor, slice).await {
            Some(_) => events += 1,
            None if cursor.is_closed() => {
                return Err(WaitError::StreamClosed {
                    condition,
                    elapsed: start.elapsed(),
                });
            }
            None => {}
        }
    }
}

/// Wait until desktop `number` is current.
pub async fn wait_for_current(
    accessor: &Accessor,
    number: usize,
    cfg: WaitConfig,
) -> Result<(), WaitError> {
    wait_until(accessor, "current desktop", cfg, move |registry| {
        Ok(registry.current_number()? == number)
    })
    .await
}

/// Wait until there are exactly `count` desktops.
pub async fn wait_for_count(
    accessor: &Accessor,
    count: usize,
    cfg: WaitConfig,
) -> Result<(), WaitError> {
    wait_until(accessor, "desktop count", cfg, move |registry| {
        Ok(registry.count()? == count)
    })
    .await
}
