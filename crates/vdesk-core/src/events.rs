//! Fan-out of desktop change events to Rust subscribers.

use std::{
    collections::VecDeque,
    fmt,
    sync::{
        Arc, Weak,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use parking_lot::Mutex;
use serde::Serialize;
use tokio::{
    pin,
    sync::Notify,
    time::{Instant as TokioInstant, timeout_at},
};
use vdesk_ids::WindowHandle;

/// A change observed in desktop state, expressed in desktop numbers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum DesktopEvent {
    /// The current desktop changed. `old` is `None` when it was not known.
    CurrentChanged {
        /// Previous number.
        old: Option<usize>,
        /// New number.
        new: usize,
    },
    /// A window moved between desktops or changed pin state.
    WindowChanged {
        /// The window.
        window: WindowHandle,
    },
    /// A desktop was removed.
    Destroyed {
        /// Number the desktop had.
        number: usize,
        /// Number of the desktop that received its windows.
        fallback: usize,
    },
    /// Removal of a desktop was abandoned.
    DestroyFailed {
        /// Number of the desktop.
        number: usize,
        /// Number of the intended fallback.
        fallback: usize,
    },
    /// Removal of a desktop started.
    DestroyBegin {
        /// Number of the desktop.
        number: usize,
        /// Number of the fallback.
        fallback: usize,
    },
    /// A desktop was created.
    Created {
        /// Its number.
        number: usize,
    },
    /// A desktop changed position.
    Moved {
        /// Previous number.
        from: usize,
        /// New number.
        to: usize,
    },
    /// A desktop was renamed.
    Renamed {
        /// Its number.
        number: usize,
        /// New name.
        name: String,
    },
    /// Reconciliation found a different desktop count than the cache held.
    CountChanged {
        /// New count.
        count: usize,
    },
    /// Shell interfaces were re-acquired after a restart.
    ShellReconnected,
}

impl DesktopEvent {
    /// Whether losing this event can leave cached desktop numbers stale.
    const fn changes_layout(&self) -> bool {
        matches!(
            self,
            Self::Created { .. }
                | Self::Destroyed { .. }
                | Self::Moved { .. }
                | Self::CountChanged { .. }
        )
    }

    /// The single event equivalent to `self` followed by `newer`, if any.
    ///
    /// Only state-style events fold: the current desktop, the count, a
    /// desktop's name and a window's placement. Structural events never do.
    fn merged(&self, newer: &Self) -> Option<Self> {
        match (self, newer) {
            (Self::CurrentChanged { old, .. }, Self::CurrentChanged { new, .. }) => {
                Some(Self::CurrentChanged {
                    old: *old,
                    new: *new,
                })
            }
            (Self::CountChanged { .. }, Self::CountChanged { .. })
            | (Self::ShellReconnected, Self::ShellReconnected) => Some(newer.clone()),
            (Self::Renamed { number, .. }, Self::Renamed { number: other, .. })
                if number == other =>
            {
                Some(newer.clone())
            }
            (Self::WindowChanged { window }, Self::WindowChanged { window: other })
                if window == other =>
            {
                Some(newer.clone())
            }
            _ => None,
        }
    }
}

/// Default per-subscriber event ring capacity.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// What a subscriber missed because its queue was full.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Lag {
    /// Events evicted without a replacement.
    pub dropped: u64,
    /// Events folded into a newer event of the same kind.
    pub coalesced: u64,
    /// An evicted event changed the desktop list; re-read it before trusting
    /// numbers seen in earlier events.
    pub layout_stale: bool,
}

impl Lag {
    /// Events that were not delivered one by one.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.dropped.saturating_add(self.coalesced)
    }
}

/// Queued event with its global sequence number.
struct Queued {
    /// Global sequence number.
    seq: u64,
    /// Payload.
    event: DesktopEvent,
}

/// Bounded queue of pending events for one subscriber.
struct Pending {
    /// Pending events, in sequence order.
    queue: VecDeque<Queued>,
    /// Overflow accounting.
    lag: Lag,
    /// Sequence number the next push will carry.
    next_seq: u64,
    /// Maximum pending events.
    capacity: usize,
}

impl Pending {
    /// Empty queue starting at `start_seq`.
    fn new(start_seq: u64, capacity: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            lag: Lag::default(),
            next_seq: start_seq,
            capacity,
        }
    }

    /// Append `event`. When full, fold the newest pending event it
    /// supersedes; failing that, evict the oldest.
    fn push(&mut self, seq: u64, event: &DesktopEvent) {
        self.next_seq = seq.saturating_add(1);
        if self.queue.len() < self.capacity {
            self.queue.push_back(Queued {
                seq,
                event: event.clone(),
            });
            return;
        }
        let folded = self
            .queue
            .iter()
            .enumerate()
            .rev()
            .find_map(|(at, q)| q.event.merged(event).map(|merged| (at, merged)));
        let event = match folded {
            Some((at, merged)) => {
                self.queue.remove(at);
                self.lag.coalesced = self.lag.coalesced.saturating_add(1);
                merged
            }
            None => {
                if let Some(evicted) = self.queue.pop_front() {
                    self.lag.dropped = self.lag.dropped.saturating_add(1);
                    self.lag.layout_stale |= evicted.event.changes_layout();
                }
                event.clone()
            }
        };
        self.queue.push_back(Queued { seq, event });
    }

    /// Sequence number of the oldest pending event.
    fn head_seq(&self) -> u64 {
        self.queue.front().map_or(self.next_seq, |q| q.seq)
    }
}

/// Shared state of one subscription.
struct Subscription {
    /// Pending events.
    pending: Mutex<Pending>,
    /// Wakes waiters on push and close.
    notify: Notify,
    /// Set when the hub goes away.
    closed: AtomicBool,
}

impl Subscription {
    /// New open subscription.
    fn new(start_seq: u64, capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            pending: Mutex::new(Pending::new(start_seq, capacity)),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        })
    }

    /// Queue `event` and wake waiters.
    fn push(&self, seq: u64, event: &DesktopEvent) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        self.pending.lock().push(seq, event);
        self.notify.notify_waiters();
    }

    /// Pop the next event, advancing `cursor`.
    fn try_next(&self, cursor: &mut EventCursor) -> Option<DesktopEvent> {
        let mut pending = self.pending.lock();
        let next = pending.queue.pop_front();
        cursor.lag = pending.lag;
        cursor.next_index = match &next {
            Some(q) => q.seq.saturating_add(1),
            None => cursor.next_index.max(pending.head_seq()),
        };
        next.map(|q| q.event)
    }

    /// Refresh cursor counters without consuming.
    fn sync(&self, cursor: &mut EventCursor) {
        let pending = self.pending.lock();
        cursor.lag = pending.lag;
        cursor.next_index = cursor.next_index.max(pending.head_seq());
    }

    /// Close the subscription and drop pending events.
    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.pending.lock().queue.clear();
        self.notify.notify_waiters();
    }

    /// Whether the subscription is closed.
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Cursor tracking progress through a subscription.
pub struct EventCursor {
    /// Global sequence number of the next event to consume.
    pub next_index: u64,
    /// Overflow accounting as of the last read.
    pub lag: Lag,
    /// Underlying subscription.
    stream: Arc<Subscription>,
}

impl EventCursor {
    /// True when the underlying subscription has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.stream.is_closed()
    }

    /// Pop the next buffered event without waiting.
    pub fn try_next(&mut self) -> Option<DesktopEvent> {
        let stream = self.stream.clone();
        stream.try_next(self)
    }
}

impl fmt::Debug for EventCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventCursor")
            .field("next_index", &self.next_index)
            .field("lag", &self.lag)
            .finish_non_exhaustive()
    }
}

/// Event fan-out with one bounded queue per subscriber.
pub struct EventHub {
    /// Next global sequence number.
    seq: AtomicU64,
    /// Per-subscriber capacity.
    capacity: usize,
    /// Live subscriptions.
    subscribers: Mutex<Vec<Weak<Subscription>>>,
}

impl EventHub {
    /// Create a hub with the given per-subscriber capacity (at least 8).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            seq: AtomicU64::new(0),
            capacity: capacity.max(8),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Subscribe to events published from now on.
    pub fn subscribe(&self) -> EventCursor {
        let start = self.seq.load(Ordering::SeqCst);
        let stream = Subscription::new(start, self.capacity);
        self.subscribers.lock().push(Arc::downgrade(&stream));
        EventCursor {
            stream,
            next_index: start,
            lag: Lag::default(),
        }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: &DesktopEvent) {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|weak| match weak.upgrade() {
            Some(stream) if !stream.is_closed() => {
                stream.push(seq, event);
                true
            }
            _ => false,
        });
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .iter()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }

    /// Await the next event until `deadline`, returning `None` on timeout or close.
    pub async fn next_event_until(
        &self,
        cursor: &mut EventCursor,
        deadline: TokioInstant,
    ) -> Option<DesktopEvent> {
        let stream = cursor.stream.clone();
        loop {
            let notified = stream.notify.notified();
            pin!(notified);
            // Register before checking so a push between the check and the
            // await still wakes us.
            notified.as_mut().enable();
            if let Some(event) = stream.try_next(cursor) {
                return Some(event);
            }
            if stream.is_closed() || TokioInstant::now() >= deadline {
                stream.sync(cursor);
                return None;
            }
            if timeout_at(deadline, notified).await.is_err() {
                stream.sync(cursor);
                return None;
            }
        }
    }

    /// Close every subscription.
    pub fn close(&self) {
        for weak in self.subscribers.lock().drain(..) {
            if let Some(stream) = weak.upgrade() {
                stream.close();
            }
        }
    }
}

impl Drop for EventHub {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use proptest::prelude::*;

    use super::*;
    use crate::test_support::run_async_test;

    /// Every buffered event, oldest first.
    fn drain(cursor: &mut EventCursor) -> Vec<DesktopEvent> {
        let mut out = Vec::new();
        while let Some(event) = cursor.try_next() {
            out.push(event);
        }
        out
    }

    #[test]
    fn overflow_folds_current_changes() {
        let hub = EventHub::new(8);
        let mut cursor = hub.subscribe();
        for number in 0..7 {
            hub.publish(&DesktopEvent::Created { number });
        }
        hub.publish(&DesktopEvent::CurrentChanged {
            old: Some(0),
            new: 1,
        });
        hub.publish(&DesktopEvent::CurrentChanged {
            old: Some(1),
            new: 2,
        });
        hub.publish(&DesktopEvent::CurrentChanged {
            old: Some(2),
            new: 5,
        });

        let events = drain(&mut cursor);
        assert_eq!(events.len(), 8);
        assert_eq!(
            events.last(),
            Some(&DesktopEvent::CurrentChanged {
                old: Some(0),
                new: 5
            })
        );
        assert_eq!(
            cursor.lag,
            Lag {
                dropped: 0,
                coalesced: 2,
                layout_stale: false,
            }
        );
        assert_eq!(cursor.next_index, 10);
    }

    #[test]
    fn evicting_structural_events_marks_layout_stale() {
        let hub = EventHub::new(8);
        let mut cursor = hub.subscribe();
        for number in 0..10 {
            hub.publish(&DesktopEvent::Created { number });
        }
        assert_eq!(cursor.try_next(), Some(DesktopEvent::Created { number: 2 }));
        assert_eq!(cursor.lag.dropped, 2);
        assert!(cursor.lag.layout_stale);
        assert_eq!(cursor.next_index, 3);
    }

    #[test]
    fn renames_fold_per_desktop_only() {
        let hub = EventHub::new(8);
        let mut cursor = hub.subscribe();
        for number in 0..8 {
            hub.publish(&DesktopEvent::Renamed {
                number,
                name: format!("d{number}"),
            });
        }
        hub.publish(&DesktopEvent::Renamed {
            number: 3,
            name: "work".into(),
        });
        hub.publish(&DesktopEvent::WindowChanged {
            window: WindowHandle::new(9),
        });

        let events = drain(&mut cursor);
        assert_eq!(events.len(), 8);
        assert!(events.contains(&DesktopEvent::Renamed {
            number: 3,
            name: "work".into()
        }));
        assert!(!events.contains(&DesktopEvent::Renamed {
            number: 0,
            name: "d0".into()
        }));
        assert_eq!(cursor.lag.coalesced, 1);
        assert_eq!(cursor.lag.dropped, 1);
        assert!(!cursor.lag.layout_stale, "renames do not move desktops");
    }

    #[test]
    fn late_subscribers_miss_earlier_events() {
        let hub = EventHub::new(8);
        hub.publish(&DesktopEvent::ShellReconnected);
        let mut cursor = hub.subscribe();
        assert_eq!(cursor.try_next(), None);
        hub.publish(&DesktopEvent::Created { number: 3 });
        assert_eq!(cursor.try_next(), Some(DesktopEvent::Created { number: 3 }));
    }

    #[test]
    fn dropped_cursors_are_pruned() {
        let hub = EventHub::new(8);
        let cursor = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 1);
        drop(cursor);
        hub.publish(&DesktopEvent::ShellReconnected);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn waiter_wakes_on_publish_and_times_out_when_idle() {
        run_async_test(async {
            let hub = Arc::new(EventHub::new(8));
            let mut cursor = hub.subscribe();
            let publisher = hub.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                publisher.publish(&DesktopEvent::Moved { from: 0, to: 1 });
            });
            let deadline = TokioInstant::now() + Duration::from_secs(2);
            assert_eq!(
                hub.next_event_until(&mut cursor, deadline).await,
                Some(DesktopEvent::Moved { from: 0, to: 1 })
            );
            let deadline = TokioInstant::now() + Duration::from_millis(30);
            assert_eq!(hub.next_event_until(&mut cursor, deadline).await, None);
        });
    }

    #[test]
    fn close_ends_waits() {
        run_async_test(async {
            let hub = EventHub::new(8);
            let mut cursor = hub.subscribe();
            hub.close();
            assert!(cursor.is_closed());
            let deadline = TokioInstant::now() + Duration::from_secs(5);
            assert_eq!(hub.next_event_until(&mut cursor, deadline).await, None);
        });
    }

    /// Ordering key of the test events: the created number or the new current.
    fn key(event: &DesktopEvent) -> usize {
        match event {
            DesktopEvent::Created { number } => *number,
            DesktopEvent::CurrentChanged { new, .. } => *new,
            other => panic!("unexpected event {other:?}"),
        }
    }

    proptest! {
        #[test]
        fn overflow_accounts_for_every_event(
            capacity in 8usize..16,
            kinds in prop::collection::vec(any::<bool>(), 0..80),
        ) {
            let hub = EventHub::new(capacity);
            let mut cursor = hub.subscribe();
            let published: Vec<DesktopEvent> = kinds
                .iter()
                .enumerate()
                .map(|(i, structural)| if *structural {
                    DesktopEvent::Created { number: i }
                } else {
                    DesktopEvent::CurrentChanged { old: None, new: i }
                })
                .collect();
            for event in &published {
                hub.publish(event);
            }
            let seen = drain(&mut cursor);

            prop_assert!(seen.len() <= capacity);
            prop_assert_eq!(seen.len() as u64 + cursor.lag.total(), published.len() as u64);
            prop_assert!(seen.windows(2).all(|w| key(&w[0]) < key(&w[1])));
            prop_assert_eq!(seen.last().map(key), published.last().map(key));
            if cursor.lag.layout_stale {
                prop_assert!(cursor.lag.dropped > 0);
            }
        }
    }
}
