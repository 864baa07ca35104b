//! Helpers for tests that drive the accessor against a mock shell.

use std::{
    future::Future,
    sync::{
        OnceLock,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use parking_lot::Mutex;
use tokio::runtime::{Builder, Runtime};
use vdesk_ids::WindowHandle;

use crate::hooks::MessageSink;

static TEST_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

/// Run an async test body on a dedicated multi-threaded Tokio runtime and shut it down promptly.
pub fn run_async_test<F>(fut: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    /// Shuts the runtime down eagerly when the test body returns or panics.
    struct RuntimeGuard(Option<Runtime>);

    impl Drop for RuntimeGuard {
        fn drop(&mut self) {
            if let Some(rt) = self.0.take() {
                rt.shutdown_timeout(Duration::from_millis(50));
            }
        }
    }

    let _guard = TEST_LOCK.get_or_init(|| Mutex::new(())).lock();
    let guard = RuntimeGuard(Some(
        Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .expect("build test runtime"),
    ));
    if let Some(rt) = guard.0.as_ref() {
        rt.block_on(fut);
    }
}

/// A posted message: target, message, wparam, lparam.
pub type Post = (WindowHandle, u32, usize, isize);

/// [`MessageSink`] that records successful posts and can be told to fail.
#[derive(Debug, Default)]
pub struct RecordingSink {
    /// Successful posts, in order.
    posts: Mutex<Vec<Post>>,
    /// Remaining posts to reject.
    failures: AtomicUsize,
    /// Every post attempt, failed or not.
    attempts: AtomicUsize,
}

impl RecordingSink {
    /// Reject the next `n` posts.
    pub fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    /// Successful posts so far.
    #[must_use]
    pub fn posts(&self) -> Vec<Post> {
        self.posts.lock().clone()
    }

    /// Successful posts whose message equals `msg`.
    #[must_use]
    pub fn posts_of(&self, msg: u32) -> Vec<Post> {
        self.posts
            .lock()
            .iter()
            .filter(|p| p.1 == msg)
            .copied()
            .collect()
    }

    /// Post attempts so far.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Forget recorded posts.
    pub fn clear(&self) {
        self.posts.lock().clear();
    }
}

impl MessageSink for RecordingSink {
    fn post(&self, target: WindowHandle, msg: u32, wparam: usize, lparam: isize) -> bool {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let rejected = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if rejected {
            return false;
        }
        self.posts.lock().push((target, msg, wparam, lparam));
        true
    }
}
