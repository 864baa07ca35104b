//! The interop worker thread.
//!
//! Shell interface objects have thread affinity, so every backend is created,
//! used and dropped on one dedicated thread. Callers submit jobs and wait for
//! the reply with a bounded timeout. Restart-class failures make the worker
//! drop the backend, re-create it with backoff, re-register the notification
//! sink and retry the failed call once.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam_channel::{RecvTimeoutError, Sender, bounded, unbounded};
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use vdesk_ids::DesktopId;

use crate::{
    error::{Error, Result},
    minimize::switch_keeping_minimized,
    retry::RetryPolicy,
    shell::{BackendFactory, EventSink, Shell, ShellEvent},
};

/// Unit of work executed on the worker thread.
struct Job {
    /// Operation name for logs.
    op: &'static str,
    /// Set by the caller once it stops waiting; the worker then skips the job.
    abandoned: Arc<AtomicBool>,
    /// The work itself.
    run: Box<dyn FnOnce(&mut Worker) + Send>,
}

/// Settings for an [`Interop`] worker.
#[derive(Clone, Debug)]
pub struct InteropCfg {
    /// Bound on every call before it fails with [`Error::ShellUnresponsive`].
    pub call_timeout: Duration,
    /// Backoff used while re-acquiring interfaces.
    pub retry: RetryPolicy,
    /// Initial keep-minimized setting.
    pub keep_minimized: bool,
}

impl Default for InteropCfg {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_millis(2000),
            retry: RetryPolicy::default(),
            keep_minimized: false,
        }
    }
}

/// Handle to the interop worker thread.
pub struct Interop {
    /// Job queue; `None` after shutdown.
    jobs: Mutex<Option<Sender<Job>>>,
    /// Bounded wait for each call.
    call_timeout: Duration,
    /// Keep-minimized toggle read at each desktop switch.
    keep_minimized: AtomicBool,
    /// Number of reconnects performed so far.
    restarts: Arc<AtomicU64>,
    /// Worker thread handle, joined on shutdown.
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Interop {
    /// Start a worker that creates backends with `factory` on first use.
    pub fn spawn(factory: BackendFactory, cfg: InteropCfg) -> Result<Self> {
        let (tx, rx) = unbounded::<Job>();
        let restarts = Arc::new(AtomicU64::new(0));
        let retry = cfg.retry;
        let counter = restarts.clone();
        let thread = thread::Builder::new()
            .name("vdesk-interop".into())
            .spawn(move || {
                // Backends are not `Send`; the worker and everything it owns
                // live and die on this thread.
                let mut worker = Worker {
                    factory,
                    backend: None,
                    sink: None,
                    retry,
                    restarts: counter,
                };
                while let Ok(job) = rx.recv() {
                    if job.abandoned.load(Ordering::SeqCst) {
                        debug!(op = job.op, "skipping abandoned shell call");
                        continue;
                    }
                    (job.run)(&mut worker);
                }
                debug!("interop worker exiting");
            })
            .map_err(|e| Error::Unavailable(format!("spawn interop worker: {e}")))?;
        Ok(Self {
            jobs: Mutex::new(Some(tx)),
            call_timeout: cfg.call_timeout,
            keep_minimized: AtomicBool::new(cfg.keep_minimized),
            restarts,
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Run `f` against the live backend on the worker thread.
    pub fn call<T, F>(&self, op: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: Fn(&dyn Shell) -> Result<T> + Send + 'static,
    {
        self.submit(op, move |worker| worker.with_backend(op, &f))
    }

    /// Register the sink that receives change notifications.
    ///
    /// The sink is re-registered automatically after every reconnect.
    pub fn watch(&self, sink: EventSink) -> Result<()> {
        self.submit("watch", move |worker| worker.watch(sink))
    }

    /// Drop the current backend and re-acquire every interface.
    pub fn restart(&self) -> Result<()> {
        self.submit("restart", Worker::reconnect)
    }

    /// Switch desktops, honouring the keep-minimized toggle.
    pub fn switch_desktop(&self, desktop: DesktopId) -> Result<()> {
        if self.keep_minimized() {
            self.call("switch_desktop", move |shell| {
                switch_keeping_minimized(shell, desktop).map(|_| ())
            })
        } else {
            self.call("switch_desktop", move |shell| shell.switch_desktop(desktop))
        }
    }

    /// Enable or disable keep-minimized switching.
    pub fn set_keep_minimized(&self, enabled: bool) {
        self.keep_minimized.store(enabled, Ordering::SeqCst);
    }

    /// Current keep-minimized setting.
    #[must_use]
    pub fn keep_minimized(&self) -> bool {
        self.keep_minimized.load(Ordering::SeqCst)
    }

    /// Number of reconnects performed since the worker started.
    #[must_use]
    pub fn restart_count(&self) -> u64 {
        self.restarts.load(Ordering::SeqCst)
    }

    /// Stop accepting jobs and wait briefly for the worker to exit.
    ///
    /// A worker stuck in a hung shell call is detached after `call_timeout`.
    pub fn shutdown(&self) {
        drop(self.jobs.lock().take());
        let Some(handle) = self.thread.lock().take() else {
            return;
        };
        let deadline = Instant::now() + self.call_timeout;
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                warn!("interop worker still busy at shutdown; detaching");
                return;
            }
            thread::sleep(Duration::from_millis(5));
        }
        if handle.join().is_err() {
            warn!("interop worker panicked");
        }
    }

    /// Queue `f` and wait for its reply within `call_timeout`.
    ///
    /// On timeout the job is marked abandoned. If it has not started yet it
    /// never reaches the shell.
    fn submit<T, F>(&self, op: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Worker) -> Result<T> + Send + 'static,
    {
        let (tx, rx) = bounded(1);
        let abandoned = Arc::new(AtomicBool::new(false));
        let job = Job {
            op,
            abandoned: abandoned.clone(),
            run: Box::new(move |worker| {
                if tx.send(f(worker)).is_err() {
                    debug!(op, "caller stopped waiting for shell call");
                }
            }),
        };
        let jobs = self.jobs.lock().clone().ok_or(Error::WorkerGone)?;
        jobs.send(job).map_err(|_| Error::WorkerGone)?;

        let start = Instant::now();
        match rx.recv_timeout(self.call_timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                abandoned.store(true, Ordering::SeqCst);
                let waited = start.elapsed();
                warn!(op, ?waited, "shell call unresponsive");
                Err(Error::ShellUnresponsive { op, waited })
            }
            Err(RecvTimeoutError::Disconnected) => Err(Error::WorkerGone),
        }
    }
}

impl Drop for Interop {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// State owned by the worker thread.
struct Worker {
    /// Creates fresh backends.
    factory: BackendFactory,
    /// Live backend, created lazily.
    backend: Option<Box<dyn Shell>>,
    /// Notification sink to re-register after reconnects.
    sink: Option<EventSink>,
    /// Backoff for connection attempts.
    retry: RetryPolicy,
    /// Shared reconnect counter.
    restarts: Arc<AtomicU64>,
}

impl Worker {
    /// Run `f`, reconnecting and retrying once on a restart-class failure.
    fn with_backend<T>(
        &mut self,
        op: &'static str,
        f: &dyn Fn(&dyn Shell) -> Result<T>,
    ) -> Result<T> {
        match self.run(f) {
            Err(e) if e.is_restart() => {
                warn!(op, "shell restarted; reconnecting");
                self.reconnect()?;
                match self.run(f) {
                    Err(e) if e.is_restart() => Err(Error::Unavailable(format!(
                        "{op}: shell restarted again during retry"
                    ))),
                    other => other,
                }
            }
            other => other,
        }
    }

    /// Run `f` against a connected backend.
    fn run<T>(&mut self, f: &dyn Fn(&dyn Shell) -> Result<T>) -> Result<T> {
        let shell = self.backend()?;
        f(shell)
    }

    /// The connected backend, creating or re-creating it as needed.
    fn backend(&mut self) -> Result<&dyn Shell> {
        match self.backend.as_ref().map(|b| b.is_connected()) {
            Some(true) => {}
            Some(false) => self.reconnect()?,
            None => self.connect()?,
        }
        self.backend.as_deref().ok_or(Error::WorkerGone)
    }

    /// Store `sink` and register it with the live backend.
    fn watch(&mut self, sink: EventSink) -> Result<()> {
        self.sink = Some(sink.clone());
        let Some(backend) = self.backend.as_mut() else {
            return self.connect();
        };
        match backend.watch(sink) {
            Err(e) if e.is_restart() => self.reconnect(),
            other => other,
        }
    }

    /// Drop the backend, connect again and announce the reconnect.
    fn reconnect(&mut self) -> Result<()> {
        self.backend = None;
        let restarts = self.restarts.fetch_add(1, Ordering::SeqCst) + 1;
        info!(restarts, "re-acquiring shell interfaces");
        self.connect()?;
        if let Some(sink) = &self.sink
            && sink.send(ShellEvent::Reconnected).is_err()
        {
            debug!("notification sink closed");
        }
        Ok(())
    }

    /// Create a backend, retrying with backoff.
    fn connect(&mut self) -> Result<()> {
        let mut last = None;
        for attempt in 0..self.retry.attempts() {
            if attempt > 0 {
                thread::sleep(self.retry.delay(attempt - 1));
            }
            let mut backend = match (self.factory)() {
                Ok(backend) => backend,
                Err(Error::Unsupported) => return Err(Error::Unsupported),
                Err(e) => {
                    debug!(attempt, error = %e, "shell backend creation failed");
                    last = Some(e);
                    continue;
                }
            };
            if let Some(sink) = &self.sink {
                match backend.watch(sink.clone()) {
                    Err(e) if e.is_restart() => {
                        debug!(attempt, "shell restarted while registering sink");
                        last = Some(e);
                        continue;
                    }
                    Err(e) => warn!(error = %e, "failed to register notification sink"),
                    Ok(()) => {}
                }
            }
            debug!(attempt, "shell backend ready");
            self.backend = Some(backend);
            return Ok(());
        }
        let reason = last.map_or_else(|| "no attempts".to_string(), |e| e.to_string());
        warn!(%reason, "giving up on shell connection");
        Err(Error::Unavailable(reason))
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        // Backends must be released on the worker thread.
        self.backend = None;
    }
}
