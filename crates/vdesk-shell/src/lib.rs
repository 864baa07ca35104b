//! vdesk-shell: the only layer that talks to the shell's desktop manager.
//!
//! - [`Shell`]: one method per primitive query or mutation.
//! - [`Interop`]: worker thread owning the backend, with bounded waits and
//!   transparent reconnects after a shell restart.
//! - [`MockShell`] (feature `test-utils`): scriptable in-memory backend.
#![warn(missing_docs)]

mod error;
mod interop;
mod minimize;
#[cfg(any(test, feature = "test-utils"))]
mod mock;
mod retry;
mod shell;
#[cfg(windows)]
mod win;

pub use error::{Error, ErrorKind, Result, status};
pub use interop::{Interop, InteropCfg};
pub use minimize::switch_keeping_minimized;
#[cfg(any(test, feature = "test-utils"))]
pub use mock::MockShell;
pub use retry::RetryPolicy;
pub use shell::{BackendFactory, DesktopRecord, EventSink, Shell, ShellEvent, ViewRecord};
pub use vdesk_ids::{DesktopId, WindowHandle};

/// Factory for the platform's native backend.
///
/// On platforms without virtual desktop support every creation fails with
/// [`Error::Unsupported`].
#[must_use]
pub fn system_backend() -> BackendFactory {
    #[cfg(windows)]
    {
        Box::new(|| win::WinShell::connect().map(|shell| Box::new(shell) as Box<dyn Shell>))
    }
    #[cfg(not(windows))]
    {
        Box::new(|| Err(Error::Unsupported))
    }
}
