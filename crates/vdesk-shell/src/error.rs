//! Error types for shell interop.

use std::{result, time::Duration};

use thiserror::Error;
use vdesk_ids::{DesktopId, WindowHandle};

/// Result alias for shell operations.
pub type Result<T> = result::Result<T, Error>;

/// Coarse classification of an [`Error`], used by callers that only need to
/// pick a status code or decide whether to retry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Unknown window or desktop.
    NotFound,
    /// Out-of-range desktop number or otherwise invalid input.
    InvalidArgument,
    /// A shell call exceeded its bounded wait.
    ShellUnresponsive,
    /// The shell process restarted and interface pointers went stale.
    ShellRestarted,
    /// No usable backend could be created.
    Unavailable,
    /// Any other failure reported by the shell.
    Failed,
}

/// Errors raised by shell backends and the interop worker.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    /// The shell has no record of the window.
    #[error("window {0} not found")]
    WindowNotFound(WindowHandle),

    /// The shell has no desktop with this identifier.
    #[error("desktop {0} not found")]
    DesktopNotFound(DesktopId),

    /// No desktop has this number.
    #[error("no desktop number {number} (count {count})")]
    NoSuchNumber {
        /// Requested number.
        number: i64,
        /// Number of desktops at the time of the call.
        count: usize,
    },

    /// A desktop number was outside `0..count` where a valid number is required.
    #[error("desktop number {number} out of range (count {count})")]
    InvalidNumber {
        /// Requested number.
        number: i64,
        /// Number of desktops at the time of the call.
        count: usize,
    },

    /// Generic invalid input.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The worker did not answer within the configured bound.
    #[error("shell call {op} unresponsive after {waited:?}")]
    ShellUnresponsive {
        /// Operation name.
        op: &'static str,
        /// Time spent waiting.
        waited: Duration,
    },

    /// Interface pointers were invalidated by a shell restart.
    #[error("shell restarted")]
    ShellRestarted,

    /// No backend could be created.
    #[error("shell unavailable: {0}")]
    Unavailable(String),

    /// A shell call failed with a status code.
    #[error("shell call {op} failed: {code:#010x}")]
    Call {
        /// Operation name.
        op: &'static str,
        /// Raw status code.
        code: u32,
    },

    /// The interop worker thread has exited.
    #[error("interop worker gone")]
    WorkerGone,

    /// No backend exists for this platform.
    #[error("virtual desktops are not supported on this platform")]
    Unsupported,
}

impl Error {
    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::WindowNotFound(_) | Self::DesktopNotFound(_) | Self::NoSuchNumber { .. } => {
                ErrorKind::NotFound
            }
            Self::InvalidNumber { .. } | Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::ShellUnresponsive { .. } => ErrorKind::ShellUnresponsive,
            Self::ShellRestarted => ErrorKind::ShellRestarted,
            Self::Unavailable(_) | Self::WorkerGone | Self::Unsupported => ErrorKind::Unavailable,
            Self::Call { .. } => ErrorKind::Failed,
        }
    }

    /// True when the failure means the backend must be re-created.
    #[must_use]
    pub fn is_restart(&self) -> bool {
        matches!(self, Self::ShellRestarted)
    }

    /// Status code reported across the C ABI for this error.
    #[must_use]
    pub fn status_code(&self) -> u32 {
        match self {
            Self::Call { code, .. } => *code,
            Self::WindowNotFound(_) | Self::DesktopNotFound(_) | Self::NoSuchNumber { .. } => {
                status::ELEMENT_NOT_FOUND
            }
            Self::InvalidNumber { .. } | Self::InvalidArgument(_) => status::E_INVALIDARG,
            Self::ShellUnresponsive { .. } => status::RPC_E_TIMEOUT,
            Self::ShellRestarted => status::RPC_S_SERVER_UNAVAILABLE,
            Self::Unavailable(_) | Self::WorkerGone | Self::Unsupported => status::E_FAIL,
        }
    }
}

/// Status codes the shell reports, and the classification applied to them.
pub mod status {
    use vdesk_ids::WindowHandle;

    use super::Error;

    /// Operation succeeded.
    pub const S_OK: u32 = 0;
    /// Unspecified failure.
    pub const E_FAIL: u32 = 0x8000_4005;
    /// Invalid argument.
    pub const E_INVALIDARG: u32 = 0x8007_0057;
    /// Class not registered: the shell has not published its objects yet.
    pub const CLASS_NOT_REGISTERED: u32 = 0x8004_0154;
    /// The RPC server is unavailable: the shell process is gone.
    pub const RPC_S_SERVER_UNAVAILABLE: u32 = 0x8007_06BA;
    /// Object is not connected to its server.
    pub const OBJECT_NOT_CONNECTED: u32 = 0x8004_01FD;
    /// Element not found: reported for unknown windows.
    pub const ELEMENT_NOT_FOUND: u32 = 0x8002_802B;
    /// The calling thread has not initialized the component runtime.
    pub const NOT_INITIALIZED: u32 = 0x8004_01F0;
    /// Call timed out.
    pub const RPC_E_TIMEOUT: u32 = 0x8001_011F;

    /// True for codes that mean every interface pointer is stale.
    #[must_use]
    pub const fn is_restart(code: u32) -> bool {
        matches!(
            code,
            CLASS_NOT_REGISTERED | RPC_S_SERVER_UNAVAILABLE | OBJECT_NOT_CONNECTED | NOT_INITIALIZED
        )
    }

    /// Map a failed status code from operation `op` to an [`Error`].
    ///
    /// `window` is the handle the call was about, if any.
    #[must_use]
    pub fn to_error(op: &'static str, code: u32, window: Option<WindowHandle>) -> Error {
        if is_restart(code) {
            return Error::ShellRestarted;
        }
        match (code, window) {
            (ELEMENT_NOT_FOUND, Some(w)) => Error::WindowNotFound(w),
            _ => Error::Call { op, code },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restart_codes_map_to_restarted() {
        for code in [
            status::CLASS_NOT_REGISTERED,
            status::RPC_S_SERVER_UNAVAILABLE,
            status::OBJECT_NOT_CONNECTED,
        ] {
            let err = status::to_error("op", code, None);
            assert!(err.is_restart(), "{code:#x}");
            assert_eq!(err.kind(), ErrorKind::ShellRestarted);
        }
    }

    #[test]
    fn element_not_found_names_the_window() {
        let w = WindowHandle::new(42);
        assert_eq!(
            status::to_error("view", status::ELEMENT_NOT_FOUND, Some(w)),
            Error::WindowNotFound(w)
        );
        assert_eq!(
            status::to_error("view", status::ELEMENT_NOT_FOUND, None).kind(),
            ErrorKind::Failed
        );
    }

    #[test]
    fn status_code_preserves_raw_codes() {
        let err = Error::Call {
            op: "switch",
            code: 0x8000_FFFF,
        };
        assert_eq!(err.status_code(), 0x8000_FFFF);
        assert_eq!(
            Error::InvalidNumber {
                number: 9,
                count: 2
            }
            .kind(),
            ErrorKind::InvalidArgument
        );
    }
}
