//! Process-wide accessor behind the C surface.
//!
//! The accessor is created on the first exported call and lives until
//! `ShutdownVirtualDesktopAccessor`. A failed start leaves the slot empty so
//! the next call tries again.

use std::{
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::{debug, error};
use vdesk_core::{Accessor, AccessorCfg, Error, Result, status};

use crate::sink;

/// The running accessor, if any.
static ACCESSOR: Lazy<Mutex<Option<Arc<Accessor>>>> = Lazy::new(|| {
    logging::init_from_env();
    Mutex::new(None)
});

/// The running accessor, starting one over the system shell if needed.
fn accessor() -> Result<Arc<Accessor>> {
    let mut slot = ACCESSOR.lock();
    if let Some(accessor) = slot.as_ref() {
        return Ok(accessor.clone());
    }
    let accessor = Arc::new(Accessor::spawn(
        vdesk_shell::system_backend(),
        AccessorCfg::default(),
        sink::system(),
    )?);
    debug!("accessor created on first use");
    *slot = Some(accessor.clone());
    Ok(accessor)
}

/// Stop and drop the running accessor. Calls in flight finish with an error.
pub fn shutdown() {
    let accessor = ACCESSOR.lock().take();
    if let Some(accessor) = accessor {
        accessor.shutdown();
    }
}

/// Replace the running accessor with `accessor`.
#[cfg(test)]
pub fn install(accessor: Accessor) {
    let old = ACCESSOR.lock().replace(Arc::new(accessor));
    if let Some(old) = old {
        old.shutdown();
    }
}

/// Run `f` against the accessor, mapping any failure to `fallback`.
///
/// Errors are logged at debug level; panics are caught and logged so they
/// never unwind into the caller.
pub fn run<T>(op: &'static str, fallback: T, f: impl FnOnce(&Accessor) -> Result<T>) -> T {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| f(&*accessor()?)));
    match outcome {
        Ok(Ok(value)) => value,
        Ok(Err(e)) => {
            debug!(op, error = %e, "call failed");
            fallback
        }
        Err(_) => {
            error!(op, "panic stopped at the C boundary");
            fallback
        }
    }
}

/// Like [`run`], reporting the outcome as an `HRESULT`.
pub fn run_status(op: &'static str, f: impl FnOnce(&Accessor) -> Result<()>) -> i32 {
    let code = run(op, status::E_FAIL, |accessor| {
        Ok(match f(accessor) {
            Ok(()) => status::S_OK,
            Err(e) => {
                debug!(op, error = %e, "call failed");
                e.status_code()
            }
        })
    });
    code as i32
}

/// `value` as a C `int`, saturating.
pub fn int(value: usize) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

/// A desktop number received over the C ABI; negative numbers are rejected.
pub fn number(raw: i32) -> Result<usize> {
    usize::try_from(raw).map_err(|_| Error::InvalidArgument(format!("desktop number {raw}")))
}
