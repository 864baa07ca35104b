//! Desktop switches that leave minimized windows minimized.
//!
//! Switching desktops makes the shell restore minimized windows on the
//! target desktop. With keep-minimized enabled the switch records which views
//! were minimized beforehand and minimizes again any the shell restored.

use tracing::debug;
use vdesk_ids::{DesktopId, WindowHandle};

use crate::{
    error::{Error, Result},
    shell::Shell,
};

/// Switch to `target`, then re-minimize windows the switch restored.
///
/// Returns the number of windows that had to be minimized again. Windows that
/// vanish during the switch are skipped.
pub fn switch_keeping_minimized(shell: &dyn Shell, target: DesktopId) -> Result<usize> {
    let minimized: Vec<WindowHandle> = shell
        .views()?
        .into_iter()
        .filter(|v| v.minimized && v.desktop == target)
        .map(|v| v.window)
        .collect();
    shell.switch_desktop(target)?;

    let mut restored = 0;
    for window in minimized {
        match shell.view(window) {
            Ok(view) if !view.minimized => {
                shell.minimize(window)?;
                restored += 1;
            }
            Ok(_) | Err(Error::WindowNotFound(_)) => {}
            Err(e) => return Err(e),
        }
    }
    if restored > 0 {
        debug!(target = %target, restored, "re-minimized windows after switch");
    }
    Ok(restored)
}
