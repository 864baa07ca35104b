//! C ABI for the virtual desktop accessor.
//!
//! Every export runs against one process-wide accessor that is started on the
//! first call and stopped by [`ShutdownVirtualDesktopAccessor`]. Failures are
//! reported through the sentinel of each return type (-1, 0, the nil
//! identifier or an `HRESULT`); nothing unwinds across the boundary.
#![warn(missing_docs)]
#![allow(non_snake_case)]

mod desktop;
mod sink;
mod state;
mod view;
mod window;

use vdesk_core::WindowHandle;

pub use crate::{desktop::*, view::*, window::*};

/// Post change messages to `listener_hwnd` at `message_offset + code`.
/// Registering again replaces the offset. Returns 1, or -1 on error.
#[unsafe(no_mangle)]
pub extern "C" fn RegisterPostMessageHook(listener_hwnd: isize, message_offset: u32) -> i32 {
    state::run("RegisterPostMessageHook", -1, |a| {
        a.register_hook(WindowHandle::new(listener_hwnd), message_offset);
        Ok(1)
    })
}

/// Stop posting to `listener_hwnd`. Unknown listeners are ignored.
/// Returns 1, or -1 on error.
#[unsafe(no_mangle)]
pub extern "C" fn UnregisterPostMessageHook(listener_hwnd: isize) -> i32 {
    state::run("UnregisterPostMessageHook", -1, |a| {
        a.unregister_hook(WindowHandle::new(listener_hwnd));
        Ok(1)
    })
}

/// Re-minimize windows the shell restores when switching desktops.
#[unsafe(no_mangle)]
pub extern "C" fn EnableKeepMinimized() {
    state::run("EnableKeepMinimized", (), |a| {
        a.set_keep_minimized(true);
        Ok(())
    });
}

/// Let the shell restore minimized windows on switch again.
#[unsafe(no_mangle)]
pub extern "C" fn RestoreMinimized() {
    state::run("RestoreMinimized", (), |a| {
        a.set_keep_minimized(false);
        Ok(())
    });
}

/// Re-acquire every shell interface, for use after the shell restarted.
#[unsafe(no_mangle)]
pub extern "C" fn RestartVirtualDesktopAccessor() {
    state::run("RestartVirtualDesktopAccessor", (), |a| a.restart());
}

/// Stop the accessor and release the shell. The next call starts a new one.
#[unsafe(no_mangle)]
pub extern "C" fn ShutdownVirtualDesktopAccessor() {
    state::shutdown();
}
