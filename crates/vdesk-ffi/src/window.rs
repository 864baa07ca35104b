//! Window placement and pin exports. Window handles cross the ABI as raw
//! `HWND` values.

use vdesk_core::{DesktopId, WindowHandle};

use crate::state::{int, number, run};

/// Identifier of the desktop showing `hwnd`, or the nil identifier.
#[unsafe(no_mangle)]
pub extern "C" fn GetWindowDesktopId(hwnd: isize) -> DesktopId {
    run("GetWindowDesktopId", DesktopId::NIL, |a| {
        a.index().desktop_of(WindowHandle::new(hwnd))
    })
}

/// Number of the desktop showing `hwnd`, or -1.
#[unsafe(no_mangle)]
pub extern "C" fn GetWindowDesktopNumber(hwnd: isize) -> i32 {
    run("GetWindowDesktopNumber", -1, |a| {
        a.index().number_of(WindowHandle::new(hwnd)).map(int)
    })
}

/// 1 if `hwnd` is on the current desktop, 0 if not, -1 on error.
#[unsafe(no_mangle)]
pub extern "C" fn IsWindowOnCurrentVirtualDesktop(hwnd: isize) -> i32 {
    run("IsWindowOnCurrentVirtualDesktop", -1, |a| {
        a.index().is_on_current(WindowHandle::new(hwnd)).map(i32::from)
    })
}

/// 1 if `hwnd` is on desktop `desktop_number`, 0 if not, -1 on error.
#[unsafe(no_mangle)]
pub extern "C" fn IsWindowOnDesktopNumber(hwnd: isize, desktop_number: i32) -> i32 {
    run("IsWindowOnDesktopNumber", -1, |a| {
        a.index()
            .is_on_number(WindowHandle::new(hwnd), number(desktop_number)?)
            .map(i32::from)
    })
}

/// Move `hwnd` to desktop `desktop_number`: 1 when requested, 0 when the
/// window has no view, -1 on error.
#[unsafe(no_mangle)]
pub extern "C" fn MoveWindowToDesktopNumber(hwnd: isize, desktop_number: i32) -> i32 {
    run("MoveWindowToDesktopNumber", -1, |a| {
        a.index()
            .move_to(WindowHandle::new(hwnd), number(desktop_number)?)
            .map(i32::from)
    })
}

/// 1 if `hwnd` is pinned to every desktop, 0 if not, -1 on error.
#[unsafe(no_mangle)]
pub extern "C" fn IsPinnedWindow(hwnd: isize) -> i32 {
    run("IsPinnedWindow", -1, |a| {
        a.index()
            .is_pinned_window(WindowHandle::new(hwnd))
            .map(i32::from)
    })
}

/// Pin `hwnd` to every desktop: 1 on success, -1 on error.
#[unsafe(no_mangle)]
pub extern "C" fn PinWindow(hwnd: isize) -> i32 {
    run("PinWindow", -1, |a| {
        a.index().pin_window(WindowHandle::new(hwnd)).map(|()| 1)
    })
}

/// Undo [`PinWindow`]: 1 on success, -1 on error.
#[unsafe(no_mangle)]
pub extern "C" fn UnPinWindow(hwnd: isize) -> i32 {
    run("UnPinWindow", -1, |a| {
        a.index().unpin_window(WindowHandle::new(hwnd)).map(|()| 1)
    })
}

/// 1 if the application owning `hwnd` is pinned, 0 if not, -1 on error.
#[unsafe(no_mangle)]
pub extern "C" fn IsPinnedApp(hwnd: isize) -> i32 {
    run("IsPinnedApp", -1, |a| {
        a.index().is_pinned_app(WindowHandle::new(hwnd)).map(i32::from)
    })
}

/// Pin every window of the application owning `hwnd`: 1 on success, -1 on error.
#[unsafe(no_mangle)]
pub extern "C" fn PinApp(hwnd: isize) -> i32 {
    run("PinApp", -1, |a| {
        a.index().pin_app(WindowHandle::new(hwnd)).map(|()| 1)
    })
}

/// Undo [`PinApp`]: 1 on success, -1 on error.
#[unsafe(no_mangle)]
pub extern "C" fn UnPinApp(hwnd: isize) -> i32 {
    run("UnPinApp", -1, |a| {
        a.index().unpin_app(WindowHandle::new(hwnd)).map(|()| 1)
    })
}
