//! View exports: switcher state, focus and ordered window lists.

use std::slice;

use vdesk_core::{ViewFilter, WindowHandle};

use crate::state::{run, run_status};

/// 1 if the view of `hwnd` is listed in the task switcher, 0 if not, -1 on error.
#[unsafe(no_mangle)]
pub extern "C" fn ViewIsShownInSwitchers(hwnd: isize) -> i32 {
    run("ViewIsShownInSwitchers", -1, |a| {
        a.views()
            .is_shown_in_switchers(WindowHandle::new(hwnd))
            .map(i32::from)
    })
}

/// 1 if the view of `hwnd` is visible, 0 if cloaked, -1 on error.
#[unsafe(no_mangle)]
pub extern "C" fn ViewIsVisible(hwnd: isize) -> i32 {
    run("ViewIsVisible", -1, |a| {
        a.views().is_visible(WindowHandle::new(hwnd)).map(i32::from)
    })
}

/// Thumbnail window of the view of `hwnd`, or 0.
#[unsafe(no_mangle)]
pub extern "C" fn ViewGetThumbnailHwnd(hwnd: isize) -> isize {
    run("ViewGetThumbnailHwnd", 0, |a| {
        let thumb = a.views().thumbnail(WindowHandle::new(hwnd))?;
        Ok(thumb.map_or(0, WindowHandle::raw))
    })
}

/// The focused window, or 0.
#[unsafe(no_mangle)]
pub extern "C" fn ViewGetFocused() -> isize {
    run("ViewGetFocused", 0, |a| {
        Ok(a.views().focused()?.map_or(0, WindowHandle::raw))
    })
}

/// Focus `hwnd`. Returns an `HRESULT`.
#[unsafe(no_mangle)]
pub extern "C" fn ViewSetFocus(hwnd: isize) -> i32 {
    run_status("ViewSetFocus", |a| {
        a.views().set_focus(WindowHandle::new(hwnd))
    })
}

/// Switch to the desktop of `hwnd` and focus it. Returns an `HRESULT`.
#[unsafe(no_mangle)]
pub extern "C" fn ViewSwitchTo(hwnd: isize) -> i32 {
    run_status("ViewSwitchTo", |a| {
        a.views().switch_to(WindowHandle::new(hwnd))
    })
}

/// Last activation timestamp of the view of `hwnd`, or 0 when unknown.
#[unsafe(no_mangle)]
pub extern "C" fn ViewGetLastActivationTimestamp(hwnd: isize) -> u64 {
    run("ViewGetLastActivationTimestamp", 0, |a| {
        Ok(a
            .views()
            .last_activation(WindowHandle::new(hwnd))?
            .unwrap_or(0))
    })
}

/// Fill `windows` with view windows front-to-back.
///
/// Returns the number written, or 0 when `windows` is null or the filtered
/// list does not fit in `count`.
///
/// # Safety
///
/// `windows` must be null or valid for writes of `count` handles.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ViewGetByZOrder(
    windows: *mut isize,
    count: u32,
    only_switcher_windows: i32,
    only_current_desktop: i32,
) -> u32 {
    let filter = filter(only_switcher_windows, only_current_desktop);
    let handles = run("ViewGetByZOrder", Vec::new(), |a| {
        a.views().by_z_order(filter)
    });
    // SAFETY: forwarded from the caller's contract.
    unsafe { fill(windows, count, &handles) }
}

/// Fill `windows` with view windows, most recently activated first.
///
/// Returns the number written, or 0 when `windows` is null or the filtered
/// list does not fit in `count`.
///
/// # Safety
///
/// `windows` must be null or valid for writes of `count` handles.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn ViewGetByLastActivationOrder(
    windows: *mut isize,
    count: u32,
    only_switcher_windows: i32,
    only_current_desktop: i32,
) -> u32 {
    let filter = filter(only_switcher_windows, only_current_desktop);
    let handles = run("ViewGetByLastActivationOrder", Vec::new(), |a| {
        a.views().by_activation_order(filter)
    });
    // SAFETY: forwarded from the caller's contract.
    unsafe { fill(windows, count, &handles) }
}

/// Filter from C `BOOL` flags.
const fn filter(only_switcher_windows: i32, only_current_desktop: i32) -> ViewFilter {
    ViewFilter {
        switcher_only: only_switcher_windows != 0,
        current_desktop_only: only_current_desktop != 0,
    }
}

/// Copy `handles` into a caller buffer of `capacity` slots.
///
/// # Safety
///
/// `buffer` must be null or valid for writes of `capacity` handles.
unsafe fn fill(buffer: *mut isize, capacity: u32, handles: &[WindowHandle]) -> u32 {
    let (Ok(capacity), Ok(written)) = (usize::try_from(capacity), u32::try_from(handles.len()))
    else {
        return 0;
    };
    if buffer.is_null() || handles.len() > capacity {
        return 0;
    }
    // SAFETY: the caller guarantees `capacity` writable slots.
    let out = unsafe { slice::from_raw_parts_mut(buffer, capacity) };
    for (slot, handle) in out.iter_mut().zip(handles) {
        *slot = handle.raw();
    }
    written
}
