//! Desktop enumeration, switching and lifecycle exports.

use std::{
    ffi::{CStr, c_char},
    ptr,
};

use vdesk_core::DesktopId;

use crate::state::{int, number, run};

/// Number of desktops, or -1.
#[unsafe(no_mangle)]
pub extern "C" fn GetDesktopCount() -> i32 {
    run("GetDesktopCount", -1, |a| a.registry().count().map(int))
}

/// Number of the current desktop, or -1.
#[unsafe(no_mangle)]
pub extern "C" fn GetCurrentDesktopNumber() -> i32 {
    run("GetCurrentDesktopNumber", -1, |a| {
        a.registry().current_number().map(int)
    })
}

/// Request a switch to desktop `desktop_number`: 1 once requested, -1 on error.
#[unsafe(no_mangle)]
pub extern "C" fn GoToDesktopNumber(desktop_number: i32) -> i32 {
    run("GoToDesktopNumber", -1, |a| {
        a.registry().switch_to(number(desktop_number)?).map(|()| 1)
    })
}

/// Identifier of desktop `desktop_number`, or the nil identifier.
#[unsafe(no_mangle)]
pub extern "C" fn GetDesktopIdByNumber(desktop_number: i32) -> DesktopId {
    run("GetDesktopIdByNumber", DesktopId::NIL, |a| {
        a.registry().id_by_number(number(desktop_number)?)
    })
}

/// Number of the desktop identified by `desktop_id`, or -1.
#[unsafe(no_mangle)]
pub extern "C" fn GetDesktopNumberById(desktop_id: DesktopId) -> i32 {
    run("GetDesktopNumberById", -1, |a| {
        a.registry().number_by_id(desktop_id).map(int)
    })
}

/// Append a desktop and return its number, or -1.
#[unsafe(no_mangle)]
pub extern "C" fn CreateDesktop() -> i32 {
    run("CreateDesktop", -1, |a| a.registry().create().map(int))
}

/// Remove a desktop, moving its windows to `fallback_desktop_number`.
/// Returns 1 on success and -1 on error, including when both numbers match.
#[unsafe(no_mangle)]
pub extern "C" fn RemoveDesktop(remove_desktop_number: i32, fallback_desktop_number: i32) -> i32 {
    run("RemoveDesktop", -1, |a| {
        a.registry()
            .remove(
                number(remove_desktop_number)?,
                number(fallback_desktop_number)?,
            )
            .map(|()| 1)
    })
}

/// Copy the name of desktop `desktop_number` into `out_utf8_ptr` as a
/// NUL-terminated UTF-8 string. Unnamed desktops yield an empty string.
///
/// Returns 1 when the name was written, -1 when the buffer is null or too
/// small, and 0 when the desktop could not be read.
///
/// # Safety
///
/// `out_utf8_ptr` must be null or valid for writes of `out_utf8_len` bytes.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn GetDesktopName(
    desktop_number: i32,
    out_utf8_ptr: *mut u8,
    out_utf8_len: usize,
) -> i32 {
    let Some(name) = run("GetDesktopName", None, |a| {
        a.registry()
            .name(number(desktop_number)?)
            .map(|name| Some(name.unwrap_or_default()))
    }) else {
        return 0;
    };
    let bytes = name.as_bytes();
    if out_utf8_ptr.is_null() || bytes.len() >= out_utf8_len {
        return -1;
    }
    // SAFETY: the caller guarantees `out_utf8_len` writable bytes and the
    // name plus terminator fits.
    unsafe {
        ptr::copy_nonoverlapping(bytes.as_ptr(), out_utf8_ptr, bytes.len());
        out_utf8_ptr.add(bytes.len()).write(0);
    }
    1
}

/// Rename desktop `desktop_number` from a NUL-terminated UTF-8 string.
/// Invalid UTF-8 is replaced. Returns 1 on success and -1 on error.
///
/// # Safety
///
/// `in_name_ptr` must be null or point to a NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn SetDesktopName(desktop_number: i32, in_name_ptr: *const c_char) -> i32 {
    if in_name_ptr.is_null() {
        return -1;
    }
    // SAFETY: non-null and NUL-terminated per the caller's contract.
    let name = unsafe { CStr::from_ptr(in_name_ptr) }.to_string_lossy();
    run("SetDesktopName", -1, |a| {
        a.registry()
            .rename(number(desktop_number)?, &name)
            .map(|()| 1)
    })
}
