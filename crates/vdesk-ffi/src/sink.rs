//! Delivery of change messages to listener windows.

use std::sync::Arc;

use vdesk_core::MessageSink;
#[cfg(not(windows))]
use vdesk_core::NullSink;
#[cfg(windows)]
use vdesk_core::WindowHandle;
#[cfg(windows)]
use windows::Win32::{
    Foundation::{HWND, LPARAM, WPARAM},
    UI::WindowsAndMessaging::PostMessageW,
};

/// Posts messages to a window's queue with `PostMessageW`.
#[cfg(windows)]
#[derive(Clone, Copy, Debug, Default)]
struct PostMessageSink;

#[cfg(windows)]
impl MessageSink for PostMessageSink {
    fn post(&self, target: WindowHandle, msg: u32, wparam: usize, lparam: isize) -> bool {
        // SAFETY: PostMessageW only queues the message; a stale handle makes it fail.
        unsafe { PostMessageW(HWND(target.raw()), msg, WPARAM(wparam), LPARAM(lparam)) }.as_bool()
    }
}

/// The sink used by the process-wide accessor. Without a window system
/// nothing can be posted.
pub fn system() -> Arc<dyn MessageSink> {
    #[cfg(windows)]
    {
        Arc::new(PostMessageSink)
    }
    #[cfg(not(windows))]
    {
        Arc::new(NullSink)
    }
}
