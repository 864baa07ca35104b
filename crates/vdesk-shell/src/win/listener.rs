//! Notification listener thread.
//!
//! The shell delivers desktop notifications through a message loop, so the
//! listener owns a thread that registers a notification object, pumps
//! messages, and probes the shell every few seconds. A failed probe means the
//! shell restarted; the listener reports [`ShellEvent::Disconnected`] and
//! exits.

use std::{
    ffi::c_void,
    mem::{ManuallyDrop, transmute_copy},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_channel::bounded;
use tracing::{debug, trace, warn};
use windows::{
    Win32::{
        Foundation::{BOOL, HWND, LPARAM, WPARAM},
        System::Threading::GetCurrentThreadId,
        UI::WindowsAndMessaging::{
            DispatchMessageW, GetMessageW, KillTimer, MSG, PostThreadMessageW, SetTimer,
            TranslateMessage, WM_QUIT, WM_TIMER,
        },
    },
    core::{HRESULT, HSTRING, Vtable, implement},
};

use super::{
    backend::{Apartment, Services, borrow, desktop_id},
    interfaces::*,
};
use crate::{
    error::{Error, Result},
    shell::{EventSink, ShellEvent},
};

/// Interval between liveness probes.
const PROBE_INTERVAL: Duration = Duration::from_secs(3);

/// Running listener thread.
pub struct Listener {
    /// Native id of the listener thread, for posting `WM_QUIT`.
    thread_id: u32,
    /// Cleared when the loop exits.
    alive: Arc<AtomicBool>,
    /// Join handle.
    handle: Option<JoinHandle<()>>,
}

impl Listener {
    /// Spawn the thread and wait until the notification object is registered.
    pub fn start(sink: EventSink) -> Result<Self> {
        let alive = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = bounded::<Result<u32>>(1);
        let thread_alive = alive.clone();
        let handle = thread::Builder::new()
            .name("vdesk-listener".into())
            .spawn(move || {
                run(&sink, &ready_tx);
                thread_alive.store(false, Ordering::SeqCst);
            })
            .map_err(|e| Error::Unavailable(format!("spawn listener: {e}")))?;
        let thread_id = ready_rx.recv().map_err(|_| Error::WorkerGone)??;
        Ok(Self {
            thread_id,
            alive,
            handle: Some(handle),
        })
    }

    /// False once the message loop has exited.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        if self.is_alive() {
            unsafe { PostThreadMessageW(self.thread_id, WM_QUIT, WPARAM(0), LPARAM(0)) };
        }
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            warn!("listener thread panicked");
        }
    }
}

/// Thread body: register, pump messages, unregister.
fn run(sink: &EventSink, ready: &crossbeam_channel::Sender<Result<u32>>) {
    let _apartment = Apartment::enter();
    let services = match Services::acquire() {
        Ok(services) => services,
        Err(e) => {
            ready.send(Err(e)).ok();
            return;
        }
    };
    let notification: IVirtualDesktopNotification = Notifier { sink: sink.clone() }.into();
    let mut cookie = 0u32;
    let hr = unsafe {
        services
            .notifications
            .register(notification.as_raw(), &mut cookie)
    };
    if let Err(e) = super::backend::check("register_notification", hr, None) {
        ready.send(Err(e)).ok();
        return;
    }
    ready.send(Ok(unsafe { GetCurrentThreadId() })).ok();
    debug!(cookie, "desktop notifications registered");

    let timer = unsafe { SetTimer(HWND(0), 0, PROBE_INTERVAL.as_millis() as u32, None) };
    let mut msg = MSG::default();
    while unsafe { GetMessageW(&mut msg, HWND(0), 0, 0) }.as_bool() {
        if msg.message == WM_TIMER {
            if let Err(e) = services.count() {
                if e.is_restart() {
                    warn!("shell connection lost");
                    sink.send(ShellEvent::Disconnected).ok();
                    break;
                }
                trace!(error = %e, "liveness probe failed");
            }
            continue;
        }
        unsafe {
            TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }
    }
    unsafe { KillTimer(HWND(0), timer) };
    let hr = unsafe { services.notifications.unregister(cookie) };
    if hr.is_err() {
        debug!(code = hr.0, "unregister notification failed");
    }
}

/// Notification object registered with the shell.
#[implement(IVirtualDesktopNotification)]
struct Notifier {
    /// Destination for translated events.
    sink: EventSink,
}

impl Notifier {
    /// Send `event`, ignoring a closed sink.
    fn send(&self, event: ShellEvent) -> HRESULT {
        trace!(?event, "shell notification");
        self.sink.send(event).ok();
        HRESULT(0)
    }

    /// Identifier of a borrowed desktop pointer.
    fn id(raw: *mut c_void) -> Option<vdesk_ids::DesktopId> {
        borrow::<IVirtualDesktop>(raw).and_then(|d| desktop_id(&d).ok())
    }

    /// Identifiers of a destroyed/fallback pair.
    fn pair(
        destroyed: *mut c_void,
        fallback: *mut c_void,
    ) -> Option<(vdesk_ids::DesktopId, vdesk_ids::DesktopId)> {
        Some((Self::id(destroyed)?, Self::id(fallback)?))
    }
}

impl IVirtualDesktopNotification_Impl for Notifier {
    unsafe fn virtual_desktop_created(&self, desktop: *mut c_void) -> HRESULT {
        match Self::id(desktop) {
            Some(id) => self.send(ShellEvent::DesktopCreated(id)),
            None => HRESULT(0),
        }
    }

    unsafe fn virtual_desktop_destroy_begin(
        &self,
        destroyed: *mut c_void,
        fallback: *mut c_void,
    ) -> HRESULT {
        match Self::pair(destroyed, fallback) {
            Some((destroyed, fallback)) => {
                self.send(ShellEvent::DesktopDestroyBegin { destroyed, fallback })
            }
            None => HRESULT(0),
        }
    }

    unsafe fn virtual_desktop_destroy_failed(
        &self,
        destroyed: *mut c_void,
        fallback: *mut c_void,
    ) -> HRESULT {
        match Self::pair(destroyed, fallback) {
            Some((destroyed, fallback)) => {
                self.send(ShellEvent::DesktopDestroyFailed { destroyed, fallback })
            }
            None => HRESULT(0),
        }
    }

    unsafe fn virtual_desktop_destroyed(
        &self,
        destroyed: *mut c_void,
        fallback: *mut c_void,
    ) -> HRESULT {
        match Self::pair(destroyed, fallback) {
            Some((destroyed, fallback)) => {
                self.send(ShellEvent::DesktopDestroyed { destroyed, fallback })
            }
            None => HRESULT(0),
        }
    }

    unsafe fn virtual_desktop_is_per_monitor_changed(&self, _per_monitor: BOOL) -> HRESULT {
        HRESULT(0)
    }

    unsafe fn virtual_desktop_moved(
        &self,
        desktop: *mut c_void,
        old_index: i64,
        new_index: i64,
    ) -> HRESULT {
        match Self::id(desktop) {
            Some(desktop) => self.send(ShellEvent::DesktopMoved {
                desktop,
                from: usize::try_from(old_index).unwrap_or(0),
                to: usize::try_from(new_index).unwrap_or(0),
            }),
            None => HRESULT(0),
        }
    }

    unsafe fn virtual_desktop_name_changed(&self, desktop: *mut c_void, name: *mut c_void) -> HRESULT {
        // SAFETY: the shell passes a borrowed HSTRING handle.
        let name: ManuallyDrop<HSTRING> = ManuallyDrop::new(unsafe { transmute_copy(&name) });
        match Self::id(desktop) {
            Some(desktop) => self.send(ShellEvent::DesktopRenamed {
                desktop,
                name: name.to_string_lossy(),
            }),
            None => HRESULT(0),
        }
    }

    unsafe fn view_virtual_desktop_changed(&self, view: *mut c_void) -> HRESULT {
        let Some(view) = borrow::<IApplicationView>(view) else {
            return HRESULT(0);
        };
        let mut hwnd = HWND(0);
        if unsafe { view.get_thumbnail_window(&mut hwnd) }.is_ok() && hwnd.0 != 0 {
            return self.send(ShellEvent::ViewChanged(vdesk_ids::WindowHandle::new(hwnd.0)));
        }
        HRESULT(0)
    }

    unsafe fn current_virtual_desktop_changed(&self, old: *mut c_void, new: *mut c_void) -> HRESULT {
        match Self::id(new) {
            Some(new) => self.send(ShellEvent::CurrentChanged {
                old: Self::id(old),
                new,
            }),
            None => HRESULT(0),
        }
    }
}
