//! [`Shell`] implementation over the shell's desktop-management interfaces.

use std::{cell::Cell, ffi::c_void, mem::ManuallyDrop, ptr};

use tracing::{debug, warn};
use vdesk_ids::{DesktopId, WindowHandle};
use windows::{
    Win32::{
        Foundation::{BOOL, HWND},
        System::Com::{
            CLSCTX_ALL, COINIT_APARTMENTTHREADED, CoCreateInstance, CoInitializeEx,
            CoTaskMemFree, CoUninitialize, IServiceProvider,
        },
        UI::{
            Shell::{Common::IObjectArray, IVirtualDesktopManager, VirtualDesktopManager},
            WindowsAndMessaging::{IsIconic, SW_SHOWMINNOACTIVE, ShowWindow},
        },
    },
    core::{GUID, HRESULT, HSTRING, Interface, PCWSTR, PWSTR, Vtable},
};

use super::{interfaces::*, listener::Listener};
use crate::{
    error::{Error, Result, status},
    shell::{DesktopRecord, EventSink, Shell, ViewRecord},
};

/// Map a failed `HRESULT` to an [`Error`].
pub(super) fn check(op: &'static str, hr: HRESULT, window: Option<WindowHandle>) -> Result<()> {
    if hr.is_ok() {
        Ok(())
    } else {
        Err(status::to_error(op, hr.0 as u32, window))
    }
}

/// Map a `windows` error to an [`Error`].
pub(super) fn map_err(op: &'static str, e: &windows::core::Error) -> Error {
    status::to_error(op, e.code().0 as u32, None)
}

/// Take ownership of an interface returned through an out-pointer.
pub(super) fn take<T: Vtable>(op: &'static str, raw: *mut c_void) -> Result<T> {
    if raw.is_null() {
        return Err(Error::Call {
            op,
            code: status::E_FAIL,
        });
    }
    // SAFETY: the shell returned an owned, non-null interface pointer of type T.
    Ok(unsafe { T::from_raw(raw) })
}

/// Borrow an interface passed into a callback without taking a reference.
pub(super) fn borrow<T: Vtable>(raw: *mut c_void) -> Option<ManuallyDrop<T>> {
    if raw.is_null() {
        None
    } else {
        // SAFETY: the caller keeps the pointer alive for the callback's duration.
        Some(ManuallyDrop::new(unsafe { T::from_raw(raw) }))
    }
}

/// Identifier of `desktop`.
pub(super) fn desktop_id(desktop: &IVirtualDesktop) -> Result<DesktopId> {
    let mut guid = GUID::zeroed();
    check("desktop_id", unsafe { desktop.get_id(&mut guid) }, None)?;
    Ok(DesktopId::from_u128(guid.to_u128()))
}

/// Initializes a single-threaded apartment for the lifetime of the value.
pub(super) struct Apartment;

impl Apartment {
    /// Enter an STA on the calling thread.
    pub(super) fn enter() -> Self {
        // Already-initialized threads return S_FALSE, which is fine.
        if let Err(e) = unsafe { CoInitializeEx(None, COINIT_APARTMENTTHREADED) } {
            debug!(error = %e, "CoInitializeEx");
        }
        Self
    }
}

impl Drop for Apartment {
    fn drop(&mut self) {
        unsafe { CoUninitialize() };
    }
}

/// Interfaces acquired from the immersive shell.
pub(super) struct Services {
    /// Public desktop manager, used for windows the shell has no view for.
    pub manager: IVirtualDesktopManager,
    /// Internal desktop manager.
    pub internal: IVirtualDesktopManagerInternal,
    /// View collection.
    pub views: IApplicationViewCollection,
    /// Pinned apps service.
    pub pinned: IVirtualDesktopPinnedApps,
    /// Notification registration service.
    pub notifications: IVirtualDesktopNotificationService,
}

impl Services {
    /// Acquire every interface from the shell.
    pub fn acquire() -> Result<Self> {
        let provider: IServiceProvider =
            unsafe { CoCreateInstance(&CLSID_ImmersiveShell, None, CLSCTX_ALL) }
                .map_err(|e| map_err("immersive_shell", &e))?;
        let manager: IVirtualDesktopManager =
            unsafe { CoCreateInstance(&VirtualDesktopManager, None, CLSCTX_ALL) }
                .map_err(|e| map_err("desktop_manager", &e))?;
        Ok(Self {
            manager,
            internal: query(&provider, &CLSID_VirtualDesktopManagerInternal)?,
            views: query(&provider, &IApplicationViewCollection::IID)?,
            pinned: query(&provider, &CLSID_VirtualDesktopPinnedApps)?,
            notifications: query(&provider, &CLSID_VirtualNotificationService)?,
        })
    }

    /// The current desktop interface.
    pub fn current(&self) -> Result<IVirtualDesktop> {
        let mut raw = ptr::null_mut();
        check(
            "current_desktop",
            unsafe { self.internal.get_current_desktop(0, &mut raw) },
            None,
        )?;
        take("current_desktop", raw)
    }

    /// Number of desktops; doubles as a liveness probe.
    pub fn count(&self) -> Result<u32> {
        let mut count = 0;
        check("count", unsafe { self.internal.get_count(0, &mut count) }, None)?;
        Ok(count)
    }

    /// All desktop interfaces in ordinal order.
    pub fn desktop_objects(&self) -> Result<Vec<IVirtualDesktop>> {
        let mut raw = ptr::null_mut();
        check(
            "desktops",
            unsafe { self.internal.get_desktops(0, &mut raw) },
            None,
        )?;
        let array: IObjectArray = take("desktops", raw)?;
        let count = unsafe { array.GetCount() }.map_err(|e| map_err("desktops", &e))?;
        (0..count)
            .map(|i| {
                unsafe { array.GetAt::<IVirtualDesktop>(i) }.map_err(|e| map_err("desktops", &e))
            })
            .collect()
    }

    /// Desktop interface for `id`.
    pub fn find(&self, id: DesktopId) -> Result<IVirtualDesktop> {
        let guid = GUID::from_u128(id.as_u128());
        let mut raw = ptr::null_mut();
        let hr = unsafe { self.internal.find_desktop(&guid, &mut raw) };
        if hr.is_err() && !status::is_restart(hr.0 as u32) {
            return Err(Error::DesktopNotFound(id));
        }
        check("find_desktop", hr, None)?;
        take("find_desktop", raw)
    }

    /// View for `window`.
    pub fn view(&self, window: WindowHandle) -> Result<IApplicationView> {
        let mut raw = ptr::null_mut();
        let hr = unsafe { self.views.get_view_for_hwnd(HWND(window.raw()), &mut raw) };
        if hr.is_err() && !status::is_restart(hr.0 as u32) {
            return Err(Error::WindowNotFound(window));
        }
        check("view", hr, Some(window))?;
        take("view", raw)
    }
}

/// Query `provider` for the service `service`, as interface `T`.
fn query<T>(provider: &IServiceProvider, service: &GUID) -> Result<T>
where
    T: Interface,
{
    unsafe { provider.QueryService::<T>(service) }.map_err(|e| map_err("query_service", &e))
}

/// Run `f` with the app user model id of `view`.
fn with_app_id<T>(view: &IApplicationView, f: impl FnOnce(PCWSTR) -> Result<T>) -> Result<T> {
    let mut id = PWSTR::null();
    check("app_id", unsafe { view.get_app_user_model_id(&mut id) }, None)?;
    let result = f(PCWSTR(id.0));
    unsafe { CoTaskMemFree(Some(id.0 as *const c_void)) };
    result
}

/// Windows backend.
pub struct WinShell {
    /// Acquired interfaces.
    services: Services,
    /// Notification listener thread, once watched.
    listener: Option<Listener>,
    /// Cleared when a call reports a restart-class failure.
    connected: Cell<bool>,
    /// Keeps the apartment alive; dropped last.
    _apartment: Apartment,
}

impl WinShell {
    /// Acquire the shell interfaces on the calling thread.
    pub fn connect() -> Result<Self> {
        let apartment = Apartment::enter();
        let services = Services::acquire()?;
        debug!("shell interfaces acquired");
        Ok(Self {
            services,
            listener: None,
            connected: Cell::new(true),
            _apartment: apartment,
        })
    }

    /// Record restart-class failures before returning them.
    fn track<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result
            && e.is_restart()
        {
            self.connected.set(false);
        }
        result
    }

    /// Assemble the view record for `view`, or `None` if it has no thumbnail.
    fn record(
        &self,
        view: &IApplicationView,
        current: &IVirtualDesktop,
        current_id: DesktopId,
    ) -> Result<Option<ViewRecord>> {
        let mut thumb = HWND(0);
        if unsafe { view.get_thumbnail_window(&mut thumb) }.is_err() || thumb.0 == 0 {
            return Ok(None);
        }
        let window = WindowHandle::new(thumb.0);
        let mut visible_on_current = 0u32;
        check(
            "is_view_visible",
            unsafe { current.is_view_visible(view.as_raw(), &mut visible_on_current) },
            Some(window),
        )?;
        let pinned = self.view_pinned(view)? || self.app_pinned(view)?;
        let desktop = if pinned {
            current_id
        } else {
            let mut guid = GUID::zeroed();
            check(
                "view_desktop",
                unsafe { view.get_virtual_desktop_id(&mut guid) },
                Some(window),
            )?;
            DesktopId::from_u128(guid.to_u128())
        };
        let mut visibility = 0;
        let mut switchers = 0;
        let mut ts = 0u64;
        check("visibility", unsafe { view.get_visibility(&mut visibility) }, Some(window))?;
        check("switchers", unsafe { view.get_show_in_switchers(&mut switchers) }, Some(window))?;
        check(
            "activation",
            unsafe { view.get_last_activation_timestamp(&mut ts) },
            Some(window),
        )?;
        Ok(Some(ViewRecord {
            window,
            thumbnail: window,
            desktop,
            on_current: visible_on_current != 0,
            visible: visibility != 0,
            in_switchers: switchers != 0,
            last_activation: (ts != 0).then_some(ts),
            minimized: unsafe { IsIconic(thumb) }.as_bool(),
        }))
    }

    /// Whether `view` itself is pinned.
    fn view_pinned(&self, view: &IApplicationView) -> Result<bool> {
        let mut pinned = BOOL(0);
        check(
            "is_view_pinned",
            unsafe { self.services.pinned.is_view_pinned(view.as_raw(), &mut pinned) },
            None,
        )?;
        Ok(pinned.as_bool())
    }

    /// Whether the application of `view` is pinned.
    fn app_pinned(&self, view: &IApplicationView) -> Result<bool> {
        with_app_id(view, |id| {
            let mut pinned = BOOL(0);
            check(
                "is_app_pinned",
                unsafe { self.services.pinned.is_app_pinned(id, &mut pinned) },
                None,
            )?;
            Ok(pinned.as_bool())
        })
    }
}

impl Shell for WinShell {
    fn desktops(&self) -> Result<Vec<DesktopRecord>> {
        self.track((|| {
            self.services
                .desktop_objects()?
                .iter()
                .map(|d| {
                    let mut name = HSTRING::new();
                    check("desktop_name", unsafe { d.get_name(&mut name) }, None)?;
                    Ok(DesktopRecord {
                        id: desktop_id(d)?,
                        name: (!name.is_empty()).then(|| name.to_string_lossy()),
                    })
                })
                .collect()
        })())
    }

    fn current_desktop(&self) -> Result<DesktopId> {
        self.track(self.services.current().and_then(|d| desktop_id(&d)))
    }

    fn switch_desktop(&self, desktop: DesktopId) -> Result<()> {
        self.track((|| {
            let d = self.services.find(desktop)?;
            check(
                "switch_desktop",
                unsafe { self.services.internal.switch_desktop(0, d.as_raw()) },
                None,
            )
        })())
    }

    fn create_desktop(&self) -> Result<DesktopId> {
        self.track((|| {
            let mut raw = ptr::null_mut();
            check(
                "create_desktop",
                unsafe { self.services.internal.create_desktop(0, &mut raw) },
                None,
            )?;
            let d: IVirtualDesktop = take("create_desktop", raw)?;
            desktop_id(&d)
        })())
    }

    fn remove_desktop(&self, desktop: DesktopId, fallback: DesktopId) -> Result<()> {
        self.track((|| {
            let d = self.services.find(desktop)?;
            let f = self.services.find(fallback)?;
            check(
                "remove_desktop",
                unsafe { self.services.internal.remove_desktop(d.as_raw(), f.as_raw()) },
                None,
            )
        })())
    }

    fn rename_desktop(&self, desktop: DesktopId, name: &str) -> Result<()> {
        self.track((|| {
            let d = self.services.find(desktop)?;
            let name = HSTRING::from(name);
            // SAFETY: HSTRING is a transparent handle; the callee borrows it.
            let raw: *mut c_void = unsafe { std::mem::transmute_copy(&name) };
            check(
                "rename_desktop",
                unsafe { self.services.internal.set_name(d.as_raw(), raw) },
                None,
            )
        })())
    }

    fn window_desktop(&self, window: WindowHandle) -> Result<DesktopId> {
        self.track((|| {
            match self.services.view(window) {
                Ok(view) => {
                    if self.view_pinned(&view)? || self.app_pinned(&view)? {
                        return self.current_desktop();
                    }
                    let mut guid = GUID::zeroed();
                    check(
                        "window_desktop",
                        unsafe { view.get_virtual_desktop_id(&mut guid) },
                        Some(window),
                    )?;
                    Ok(DesktopId::from_u128(guid.to_u128()))
                }
                Err(Error::WindowNotFound(_)) => {
                    let hwnd = HWND(window.raw());
                    let guid = unsafe { self.services.manager.GetWindowDesktopId(hwnd) }
                        .map_err(|_| Error::WindowNotFound(window))?;
                    Ok(DesktopId::from_u128(guid.to_u128()))
                }
                Err(e) => Err(e),
            }
        })())
    }

    fn move_window(&self, window: WindowHandle, desktop: DesktopId) -> Result<bool> {
        self.track((|| {
            let target = self.services.find(desktop)?;
            match self.services.view(window) {
                Ok(view) => {
                    check(
                        "move_window",
                        unsafe {
                            self.services
                                .internal
                                .move_view_to_desktop(view.as_raw(), target.as_raw())
                        },
                        Some(window),
                    )?;
                    Ok(true)
                }
                Err(Error::WindowNotFound(_)) => {
                    // Windows owned by this process can still be moved without a view.
                    let guid = GUID::from_u128(desktop.as_u128());
                    let moved = unsafe {
                        self.services
                            .manager
                            .MoveWindowToDesktop(HWND(window.raw()), &guid)
                    };
                    Ok(moved.is_ok())
                }
                Err(e) => Err(e),
            }
        })())
    }

    fn is_window_pinned(&self, window: WindowHandle) -> Result<bool> {
        self.track(self.services.view(window).and_then(|v| self.view_pinned(&v)))
    }

    fn set_window_pinned(&self, window: WindowHandle, pinned: bool) -> Result<()> {
        self.track((|| {
            let view = self.services.view(window)?;
            let hr = unsafe {
                if pinned {
                    self.services.pinned.pin_view(view.as_raw())
                } else {
                    self.services.pinned.unpin_view(view.as_raw())
                }
            };
            check("set_window_pinned", hr, Some(window))
        })())
    }

    fn is_app_pinned(&self, window: WindowHandle) -> Result<bool> {
        self.track(self.services.view(window).and_then(|v| self.app_pinned(&v)))
    }

    fn set_app_pinned(&self, window: WindowHandle, pinned: bool) -> Result<()> {
        self.track((|| {
            let view = self.services.view(window)?;
            with_app_id(&view, |id| {
                let hr = unsafe {
                    if pinned {
                        self.services.pinned.pin_app(id)
                    } else {
                        self.services.pinned.unpin_app(id)
                    }
                };
                check("set_app_pinned", hr, Some(window))
            })
        })())
    }

    fn views(&self) -> Result<Vec<ViewRecord>> {
        self.track((|| {
            let current = self.services.current()?;
            let current_id = desktop_id(&current)?;
            let mut raw = ptr::null_mut();
            check(
                "views",
                unsafe { self.services.views.get_views_by_zorder(&mut raw) },
                None,
            )?;
            let array: IObjectArray = take("views", raw)?;
            let count = unsafe { array.GetCount() }.map_err(|e| map_err("views", &e))?;
            let mut out = Vec::with_capacity(count as usize);
            for i in 0..count {
                let view = unsafe { array.GetAt::<IApplicationView>(i) }
                    .map_err(|e| map_err("views", &e))?;
                match self.record(&view, &current, current_id) {
                    Ok(Some(record)) => out.push(record),
                    Ok(None) => {}
                    // Views can vanish mid-enumeration.
                    Err(Error::WindowNotFound(_)) => {}
                    Err(e) if e.is_restart() => return Err(e),
                    Err(e) => warn!(error = %e, "skipping unreadable view"),
                }
            }
            Ok(out)
        })())
    }

    fn view(&self, window: WindowHandle) -> Result<ViewRecord> {
        self.track((|| {
            let view = self.services.view(window)?;
            let current = self.services.current()?;
            let current_id = desktop_id(&current)?;
            self.record(&view, &current, current_id)?
                .ok_or(Error::WindowNotFound(window))
        })())
    }

    fn focused_view(&self) -> Result<Option<WindowHandle>> {
        self.track((|| {
            let mut raw = ptr::null_mut();
            let hr = unsafe { self.services.views.get_view_in_focus(&mut raw) };
            if hr.is_err() && !status::is_restart(hr.0 as u32) {
                return Ok(None);
            }
            check("focused_view", hr, None)?;
            if raw.is_null() {
                return Ok(None);
            }
            let view: IApplicationView = take("focused_view", raw)?;
            let mut thumb = HWND(0);
            check("focused_view", unsafe { view.get_thumbnail_window(&mut thumb) }, None)?;
            Ok((thumb.0 != 0).then(|| WindowHandle::new(thumb.0)))
        })())
    }

    fn set_focus(&self, window: WindowHandle) -> Result<()> {
        self.track(
            self.services
                .view(window)
                .and_then(|v| check("set_focus", unsafe { v.set_focus() }, Some(window))),
        )
    }

    fn switch_to_view(&self, window: WindowHandle) -> Result<()> {
        self.track(
            self.services
                .view(window)
                .and_then(|v| check("switch_to", unsafe { v.switch_to() }, Some(window))),
        )
    }

    fn minimize(&self, window: WindowHandle) -> Result<()> {
        unsafe { ShowWindow(HWND(window.raw()), SW_SHOWMINNOACTIVE) };
        Ok(())
    }

    fn watch(&mut self, sink: EventSink) -> Result<()> {
        // Replacing the listener unregisters the previous one.
        self.listener = None;
        let listener = Listener::start(sink)?;
        self.listener = Some(listener);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.get()
            && self
                .listener
                .as_ref()
                .is_none_or(|listener| listener.is_alive())
    }
}
