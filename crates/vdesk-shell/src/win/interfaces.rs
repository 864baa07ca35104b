//! Undocumented shell interfaces for virtual desktop management.
//!
//! Vtable layouts must match the shell exactly; slots that are never called
//! are still declared so later slots land at the right offsets. Interface
//! arguments are passed as raw pointers and wrapped by the caller.
#![allow(non_upper_case_globals)]
#![allow(missing_docs, clippy::missing_docs_in_private_items)]

use std::ffi::c_void;

use windows::{
    Win32::Foundation::{BOOL, HWND},
    core::{GUID, HRESULT, HSTRING, IUnknown, IUnknown_Vtbl, PCWSTR, PWSTR, interface},
};

/// Monitor handle argument; null selects all monitors.
pub type HMONITOR = isize;

pub const CLSID_ImmersiveShell: GUID = GUID::from_u128(0xC2F03A33_21F5_47FA_B4BB_156362A2F239);
pub const CLSID_VirtualNotificationService: GUID =
    GUID::from_u128(0xA501FDEC_4A09_464C_AE4E_1B9C21B84918);
pub const CLSID_VirtualDesktopManagerInternal: GUID =
    GUID::from_u128(0xC5E0CDCA_7B6E_41B2_9FC4_D93975CC467B);
pub const CLSID_VirtualDesktopPinnedApps: GUID =
    GUID::from_u128(0xB5A399E7_1C87_46B8_88E9_FC5747B171BD);

#[interface("372E1D3B-38D3-42E4-A15B-8AB2B178F513")]
pub unsafe trait IApplicationView: IUnknown {
    // IInspectable
    unsafe fn get_iids(&self, count: *mut u32, iids: *mut *mut GUID) -> HRESULT;
    unsafe fn get_runtime_class_name(&self, name: *mut HSTRING) -> HRESULT;
    unsafe fn get_trust_level(&self, level: *mut c_void) -> HRESULT;

    unsafe fn set_focus(&self) -> HRESULT;
    unsafe fn switch_to(&self) -> HRESULT;
    unsafe fn try_invoke_back(&self, callback: *mut c_void) -> HRESULT;
    unsafe fn get_thumbnail_window(&self, hwnd: *mut HWND) -> HRESULT;
    unsafe fn get_monitor(&self, monitor: *mut *mut c_void) -> HRESULT;
    unsafe fn get_visibility(&self, visibility: *mut i32) -> HRESULT;
    unsafe fn set_cloak(&self, cloak_type: u32, unknown: i32) -> HRESULT;
    unsafe fn get_position(&self, iid: *const GUID, position: *mut *mut c_void) -> HRESULT;
    unsafe fn set_position(&self, position: *mut c_void) -> HRESULT;
    unsafe fn insert_after_window(&self, hwnd: HWND) -> HRESULT;
    unsafe fn get_extended_frame_position(&self, rect: *mut c_void) -> HRESULT;
    unsafe fn get_app_user_model_id(&self, id: *mut PWSTR) -> HRESULT;
    unsafe fn set_app_user_model_id(&self, id: PCWSTR) -> HRESULT;
    unsafe fn is_equal_by_app_user_model_id(&self, id: PCWSTR, result: *mut i32) -> HRESULT;
    unsafe fn get_view_state(&self, state: *mut u32) -> HRESULT;
    unsafe fn set_view_state(&self, state: u32) -> HRESULT;
    unsafe fn get_neediness(&self, neediness: *mut i32) -> HRESULT;
    unsafe fn get_last_activation_timestamp(&self, timestamp: *mut u64) -> HRESULT;
    unsafe fn set_last_activation_timestamp(&self, timestamp: u64) -> HRESULT;
    unsafe fn get_virtual_desktop_id(&self, desktop: *mut GUID) -> HRESULT;
    unsafe fn set_virtual_desktop_id(&self, desktop: *const GUID) -> HRESULT;
    unsafe fn get_show_in_switchers(&self, show: *mut i32) -> HRESULT;
    unsafe fn set_show_in_switchers(&self, show: i32) -> HRESULT;
}

#[interface("536D3495-B208-4CC9-AE26-DE8111275BF8")]
pub unsafe trait IVirtualDesktop: IUnknown {
    unsafe fn is_view_visible(&self, view: *mut c_void, visible: *mut u32) -> HRESULT;
    unsafe fn get_id(&self, id: *mut GUID) -> HRESULT;
    unsafe fn get_monitor(&self, monitor: *mut HMONITOR) -> HRESULT;
    unsafe fn get_name(&self, name: *mut HSTRING) -> HRESULT;
    unsafe fn get_wallpaper(&self, path: *mut HSTRING) -> HRESULT;
}

#[interface("1841C6D7-4F9D-42C0-AF41-8747538F10E5")]
pub unsafe trait IApplicationViewCollection: IUnknown {
    unsafe fn get_views(&self, views: *mut *mut c_void) -> HRESULT;
    unsafe fn get_views_by_zorder(&self, views: *mut *mut c_void) -> HRESULT;
    unsafe fn get_views_by_app_user_model_id(
        &self,
        id: PCWSTR,
        views: *mut *mut c_void,
    ) -> HRESULT;
    unsafe fn get_view_for_hwnd(&self, hwnd: HWND, view: *mut *mut c_void) -> HRESULT;
    unsafe fn get_view_for_application(
        &self,
        app: *mut c_void,
        view: *mut *mut c_void,
    ) -> HRESULT;
    unsafe fn get_view_for_app_user_model_id(
        &self,
        id: PCWSTR,
        view: *mut *mut c_void,
    ) -> HRESULT;
    unsafe fn get_view_in_focus(&self, view: *mut *mut c_void) -> HRESULT;
    unsafe fn try_get_last_active_visible_view(&self, view: *mut *mut c_void) -> HRESULT;
    unsafe fn refresh_collection(&self) -> HRESULT;
    unsafe fn register_for_application_view_changes(
        &self,
        listener: *mut c_void,
        cookie: *mut u32,
    ) -> HRESULT;
    unsafe fn unregister_for_application_view_changes(&self, cookie: u32) -> HRESULT;
}

#[interface("CD403E52-DEED-4C13-B437-B98380F2B1E8")]
pub unsafe trait IVirtualDesktopNotification: IUnknown {
    unsafe fn virtual_desktop_created(&self, desktop: *mut c_void) -> HRESULT;
    unsafe fn virtual_desktop_destroy_begin(
        &self,
        destroyed: *mut c_void,
        fallback: *mut c_void,
    ) -> HRESULT;
    unsafe fn virtual_desktop_destroy_failed(
        &self,
        destroyed: *mut c_void,
        fallback: *mut c_void,
    ) -> HRESULT;
    unsafe fn virtual_desktop_destroyed(
        &self,
        destroyed: *mut c_void,
        fallback: *mut c_void,
    ) -> HRESULT;
    unsafe fn virtual_desktop_is_per_monitor_changed(&self, per_monitor: BOOL) -> HRESULT;
    unsafe fn virtual_desktop_moved(
        &self,
        desktop: *mut c_void,
        old_index: i64,
        new_index: i64,
    ) -> HRESULT;
    unsafe fn virtual_desktop_name_changed(
        &self,
        desktop: *mut c_void,
        name: *mut c_void,
    ) -> HRESULT;
    unsafe fn view_virtual_desktop_changed(&self, view: *mut c_void) -> HRESULT;
    unsafe fn current_virtual_desktop_changed(
        &self,
        old: *mut c_void,
        new: *mut c_void,
    ) -> HRESULT;
}

#[interface("0CD45E71-D927-4F15-8B0A-8FEF525337BF")]
pub unsafe trait IVirtualDesktopNotificationService: IUnknown {
    unsafe fn register(&self, notification: *mut c_void, cookie: *mut u32) -> HRESULT;
    unsafe fn unregister(&self, cookie: u32) -> HRESULT;
}

#[interface("B2F925B9-5A0F-4D2E-9F4D-2B1507593C10")]
pub unsafe trait IVirtualDesktopManagerInternal: IUnknown {
    unsafe fn get_count(&self, monitor: HMONITOR, count: *mut u32) -> HRESULT;
    unsafe fn move_view_to_desktop(&self, view: *mut c_void, desktop: *mut c_void) -> HRESULT;
    unsafe fn can_move_view_between_desktops(
        &self,
        view: *mut c_void,
        can_move: *mut i32,
    ) -> HRESULT;
    unsafe fn get_current_desktop(&self, monitor: HMONITOR, desktop: *mut *mut c_void)
    -> HRESULT;
    unsafe fn get_all_current_desktops(&self, desktops: *mut *mut c_void) -> HRESULT;
    unsafe fn get_desktops(&self, monitor: HMONITOR, desktops: *mut *mut c_void) -> HRESULT;
    unsafe fn get_adjacent_desktop(
        &self,
        desktop: *mut c_void,
        direction: u32,
        adjacent: *mut *mut c_void,
    ) -> HRESULT;
    unsafe fn switch_desktop(&self, monitor: HMONITOR, desktop: *mut c_void) -> HRESULT;
    unsafe fn create_desktop(&self, monitor: HMONITOR, desktop: *mut *mut c_void) -> HRESULT;
    unsafe fn move_desktop(&self, desktop: *mut c_void, monitor: HMONITOR, index: u32)
    -> HRESULT;
    unsafe fn remove_desktop(&self, destroyed: *mut c_void, fallback: *mut c_void) -> HRESULT;
    unsafe fn find_desktop(&self, id: *const GUID, desktop: *mut *mut c_void) -> HRESULT;
    unsafe fn get_desktop_switch_include_exclude_views(
        &self,
        desktop: *mut c_void,
        include: *mut *mut c_void,
        exclude: *mut *mut c_void,
    ) -> HRESULT;
    unsafe fn set_name(&self, desktop: *mut c_void, name: *mut c_void) -> HRESULT;
}

#[interface("4CE81583-1E4C-4632-A621-07A53543148F")]
pub unsafe trait IVirtualDesktopPinnedApps: IUnknown {
    unsafe fn is_app_pinned(&self, app_id: PCWSTR, pinned: *mut BOOL) -> HRESULT;
    unsafe fn pin_app(&self, app_id: PCWSTR) -> HRESULT;
    unsafe fn unpin_app(&self, app_id: PCWSTR) -> HRESULT;
    unsafe fn is_view_pinned(&self, view: *mut c_void, pinned: *mut BOOL) -> HRESULT;
    unsafe fn pin_view(&self, view: *mut c_void) -> HRESULT;
    unsafe fn unpin_view(&self, view: *mut c_void) -> HRESULT;
}
