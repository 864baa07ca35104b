use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use vdesk_core::{
    Accessor, AccessorCfg, Error, ErrorKind, ViewFilter, WindowHandle, test_support::RecordingSink,
};
use vdesk_shell::{MockShell, RetryPolicy};

fn cfg(reconcile_ms: u64) -> AccessorCfg {
    AccessorCfg {
        call_timeout_ms: 300,
        reconcile_interval_ms: reconcile_ms,
        event_capacity: 64,
        keep_minimized: false,
        retry: RetryPolicy {
            initial_ms: 1,
            factor: 2,
            max_ms: 4,
            attempts: 4,
        },
    }
}

fn start(mock: &MockShell) -> (Accessor, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let accessor = Accessor::spawn(mock.factory(), cfg(0), sink.clone()).unwrap();
    (accessor, sink)
}

fn eventually(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn startup_connects_before_the_first_call() {
    let mock = MockShell::new(2);
    let (_accessor, _) = start(&mock);
    assert_eq!(mock.creations(), 1);
    assert!(mock.is_watched());
}

#[test]
fn numbers_and_ids_round_trip() {
    let mock = MockShell::new(4);
    let (accessor, _) = start(&mock);
    let registry = accessor.registry();
    let count = registry.count().unwrap();
    assert_eq!(count, 4);
    for n in 0..count {
        let id = registry.id_by_number(n).unwrap();
        assert_eq!(registry.number_by_id(id).unwrap(), n);
    }
    assert_eq!(
        registry.id_by_number(count).unwrap_err().kind(),
        ErrorKind::NotFound
    );
    let desktops = registry.desktops().unwrap();
    assert_eq!(
        desktops.iter().map(|d| d.number).collect::<Vec<_>>(),
        vec![0, 1, 2, 3]
    );
}

#[test]
fn unknown_desktop_id_is_not_found() {
    let mock = MockShell::new(2);
    let (accessor, _) = start(&mock);
    let bogus = vdesk_core::DesktopId::from_u128(0xdead);
    assert_eq!(
        accessor.registry().number_by_id(bogus),
        Err(Error::DesktopNotFound(bogus))
    );
}

#[test]
fn switch_out_of_range_is_rejected_without_calling_the_shell() {
    let mock = MockShell::new(2);
    let (accessor, _) = start(&mock);
    accessor.registry().count().unwrap();
    mock.clear_calls();
    let err = accessor.registry().switch_to(5).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(mock.call_count("switch_desktop"), 0);
}

#[test]
fn switch_is_observed_through_cache() {
    let mock = MockShell::new(3);
    let (accessor, _) = start(&mock);
    let registry = accessor.registry();
    assert_eq!(registry.current_number().unwrap(), 0);
    registry.switch_to(2).unwrap();
    eventually("current == 2", || registry.current_number().ok() == Some(2));

    mock.external_switch(1);
    eventually("external switch", || registry.current_number().ok() == Some(1));
}

#[test]
fn create_rename_and_remove() {
    let mock = MockShell::new(2);
    let (accessor, _) = start(&mock);
    let registry = accessor.registry();

    assert_eq!(registry.create().unwrap(), 2);
    assert_eq!(registry.count().unwrap(), 3);

    registry.rename(2, "scratch").unwrap();
    assert_eq!(registry.name(2).unwrap().as_deref(), Some("scratch"));
    assert_eq!(registry.name(0).unwrap(), None);
    assert_eq!(registry.name(7).unwrap_err().kind(), ErrorKind::InvalidArgument);

    assert_eq!(
        registry.remove(1, 1).unwrap_err().kind(),
        ErrorKind::InvalidArgument
    );
    let w = mock.add_window(40, 1);
    registry.remove(1, 0).unwrap();
    assert_eq!(registry.count().unwrap(), 2);
    assert_eq!(accessor.index().number_of(w).unwrap(), 0);
    assert_eq!(registry.name(1).unwrap().as_deref(), Some("scratch"));
}

#[test]
fn window_queries_follow_moves() {
    let mock = MockShell::new(3);
    let w = mock.add_window(10, 0);
    let (accessor, _) = start(&mock);
    let index = accessor.index();

    assert_eq!(index.number_of(w).unwrap(), 0);
    assert!(index.is_on_current(w).unwrap());
    assert!(index.is_on_number(w, 0).unwrap());
    assert_eq!(
        index.is_on_number(w, 9).unwrap_err().kind(),
        ErrorKind::InvalidArgument
    );

    assert!(index.move_to(w, 2).unwrap());
    assert_eq!(index.number_of(w).unwrap(), 2);
    assert!(!index.is_on_current(w).unwrap());
    assert_eq!(mock.window_number(w), Some(2));

    assert_eq!(
        index.move_to(w, 3).unwrap_err().kind(),
        ErrorKind::InvalidArgument
    );
    mock.remove_view(w);
    assert!(!index.move_to(w, 1).unwrap(), "no view means no move");
}

#[test]
fn destroyed_window_is_not_found() {
    let mock = MockShell::new(1);
    let (accessor, _) = start(&mock);
    let gone = WindowHandle::new(0x99);
    assert_eq!(
        accessor.index().desktop_of(gone),
        Err(Error::WindowNotFound(gone))
    );
    assert_eq!(
        accessor.views().set_focus(gone).unwrap_err().kind(),
        ErrorKind::NotFound
    );
}

#[test]
fn pins_are_idempotent_and_reversible() {
    let mock = MockShell::new(2);
    let w = mock.add_window(11, 1);
    let other = mock.add_window(12, 1);
    mock.set_app(other, "shared");
    mock.set_app(w, "shared");
    let (accessor, _) = start(&mock);
    let index = accessor.index();

    assert!(!index.is_pinned_window(w).unwrap());
    index.pin_window(w).unwrap();
    index.pin_window(w).unwrap();
    assert_eq!(mock.call_count("pin_window"), 1);
    assert!(index.is_pinned_window(w).unwrap());
    assert!(index.is_on_current(w).unwrap());
    index.unpin_window(w).unwrap();
    assert!(!index.is_pinned_window(w).unwrap());
    assert_eq!(index.number_of(w).unwrap(), 1);

    index.unpin_app(w).unwrap();
    assert_eq!(mock.call_count("unpin_app"), 0);
    index.pin_app(w).unwrap();
    assert!(index.is_pinned_app(other).unwrap(), "pin covers the whole app");
    assert!(index.is_on_current(other).unwrap());
    index.unpin_app(other).unwrap();
    assert!(!index.is_pinned_app(w).unwrap());
}

#[test]
fn z_order_respects_filters() {
    let mock = MockShell::new(2);
    let a = mock.add_window(1, 0);
    let b = mock.add_window(2, 1);
    let c = mock.add_window(3, 0);
    let pinned = mock.add_window(4, 1);
    let hidden = mock.add_window(5, 0);
    let no_thumb = mock.add_window(6, 0);
    mock.set_in_switchers(hidden, false);
    mock.set_thumbnail(no_thumb, 0);
    let (accessor, _) = start(&mock);
    accessor.index().pin_window(pinned).unwrap();
    let views = accessor.views();

    assert_eq!(
        views.by_z_order(ViewFilter::ALL).unwrap(),
        vec![hidden, pinned, c, b, a]
    );
    let current_only = ViewFilter {
        current_desktop_only: true,
        ..ViewFilter::default()
    };
    let handles = views.by_z_order(current_only).unwrap();
    assert_eq!(handles, vec![hidden, pinned, c, a]);
    let current = accessor.registry().current_id().unwrap();
    for w in handles {
        assert_eq!(accessor.index().desktop_of(w).unwrap(), current);
    }
    let switcher = ViewFilter {
        switcher_only: true,
        current_desktop_only: true,
    };
    assert_eq!(views.by_z_order(switcher).unwrap(), vec![pinned, c, a]);
}

#[test]
fn activation_order_is_most_recent_first_and_stable() {
    let mock = MockShell::new(1);
    let a = mock.add_window(1, 0);
    let b = mock.add_window(2, 0);
    let c = mock.add_window(3, 0);
    let d = mock.add_window(4, 0);
    mock.set_last_activation(a, 50);
    mock.set_last_activation(b, 10);
    mock.set_last_activation(c, 10);
    mock.set_last_activation(d, 0);
    let (accessor, _) = start(&mock);
    let views = accessor.views();

    assert_eq!(views.by_z_order(ViewFilter::ALL).unwrap(), vec![d, c, b, a]);
    assert_eq!(
        views.by_activation_order(ViewFilter::ALL).unwrap(),
        vec![a, c, b, d]
    );
    let records = views.snapshot_by_activation(ViewFilter::ALL).unwrap();
    let windows: Vec<_> = records.iter().map(|v| v.window).collect();
    assert_eq!(windows, vec![a, c, b, d]);
    assert_eq!(records[0].last_activation, Some(50));
    assert_eq!(views.last_activation(a).unwrap(), Some(50));
    assert_eq!(views.last_activation(d).unwrap(), None);
}

#[test]
fn view_properties_and_focus() {
    let mock = MockShell::new(2);
    let a = mock.add_window(1, 0);
    let b = mock.add_window(2, 1);
    mock.set_visible(a, false);
    mock.set_thumbnail(b, 0x77);
    let (accessor, _) = start(&mock);
    let views = accessor.views();

    assert!(!views.is_visible(a).unwrap());
    assert!(views.is_shown_in_switchers(a).unwrap());
    assert_eq!(views.thumbnail(b).unwrap(), Some(WindowHandle::new(0x77)));
    assert_eq!(views.focused().unwrap(), Some(b));

    views.set_focus(a).unwrap();
    assert_eq!(views.focused().unwrap(), Some(a));
    assert_eq!(mock.current_number(), 0);

    views.switch_to(b).unwrap();
    assert_eq!(mock.current_number(), 1);
    assert_eq!(accessor.registry().current_number().unwrap(), 1);
}

#[test]
fn keep_minimized_applies_to_registry_switches() {
    let mock = MockShell::new(2);
    mock.set_restore_on_switch(true);
    let kept = mock.add_window(21, 1);
    mock.set_minimized(kept, true);
    let (accessor, _) = start(&mock);
    assert!(!accessor.keep_minimized());
    accessor.set_keep_minimized(true);
    accessor.registry().switch_to(1).unwrap();
    assert_eq!(mock.current_number(), 1);
    assert!(mock.is_minimized(kept));
}

#[test]
fn hung_shell_fails_within_bound() {
    let mock = MockShell::new(2);
    let (accessor, _) = start(&mock);
    accessor.registry().count().unwrap();
    accessor.registry().refresh();
    mock.set_hang(Some(Duration::from_millis(800)));
    let start = Instant::now();
    let err = accessor.registry().count().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ShellUnresponsive);
    assert!(start.elapsed() < Duration::from_millis(700));
    mock.set_hang(None);
}

#[test]
fn failed_switch_leaves_current_desktop_alone() {
    let mock = MockShell::new(3);
    let (accessor, _) = start(&mock);
    let registry = accessor.registry();
    assert_eq!(registry.count().unwrap(), 3);

    mock.set_hang(Some(Duration::from_millis(800)));
    let busy = accessor.views().focused().unwrap_err();
    assert_eq!(busy.kind(), ErrorKind::ShellUnresponsive);
    mock.set_hang(None);

    let err = registry.switch_to(2).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ShellUnresponsive);
    thread::sleep(Duration::from_millis(1200));
    assert_eq!(mock.current_number(), 0);
    assert_eq!(registry.current_number().unwrap(), 0);
}

#[test]
fn restart_between_calls_is_invisible() {
    let mock = MockShell::new(3);
    let (accessor, _) = start(&mock);
    let registry = accessor.registry();
    assert_eq!(registry.count().unwrap(), 3);

    mock.simulate_restart();
    registry.refresh();
    assert_eq!(registry.count().unwrap(), 3);
    assert_eq!(accessor.restart_count(), 1);
    eventually("sink re-registered", || mock.is_watched());

    accessor.restart().unwrap();
    assert_eq!(accessor.restart_count(), 2);
    assert_eq!(registry.current_number().unwrap(), 0);
}

#[test]
fn calls_after_shutdown_fail_cleanly() {
    let mock = MockShell::new(1);
    let (accessor, _) = start(&mock);
    let registry = accessor.registry();
    accessor.shutdown();
    registry.refresh();
    assert_eq!(registry.count(), Err(Error::WorkerGone));
}
