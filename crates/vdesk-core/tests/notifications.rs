use std::{
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use tokio::time::Instant as TokioInstant;
use vdesk_core::{
    Accessor, AccessorCfg, DesktopEvent, WaitConfig, WaitError, WindowHandle,
    hooks::code,
    test_support::{RecordingSink, run_async_test},
    wait::{wait_for_count, wait_for_current},
};
use vdesk_shell::{MockShell, RetryPolicy, ShellEvent};

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

fn start(mock: &MockShell, reconcile_ms: u64) -> (Accessor, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let accessor = Accessor::spawn(mock.factory(), cfg(reconcile_ms), sink.clone()).unwrap();
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
fn switch_posts_one_message_per_listener() {
    let mock = MockShell::new(3);
    let (accessor, sink) = start(&mock, 0);
    let listener = WindowHandle::new(0x100);
    accessor.register_hook(listener, 0x8000);
    accessor.register_hook(listener, 0x8000);

    accessor.registry().switch_to(2).unwrap();
    let msg = 0x8000 + code::CURRENT_CHANGED;
    eventually("current-changed post", || !sink.posts_of(msg).is_empty());
    thread::sleep(Duration::from_millis(30));
    assert_eq!(sink.posts_of(msg), vec![(listener, msg, 0, 2)]);
}

#[test]
fn unregistered_listeners_stop_receiving() {
    let mock = MockShell::new(2);
    let (accessor, sink) = start(&mock, 0);
    let listener = WindowHandle::new(0x200);
    accessor.unregister_hook(WindowHandle::new(0x999));
    accessor.register_hook(listener, 0);
    accessor.registry().create().unwrap();
    eventually("created post", || !sink.posts_of(code::CREATED).is_empty());
    assert_eq!(sink.posts_of(code::CREATED)[0], (listener, code::CREATED, 2, 0));

    accessor.unregister_hook(listener);
    accessor.unregister_hook(listener);
    sink.clear();
    accessor.registry().switch_to(1).unwrap();
    thread::sleep(Duration::from_millis(50));
    assert!(sink.posts().is_empty());
}

#[test]
fn window_moves_and_pins_are_posted() {
    let mock = MockShell::new(2);
    let w = mock.add_window(0x30, 0);
    let (accessor, sink) = start(&mock, 0);
    let listener = WindowHandle::new(0x300);
    accessor.register_hook(listener, 100);

    accessor.index().move_to(w, 1).unwrap();
    accessor.index().pin_window(w).unwrap();
    let msg = 100 + code::WINDOW_CHANGED;
    eventually("two window posts", || sink.posts_of(msg).len() >= 2);
    assert!(
        sink.posts_of(msg)
            .iter()
            .all(|p| p.2 == w.raw() as usize)
    );
}

#[test]
fn removal_posts_begin_and_destroyed() {
    let mock = MockShell::new(3);
    let (accessor, sink) = start(&mock, 0);
    let listener = WindowHandle::new(0x400);
    accessor.register_hook(listener, 0);
    accessor.registry().remove(0, 2).unwrap();
    eventually("destroyed post", || !sink.posts_of(code::DESTROYED).is_empty());
    assert_eq!(
        sink.posts_of(code::DESTROY_BEGIN),
        vec![(listener, code::DESTROY_BEGIN, 0, 2)]
    );
    assert_eq!(
        sink.posts_of(code::DESTROYED),
        vec![(listener, code::DESTROYED, 0, 1)]
    );
    let current = sink.posts_of(code::CURRENT_CHANGED);
    assert_eq!(current, vec![(listener, code::CURRENT_CHANGED, 0, 2)]);
}

#[test]
fn reconciliation_reports_missed_count_change() {
    let mock = MockShell::new(2);
    let (accessor, sink) = start(&mock, 20);
    let listener = WindowHandle::new(0x500);
    accessor.register_hook(listener, 0);
    assert_eq!(accessor.registry().count().unwrap(), 2);

    mock.silent_create();
    eventually("count-changed post", || {
        !sink.posts_of(code::COUNT_CHANGED).is_empty()
    });
    assert_eq!(
        sink.posts_of(code::COUNT_CHANGED)[0],
        (listener, code::COUNT_CHANGED, 3, 0)
    );
    eventually("cache refreshed", || accessor.registry().count().ok() == Some(3));
}

#[test]
fn reconnect_is_posted_and_published() {
    let mock = MockShell::new(2);
    let (accessor, sink) = start(&mock, 0);
    let listener = WindowHandle::new(0x600);
    accessor.register_hook(listener, 7);
    let mut cursor = accessor.subscribe();

    accessor.restart().unwrap();
    let msg = 7 + code::SHELL_RECONNECTED;
    eventually("reconnect post", || !sink.posts_of(msg).is_empty());
    eventually("reconnect event", || {
        cursor.try_next() == Some(DesktopEvent::ShellReconnected)
    });
}

#[test]
fn disconnect_triggers_reconnect() {
    let mock = MockShell::new(2);
    let (accessor, _) = start(&mock, 0);
    accessor.registry().count().unwrap();
    mock.emit(ShellEvent::Disconnected);
    eventually("reconnect", || accessor.restart_count() == 1);
    assert!(accessor.registry().count().is_ok());
}

#[test]
fn switch_completes_within_bounded_wait() {
    run_async_test(async {
        let mock = MockShell::new(3);
        let (accessor, _) = start(&mock, 0);
        accessor.registry().switch_to(2).unwrap();
        wait_for_current(&accessor, 2, WaitConfig::default())
            .await
            .unwrap();
        assert_eq!(accessor.registry().current_number().unwrap(), 2);
    });
}

#[test]
fn external_changes_are_published_in_order() {
    run_async_test(async {
        let mock = MockShell::new(2);
        let (accessor, _) = start(&mock, 0);
        accessor.registry().count().unwrap();
        let mut cursor = accessor.subscribe();

        mock.external_switch(1);
        let deadline = TokioInstant::now() + Duration::from_secs(2);
        assert_eq!(
            accessor.next_event_until(&mut cursor, deadline).await,
            Some(DesktopEvent::CurrentChanged {
                old: Some(0),
                new: 1
            })
        );
        accessor.registry().rename(0, "main").unwrap();
        assert_eq!(
            accessor.next_event_until(&mut cursor, deadline).await,
            Some(DesktopEvent::Renamed {
                number: 0,
                name: "main".into()
            })
        );
    });
}

#[test]
fn count_wait_times_out_when_nothing_changes() {
    run_async_test(async {
        let mock = MockShell::new(2);
        let (accessor, _) = start(&mock, 0);
        let cfg = WaitConfig::new(Duration::from_millis(80), Duration::from_millis(20));
        let err = wait_for_count(&accessor, 5, cfg).await.unwrap_err();
        assert!(matches!(err, WaitError::Timeout { .. }), "{err}");

        mock.silent_create();
        accessor.registry().refresh();
        wait_for_count(&accessor, 3, WaitConfig::default())
            .await
            .unwrap();
    });
}

#[test]
fn shutdown_ends_waits() {
    run_async_test(async {
        let mock = MockShell::new(2);
        let (accessor, _) = start(&mock, 0);
        let mut cursor = accessor.subscribe();
        accessor.shutdown();
        assert!(cursor.is_closed());
        let deadline = TokioInstant::now() + Duration::from_secs(5);
        assert_eq!(accessor.next_event_until(&mut cursor, deadline).await, None);
    });
}
