use std::{
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::unbounded;
use vdesk_shell::{Error, ErrorKind, Interop, InteropCfg, MockShell, RetryPolicy, ShellEvent};

fn fast_cfg() -> InteropCfg {
    InteropCfg {
        call_timeout: Duration::from_millis(300),
        retry: RetryPolicy {
            initial_ms: 1,
            factor: 2,
            max_ms: 4,
            attempts: 4,
        },
        keep_minimized: false,
    }
}

#[test]
fn backend_is_created_lazily_on_the_worker() {
    let mock = MockShell::new(3);
    let interop = Interop::spawn(mock.factory(), fast_cfg()).unwrap();
    assert_eq!(mock.creations(), 0);
    let count = interop.call("count", |s| Ok(s.desktops()?.len())).unwrap();
    assert_eq!(count, 3);
    assert_eq!(mock.creations(), 1);
}

#[test]
fn restart_between_calls_is_invisible() {
    let mock = MockShell::new(2);
    let interop = Interop::spawn(mock.factory(), fast_cfg()).unwrap();
    let (tx, rx) = unbounded();
    interop.watch(tx).unwrap();
    assert!(mock.is_watched());

    mock.simulate_restart();
    let current = interop.call("current", |s| s.current_desktop()).unwrap();

    assert_eq!(current, mock.desktop_ids()[0]);
    assert_eq!(interop.restart_count(), 1);
    assert_eq!(mock.creations(), 2);
    assert!(mock.is_watched(), "sink re-registered after reconnect");
    assert_eq!(rx.try_recv(), Ok(ShellEvent::Reconnected));
}

#[test]
fn hung_call_fails_within_bound() {
    let mock = MockShell::new(1);
    let interop = Interop::spawn(mock.factory(), fast_cfg()).unwrap();
    interop.call("warm", |s| s.current_desktop()).unwrap();

    mock.set_hang(Some(Duration::from_millis(800)));
    let start = Instant::now();
    let err = interop
        .call("desktops", |s| s.desktops())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ShellUnresponsive);
    assert!(start.elapsed() < Duration::from_millis(700));
    mock.set_hang(None);
}

#[test]
fn timed_out_switch_never_reaches_the_shell() {
    let mock = MockShell::new(3);
    let interop = Interop::spawn(mock.factory(), fast_cfg()).unwrap();
    interop.call("warm", |s| s.current_desktop()).unwrap();
    let target = mock.desktop_ids()[2];

    mock.set_hang(Some(Duration::from_millis(800)));
    let busy = interop.call("busy", |s| s.desktops()).unwrap_err();
    assert_eq!(busy.kind(), ErrorKind::ShellUnresponsive);
    mock.set_hang(None);

    // Queued behind the hung call; gives up before the worker reaches it.
    let err = interop.switch_desktop(target).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ShellUnresponsive);

    thread::sleep(Duration::from_millis(1200));
    assert_eq!(mock.current_number(), 0);
    assert_eq!(mock.call_count("switch_desktop"), 0);

    // The backlog is drained and the worker serves new calls.
    interop.switch_desktop(mock.desktop_ids()[1]).unwrap();
    assert_eq!(mock.current_number(), 1);
}

#[test]
fn backend_lives_on_the_worker_thread() {
    let mock = MockShell::new(1);
    let interop = Interop::spawn(mock.factory(), fast_cfg()).unwrap();
    let name = interop
        .call("thread", |_| Ok(thread::current().name().map(str::to_owned)))
        .unwrap();
    assert_eq!(name.as_deref(), Some("vdesk-interop"));
    interop.shutdown();
    assert_eq!(mock.creations(), 1);
}

#[test]
fn unavailable_shell_gives_up_after_backoff() {
    let mock = MockShell::new(1);
    mock.set_unavailable(true);
    let interop = Interop::spawn(mock.factory(), fast_cfg()).unwrap();
    let err = interop.call("current", |s| s.current_desktop()).unwrap_err();
    assert!(matches!(err, Error::Unavailable(_)), "{err:?}");
    assert_eq!(mock.call_count("connect"), 4);

    mock.set_unavailable(false);
    assert!(interop.call("current", |s| s.current_desktop()).is_ok());
}

#[test]
fn explicit_restart_reacquires_backend() {
    let mock = MockShell::new(1);
    let interop = Interop::spawn(mock.factory(), fast_cfg()).unwrap();
    interop.call("warm", |s| s.current_desktop()).unwrap();
    interop.restart().unwrap();
    assert_eq!(mock.creations(), 2);
    assert_eq!(interop.restart_count(), 1);
}

#[test]
fn keep_minimized_switch_reminimizes_restored_windows() {
    let mock = MockShell::new(2);
    mock.set_restore_on_switch(true);
    let kept = mock.add_window(100, 1);
    let open = mock.add_window(101, 1);
    mock.set_minimized(kept, true);
    let target = mock.desktop_ids()[1];

    let interop = Interop::spawn(mock.factory(), fast_cfg()).unwrap();
    interop.set_keep_minimized(true);
    interop.switch_desktop(target).unwrap();
    assert_eq!(mock.current_number(), 1);
    assert!(mock.is_minimized(kept));
    assert!(!mock.is_minimized(open));

    interop.set_keep_minimized(false);
    mock.set_minimized(kept, true);
    interop.switch_desktop(mock.desktop_ids()[0]).unwrap();
    interop.switch_desktop(target).unwrap();
    assert!(!mock.is_minimized(kept), "shell restore wins without the toggle");
}

#[test]
fn shutdown_rejects_further_calls() {
    let mock = MockShell::new(1);
    let interop = Interop::spawn(mock.factory(), fast_cfg()).unwrap();
    interop.shutdown();
    assert_eq!(
        interop.call("current", |s| s.current_desktop()),
        Err(Error::WorkerGone)
    );
}
