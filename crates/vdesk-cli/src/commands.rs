//! Command implementations.

use std::{
    io::{self, Write as _},
    path::Path,
    sync::Arc,
    time::Duration,
};

use serde::Serialize;
use tokio::{runtime::Builder, signal, time::Instant as TokioInstant};
use tracing::debug;
use vdesk_core::{
    Accessor, AccessorCfg, DesktopEvent, NullSink, ViewRecord, WaitConfig, wait::wait_for_current,
};

use crate::{
    cli::{Commands, PinArgs, ViewsArgs},
    error::Result,
};

/// Load configuration, start an accessor and run `command`.
pub fn run(config: Option<&Path>, command: Commands) -> Result<()> {
    let cfg = match config {
        Some(path) => AccessorCfg::load(path)?,
        None => AccessorCfg::default(),
    };
    debug!(?cfg, "starting accessor");
    let accessor = Accessor::spawn(vdesk_shell::system_backend(), cfg, Arc::new(NullSink))?;
    let result = dispatch(&accessor, command);
    accessor.shutdown();
    result
}

/// Run one command against `accessor`.
fn dispatch(accessor: &Accessor, command: Commands) -> Result<()> {
    let registry = accessor.registry();
    let index = accessor.index();
    match command {
        Commands::Count => println!("{}", registry.count()?),
        Commands::Current => println!("{}", registry.current_number()?),
        Commands::List { json } => {
            let desktops = registry.desktops()?;
            if json {
                print_json(&desktops)?;
            } else {
                for d in desktops {
                    println!("{}\t{}\t{}", d.number, d.id, d.name.unwrap_or_default());
                }
            }
        }
        Commands::Switch { number, wait } => {
            registry.switch_to(number)?;
            if let Some(overall) = wait {
                block_on(async {
                    let cfg = WaitConfig {
                        overall,
                        ..WaitConfig::default()
                    };
                    wait_for_current(accessor, number, cfg).await
                })??;
            }
        }
        Commands::Window(arg) => println!("{}", index.number_of(arg.window)?),
        Commands::Move { window, number } => {
            if !index.move_to(window, number)? {
                println!("{window} has no view; nothing moved");
            }
        }
        Commands::Pin(args) => pin(accessor, args, true)?,
        Commands::Unpin(args) => pin(accessor, args, false)?,
        Commands::Views(args) => views(accessor, args)?,
        Commands::Focus(arg) => accessor.views().switch_to(arg.window)?,
        Commands::Create => println!("{}", registry.create()?),
        Commands::Remove { number, fallback } => registry.remove(number, fallback)?,
        Commands::Rename { number, name } => registry.rename(number, &name)?,
        Commands::Watch { duration, json } => block_on(watch(accessor, duration, json))??,
        Commands::Restart => {
            accessor.restart()?;
            println!("reconnected ({} restarts)", accessor.restart_count());
        }
    }
    Ok(())
}

/// Apply or remove a window or application pin.
fn pin(accessor: &Accessor, args: PinArgs, pinned: bool) -> Result<()> {
    let index = accessor.index();
    match (args.app, pinned) {
        (false, true) => index.pin_window(args.window)?,
        (false, false) => index.unpin_window(args.window)?,
        (true, true) => index.pin_app(args.window)?,
        (true, false) => index.unpin_app(args.window)?,
    }
    Ok(())
}

/// Print views in the requested order.
fn views(accessor: &Accessor, args: ViewsArgs) -> Result<()> {
    let tracker = accessor.views();
    let records: Vec<ViewRecord> = if args.activation {
        tracker.snapshot_by_activation(args.filter())?
    } else {
        tracker.snapshot(args.filter())?
    };
    if args.json {
        return print_json(&records);
    }
    for v in records {
        let flags = [
            (v.on_current, 'c'),
            (v.visible, 'v'),
            (v.in_switchers, 's'),
            (v.minimized, 'm'),
        ]
        .iter()
        .map(|(set, c)| if *set { *c } else { '-' })
        .collect::<String>();
        println!("{}\t{}\t{}", v.window, v.desktop, flags);
    }
    Ok(())
}

/// Print events until `duration` elapses or Ctrl-C.
async fn watch(accessor: &Accessor, duration: Option<Duration>, json: bool) -> Result<()> {
    let mut cursor = accessor.subscribe();
    let deadline = TokioInstant::now() + duration.unwrap_or(Duration::from_secs(86_400 * 365));
    loop {
        let event = tokio::select! {
            event = accessor.next_event_until(&mut cursor, deadline) => event,
            _ = signal::ctrl_c() => None,
        };
        let Some(event) = event else {
            break;
        };
        print_event(&event, json)?;
    }
    let lag = cursor.lag;
    if lag.total() > 0 {
        eprintln!(
            "{} events dropped, {} folded into newer ones",
            lag.dropped, lag.coalesced
        );
    }
    if lag.layout_stale {
        eprintln!("desktop layout changed while events were dropped; re-run `list`");
    }
    Ok(())
}

/// Print one event.
fn print_event(event: &DesktopEvent, json: bool) -> Result<()> {
    let mut out = io::stdout().lock();
    if json {
        serde_json::to_writer(&mut out, event)?;
        writeln!(out)?;
    } else {
        writeln!(out, "{event:?}")?;
    }
    out.flush()?;
    Ok(())
}

/// Pretty-print `value` as JSON.
fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Run `fut` on a single-threaded runtime.
fn block_on<F: Future>(fut: F) -> Result<F::Output> {
    let rt = Builder::new_current_thread().enable_all().build()?;
    Ok(rt.block_on(fut))
}
