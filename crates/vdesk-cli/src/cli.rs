//! Command-line interface definitions for `vdesk`.

use std::{num::ParseIntError, path::PathBuf, time::Duration};

use clap::{Args, Parser, Subcommand};
use logging::LogArgs;
use vdesk_core::{ViewFilter, WindowHandle};

/// Command-line interface for the `vdesk` binary.
#[derive(Parser, Debug)]
#[command(name = "vdesk", about = "Inspect and control virtual desktops", version)]
pub struct Cli {
    /// Logging controls shared across vdesk binaries.
    #[command(flatten)]
    pub log: LogArgs,

    /// Accessor configuration file (RON).
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Which operation to run.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the number of desktops.
    Count,
    /// Print the current desktop number.
    Current,
    /// List desktops with their identifiers and names.
    List {
        /// Emit JSON instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Switch to a desktop.
    Switch {
        /// Desktop number (0-based).
        number: usize,
        /// Wait until the switch is observed, up to this long.
        #[arg(long, value_parser = humantime::parse_duration, value_name = "DURATION")]
        wait: Option<Duration>,
    },
    /// Print the desktop number of a window.
    Window(WindowArg),
    /// Move a window to a desktop.
    Move {
        /// Window handle (decimal or 0x-prefixed hex).
        #[arg(value_parser = parse_handle)]
        window: WindowHandle,
        /// Target desktop number.
        number: usize,
    },
    /// Pin a window, or its application, to every desktop.
    Pin(PinArgs),
    /// Undo a pin.
    Unpin(PinArgs),
    /// List views front-to-back.
    Views(ViewsArgs),
    /// Focus a window, switching desktops if needed.
    Focus(WindowArg),
    /// Append a desktop and print its number.
    Create,
    /// Remove a desktop.
    Remove {
        /// Desktop to remove.
        number: usize,
        /// Desktop that receives its windows.
        #[arg(long)]
        fallback: usize,
    },
    /// Rename a desktop.
    Rename {
        /// Desktop number.
        number: usize,
        /// New name.
        name: String,
    },
    /// Print change events as they happen.
    Watch {
        /// Stop after this long instead of waiting for Ctrl-C.
        #[arg(long = "for", value_parser = humantime::parse_duration, value_name = "DURATION")]
        duration: Option<Duration>,
        /// Emit one JSON object per line.
        #[arg(long)]
        json: bool,
    },
    /// Re-acquire every shell interface.
    Restart,
}

/// A single window handle argument.
#[derive(Args, Debug, Clone, Copy)]
pub struct WindowArg {
    /// Window handle (decimal or 0x-prefixed hex).
    #[arg(value_parser = parse_handle)]
    pub window: WindowHandle,
}

/// Arguments for `pin` and `unpin`.
#[derive(Args, Debug, Clone, Copy)]
pub struct PinArgs {
    /// Window handle (decimal or 0x-prefixed hex).
    #[arg(value_parser = parse_handle)]
    pub window: WindowHandle,
    /// Apply to every window of the owning application.
    #[arg(long)]
    pub app: bool,
}

/// Arguments for `views`.
#[derive(Args, Debug, Clone, Copy)]
pub struct ViewsArgs {
    /// Order by most recent activation instead of Z-order.
    #[arg(long)]
    pub activation: bool,
    /// Only views listed in the task switcher.
    #[arg(long)]
    pub switcher_only: bool,
    /// Only views on the current desktop.
    #[arg(long)]
    pub current_only: bool,
    /// Emit full view records as JSON.
    #[arg(long)]
    pub json: bool,
}

impl ViewsArgs {
    /// Filter selected by the flags.
    pub const fn filter(&self) -> ViewFilter {
        ViewFilter {
            switcher_only: self.switcher_only,
            current_desktop_only: self.current_only,
        }
    }
}

/// Parse a window handle in decimal or `0x` hex.
pub fn parse_handle(s: &str) -> Result<WindowHandle, ParseIntError> {
    let raw = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => isize::from_str_radix(hex, 16)?,
        None => s.parse()?,
    };
    Ok(WindowHandle::new(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_parse_in_both_bases() {
        assert_eq!(parse_handle("0x1f").unwrap(), WindowHandle::new(31));
        assert_eq!(parse_handle("31").unwrap(), WindowHandle::new(31));
        assert!(parse_handle("0xzz").is_err());
    }

    #[test]
    fn switch_accepts_humantime_wait() {
        let cli = Cli::try_parse_from(["vdesk", "switch", "2", "--wait", "1s 500ms"]).unwrap();
        match cli.command {
            Commands::Switch { number, wait } => {
                assert_eq!(number, 2);
                assert_eq!(wait, Some(Duration::from_millis(1500)));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn views_flags_build_filter() {
        let cli =
            Cli::try_parse_from(["vdesk", "views", "--current-only", "--activation"]).unwrap();
        let Commands::Views(args) = cli.command else {
            panic!("expected views");
        };
        assert!(args.activation);
        assert_eq!(
            args.filter(),
            ViewFilter {
                switcher_only: false,
                current_desktop_only: true
            }
        );
    }

    #[test]
    fn remove_requires_fallback() {
        assert!(Cli::try_parse_from(["vdesk", "remove", "1"]).is_err());
        let cli = Cli::try_parse_from([
            "vdesk", "--config", "a.ron", "remove", "1", "--fallback", "0",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("a.ron")));
    }
}
