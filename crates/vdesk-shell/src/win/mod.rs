//! Windows backend over the shell's COM interfaces.

mod backend;
mod interfaces;
mod listener;

pub use backend::WinShell;
