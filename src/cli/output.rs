//! Output mode helpers shared by every subcommand.
//!
//! The binary sets `VOUCHSAFE_JSON` / `VOUCHSAFE_QUIET` from the global
//! flags before dispatching, so any module can check the mode without
//! threading flags through every call.

use serde::Serialize;

/// Whether `--json` was given.
pub fn is_json() -> bool {
    std::env::var("VOUCHSAFE_JSON").is_ok()
}

/// Whether `--quiet` was given.
pub fn is_quiet() -> bool {
    std::env::var("VOUCHSAFE_QUIET").is_ok()
}

/// Print a value as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("could not serialize output: {e}"),
    }
}

/// Print a human line on stdout unless quiet or JSON mode is on.
pub fn print_line(line: &str) {
    if !is_quiet() && !is_json() {
        println!("{line}");
    }
}
