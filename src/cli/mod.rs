//! CLI subcommand implementations for the vouchsafe binary.

pub mod check;
pub mod doctor;
pub mod generate_cmd;
pub mod login;
pub mod output;
pub mod protect_cmd;
pub mod scan_cmd;
pub mod watch_cmd;
pub mod wishlist_cmd;
