//! `vouchsafe login` — open a visible browser window for manual login.

use super::output;
use crate::audit::AuditLogger;
use crate::config::Config;
use crate::session::SessionHost;
use anyhow::Result;
use std::time::Instant;
use tracing::warn;

pub async fn run() -> Result<()> {
    let host = SessionHost::new(Config::from_env());
    output::print_line("A browser window will open on the storefront.");
    output::print_line("Log in there; the window closes itself after five minutes.");

    let started = Instant::now();
    host.interactive_login().await?;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    match AuditLogger::default_logger() {
        Ok(mut audit) => {
            let _ = audit.log_operation("login", None, None, "ok", Some(elapsed_ms));
        }
        Err(e) => warn!(error = %e, "audit log unavailable"),
    }

    output::print_line("Login window closed; profile saved for future sessions.");
    Ok(())
}
