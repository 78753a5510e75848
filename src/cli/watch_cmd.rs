//! `vouchsafe watch` — re-check protected codes on a cadence.

use super::output;
use crate::audit::AuditLogger;
use crate::config::Config;
use crate::protect::{self, Roster, StatusChange};
use crate::session::SessionHost;
use anyhow::{bail, Result};
use std::time::Duration;
use tracing::info;

pub async fn run(codes: &[String], interval_secs: u64) -> Result<()> {
    let codes: Vec<String> = if codes.is_empty() {
        Roster::open(&Roster::default_path())?.codes()
    } else {
        codes.iter().map(|c| c.trim().to_uppercase()).collect()
    };
    if codes.is_empty() {
        bail!("roster is empty; add codes with `vouchsafe protect add <CODE>` or pass them directly");
    }

    let host = SessionHost::new(Config::from_env());
    let interval = Duration::from_secs(interval_secs);
    output::print_line(&format!(
        "watching {} code(s) every {}s; Ctrl-C to stop",
        codes.len(),
        interval.as_secs()
    ));

    let mut audit = AuditLogger::default_logger().ok();
    let mut on_change = |change: &StatusChange| {
        if output::is_json() {
            output::print_json(change);
        } else {
            let from = change
                .from
                .map(|s| s.to_string())
                .unwrap_or_else(|| "-".to_string());
            output::print_line(&format!("{}  {} -> {}", change.code, from, change.to));
        }
        if let Some(audit) = audit.as_mut() {
            let _ = audit.log_operation(
                "watch",
                Some(&change.code),
                None,
                &change.to.to_string(),
                None,
            );
        }
    };

    let result = tokio::select! {
        res = protect::run_watch(&host, &codes, interval, &mut on_change) => res,
        _ = tokio::signal::ctrl_c() => {
            info!("watch interrupted");
            Ok(())
        }
    };
    host.teardown().await;
    result
}
