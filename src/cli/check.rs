//! `vouchsafe check` — classify voucher codes against the storefront cart.

use super::output;
use crate::audit::AuditLogger;
use crate::config::Config;
use crate::session::{CheckOptions, SessionHost};
use crate::storefront::voucher::VoucherStatus;
use anyhow::{bail, Result};
use std::time::Instant;
use tracing::warn;

pub async fn run(codes: &[String], keep_open: bool) -> Result<()> {
    if codes.is_empty() {
        bail!("no codes given; pass one or more voucher codes");
    }
    let normalized: Vec<String> = codes.iter().map(|c| c.trim().to_uppercase()).collect();

    let host = SessionHost::new(Config::from_env());
    let cart_url = host.config().storefront.cart_url();

    let started = Instant::now();
    let results = host
        .check_codes(
            &normalized,
            CheckOptions {
                keep_session: keep_open,
            },
        )
        .await?;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    // Audit rows are best-effort; a full disk never blocks the answer.
    match AuditLogger::default_logger() {
        Ok(mut audit) => {
            for r in &results {
                let _ = audit.log_operation(
                    "check",
                    Some(&r.code),
                    None,
                    &r.status.to_string(),
                    None,
                );
            }
            let _ = audit.log_operation("check", None, Some(&cart_url), "batch", Some(elapsed_ms));
        }
        Err(e) => warn!(error = %e, "audit log unavailable"),
    }

    if output::is_json() {
        output::print_json(&serde_json::json!({
            "results": results,
            "elapsed_ms": elapsed_ms,
        }));
        return Ok(());
    }

    for r in &results {
        output::print_line(&format!("{:<18} {}", r.code, r.status));
    }
    let applicable = results
        .iter()
        .filter(|r| r.status == VoucherStatus::Applicable)
        .count();
    output::print_line(&format!(
        "{} checked, {} applicable ({elapsed_ms}ms)",
        results.len(),
        applicable
    ));
    if keep_open {
        output::print_line("browser left open (--keep-open)");
    }
    Ok(())
}
