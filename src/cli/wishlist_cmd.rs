//! `vouchsafe wishlist` — scan the account wishlist for in-stock products.

use super::output;
use super::scan_cmd::{audit_scan, drain_hits, spawn_stopper};
use crate::config::Config;
use crate::session::SessionHost;
use anyhow::Result;
use std::sync::Arc;
use std::time::Instant;

pub async fn run(keep_open: bool) -> Result<()> {
    let host = Arc::new(SessionHost::new(Config::from_env()));
    let url = host.config().storefront.wishlist_url();

    let mut rx = host.events().subscribe();
    let stopper = spawn_stopper(&host);

    let started = Instant::now();
    let outcome = host.scan_wishlist().await;
    stopper.abort();
    if !keep_open {
        host.teardown().await;
    }
    let elapsed_ms = started.elapsed().as_millis() as u64;

    let hits = drain_hits(&mut rx);
    audit_scan("scan_wishlist", &url, outcome.is_ok(), elapsed_ms);

    let summary = outcome?;
    if output::is_json() {
        output::print_json(&serde_json::json!({
            "summary": summary,
            "hits": hits,
            "elapsed_ms": elapsed_ms,
        }));
        return Ok(());
    }

    for hit in &hits {
        output::print_line(&format!(
            "{}  {}  {}",
            hit["title"].as_str().unwrap_or("?"),
            hit["price"].as_str().unwrap_or("?"),
            hit["link"].as_str().unwrap_or("?")
        ));
    }
    output::print_line(&format!(
        "{} discovered, {} checked, {} available{} ({elapsed_ms}ms)",
        summary.discovered,
        summary.checked,
        summary.available,
        if summary.stopped_early {
            ", stopped early"
        } else {
            ""
        }
    ));
    Ok(())
}
