//! `vouchsafe scan` — walk a catalog collection for in-stock products.

use super::output;
use crate::audit::AuditLogger;
use crate::config::Config;
use crate::events::EngineEvent;
use crate::session::SessionHost;
use anyhow::Result;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast::error::TryRecvError;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub async fn run(target: Option<&str>, keep_open: bool) -> Result<()> {
    let host = Arc::new(SessionHost::new(Config::from_env()));
    let url = match target {
        Some(t) => t.to_string(),
        None => host.config().storefront.fallback_collection_url(),
    };

    let mut rx = host.events().subscribe();
    let stopper = spawn_stopper(&host);

    let started = Instant::now();
    let outcome = host.scan_catalog(target).await;
    stopper.abort();
    if !keep_open {
        host.teardown().await;
    }
    let elapsed_ms = started.elapsed().as_millis() as u64;

    let hits = drain_hits(&mut rx);
    audit_scan("scan_catalog", &url, outcome.is_ok(), elapsed_ms);

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

/// First Ctrl-C asks the scan to stop at the next link; a second one
/// falls through to the default handler and kills the process.
pub(super) fn spawn_stopper(host: &Arc<SessionHost>) -> JoinHandle<()> {
    let host = Arc::clone(host);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("stop requested; finishing the current item");
            host.request_stop();
        }
    })
}

/// Collect ProductFound events left on the bus after a scan.
pub(super) fn drain_hits(
    rx: &mut tokio::sync::broadcast::Receiver<EngineEvent>,
) -> Vec<serde_json::Value> {
    let mut hits = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(EngineEvent::ProductFound { link, title, price }) => {
                hits.push(serde_json::json!({
                    "link": link,
                    "title": title,
                    "price": price,
                }));
            }
            Ok(_) => {}
            Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    hits
}

pub(super) fn audit_scan(operation: &str, url: &str, ok: bool, elapsed_ms: u64) {
    match AuditLogger::default_logger() {
        Ok(mut audit) => {
            let status = if ok { "ok" } else { "failed" };
            let _ = audit.log_operation(operation, None, Some(url), status, Some(elapsed_ms));
        }
        Err(e) => warn!(error = %e, "audit log unavailable"),
    }
}
