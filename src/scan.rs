//! Catalog and wishlist scan loops.
//!
//! Both scans share one shape: navigate, let the dynamic grid settle, nudge
//! the lazy loader, discover product links, then walk the links through the
//! stock classifier, reporting every available item through a callback. The
//! walk checks the scan flag before each link so a stop request lands at the
//! next iteration boundary rather than mid-navigation.

use crate::browser::{save_debug_snapshot, PageDriver};
use crate::config::Storefront;
use crate::storefront::stock::{self, ProductDetails, StockInfo};
use crate::storefront::{discovery, selectors, visible_text};
use anyhow::{bail, Context, Result};
use scraper::{Html, Selector};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const SCAN_NAV_TIMEOUT: Duration = Duration::from_secs(90);
/// Product grids hydrate well after the load event.
const CONTENT_SETTLE: Duration = Duration::from_secs(8);
/// Catalog pages only mount cards as the viewport passes them.
const CATALOG_SCROLL_JS: &str = "(async () => { for (let i = 0; i < 5; i++) { window.scrollBy(0, 1000); await new Promise(r => setTimeout(r, 800)); } })()";
const WISHLIST_SCROLL_JS: &str = "window.scrollBy(0, 500)";
/// Catalog scans stop after this many product pages.
const CATALOG_CAP: usize = 50;

// ── Scan state ──

/// Shared stop flag for the one scan that may run at a time.
#[derive(Debug, Clone, Default)]
pub struct ScanControl {
    active: Arc<AtomicBool>,
}

impl ScanControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a scan active. Fails when one is already running.
    pub fn begin(&self) -> Result<ScanGuard> {
        if self.active.swap(true, Ordering::SeqCst) {
            bail!("a scan is already in progress");
        }
        Ok(ScanGuard {
            active: Arc::clone(&self.active),
        })
    }

    /// Ask the running scan to stop at its next iteration boundary.
    pub fn request_stop(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

/// Clears the scan flag on every exit path, including panics.
pub struct ScanGuard {
    active: Arc<AtomicBool>,
}

impl Drop for ScanGuard {
    fn drop(&mut self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

// ── Results ──

/// One available product found during a scan.
#[derive(Debug, Clone, Serialize)]
pub struct ScanHit {
    pub link: String,
    #[serde(flatten)]
    pub details: ProductDetails,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanSummary {
    /// Product links discovered on the listing page.
    pub discovered: usize,
    /// Links actually visited and classified.
    pub checked: usize,
    /// Items reported through the callback.
    pub available: usize,
    /// True when a stop request ended the walk before the last link.
    pub stopped_early: bool,
}

// ── Scans ──

/// Scan a catalog page for available products.
///
/// `target` overrides the collection URL; the first 50 discovered links are
/// classified. Navigation failure aborts the scan.
pub async fn scan_catalog(
    page: &mut dyn PageDriver,
    store: &Storefront,
    control: &ScanControl,
    snapshots: bool,
    target: Option<&str>,
    on_hit: &mut (dyn FnMut(&ScanHit) + Send),
) -> Result<ScanSummary> {
    let url = match target {
        Some(t) => t.to_string(),
        None => store.fallback_collection_url(),
    };
    info!(url = %url, "starting catalog scan");
    page.goto(&url, SCAN_NAV_TIMEOUT)
        .await
        .context("could not open the catalog page")?;
    tokio::time::sleep(CONTENT_SETTLE).await;

    let _ = page.evaluate(CATALOG_SCROLL_JS).await;
    if snapshots {
        let _ = save_debug_snapshot(page, "catalog").await;
    }

    let links = discovery::discover_on_page(page).await;
    info!(count = links.len(), "product links discovered");

    run_stock_loop(page, control, &links, Some(CATALOG_CAP), on_hit).await
}

/// Scan the account wishlist for available products.
///
/// Aborts before iterating when the page shows an anti-bot wall or a login
/// prompt; an empty first pass gets one reload-and-retry. All links are
/// classified, without a cap.
pub async fn scan_wishlist(
    page: &mut dyn PageDriver,
    store: &Storefront,
    control: &ScanControl,
    snapshots: bool,
    on_hit: &mut (dyn FnMut(&ScanHit) + Send),
) -> Result<ScanSummary> {
    let url = store.wishlist_url();
    info!(url = %url, "starting wishlist scan");
    page.goto(&url, SCAN_NAV_TIMEOUT)
        .await
        .context("could not open the wishlist")?;
    tokio::time::sleep(CONTENT_SETTLE).await;
    let _ = page.evaluate(WISHLIST_SCROLL_JS).await;
    if snapshots {
        let _ = save_debug_snapshot(page, "wishlist").await;
    }

    let html = page
        .html()
        .await
        .context("could not read the wishlist page")?;
    let gate = tokio::task::spawn_blocking(move || classify_wishlist_gate(&html))
        .await
        .unwrap_or(WishlistGate::Open);
    match gate {
        WishlistGate::AccessDenied => {
            bail!("access denied or security challenge on the wishlist; run `vouchsafe login` to refresh the session")
        }
        WishlistGate::LoginRequired => {
            bail!("login required; run `vouchsafe login` before scanning the wishlist")
        }
        WishlistGate::Open => {}
    }

    let mut links = discovery::discover_on_page(page).await;
    if links.is_empty() {
        // Wishlists routinely render blank on first paint; one reload
        // usually shakes the cards loose.
        warn!("no links on first pass; reloading once");
        page.reload().await.context("wishlist reload failed")?;
        tokio::time::sleep(CONTENT_SETTLE).await;
        let _ = page.evaluate(WISHLIST_SCROLL_JS).await;
        links = discovery::discover_on_page(page).await;
    }
    info!(count = links.len(), "wishlist links discovered");

    run_stock_loop(page, control, &links, None, on_hit).await
}

async fn run_stock_loop(
    page: &mut dyn PageDriver,
    control: &ScanControl,
    links: &[String],
    cap: Option<usize>,
    on_hit: &mut (dyn FnMut(&ScanHit) + Send),
) -> Result<ScanSummary> {
    let limit = cap.unwrap_or(links.len()).min(links.len());
    let mut summary = ScanSummary {
        discovered: links.len(),
        checked: 0,
        available: 0,
        stopped_early: false,
    };
    for link in &links[..limit] {
        if !control.is_active() {
            info!("stop requested; ending scan early");
            summary.stopped_early = true;
            break;
        }
        summary.checked += 1;
        match stock::check_stock(page, link).await {
            StockInfo::Available(details) => {
                summary.available += 1;
                info!(link = %link, title = %details.title, "available item found");
                on_hit(&ScanHit {
                    link: link.clone(),
                    details,
                });
            }
            StockInfo::Unavailable { reason } => {
                debug!(link = %link, %reason, "item not available");
            }
        }
    }
    Ok(summary)
}

// ── Wishlist gating ──

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WishlistGate {
    Open,
    AccessDenied,
    LoginRequired,
}

/// Decide whether the wishlist page is actually showing the wishlist.
///
/// Denied takes precedence over login: challenge walls frequently embed a
/// sign-in link of their own.
pub fn classify_wishlist_gate(html: &str) -> WishlistGate {
    let book = selectors::book();
    let document = Html::parse_document(html);
    let text = visible_text(&document).to_lowercase();

    if book
        .wishlist
        .denied_phrases
        .iter()
        .any(|p| text.contains(p.as_str()))
    {
        return WishlistGate::AccessDenied;
    }

    let phrase_hit = book
        .wishlist
        .login_phrases
        .iter()
        .any(|p| text.contains(p.as_str()));
    let selector_hit = book.wishlist.login_selectors.iter().any(|raw| {
        Selector::parse(raw)
            .map(|sel| document.select(&sel).next().is_some())
            .unwrap_or(false)
    });
    if phrase_hit || selector_hit {
        return WishlistGate::LoginRequired;
    }

    WishlistGate::Open
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_control_begin_and_stop() {
        let control = ScanControl::new();
        assert!(!control.is_active());

        let guard = control.begin().expect("first begin should succeed");
        assert!(control.is_active());
        assert!(control.begin().is_err(), "second begin must be refused");

        control.request_stop();
        assert!(!control.is_active());
        drop(guard);

        // A fresh scan can start after the previous one wound down.
        let _guard = control.begin().expect("begin after stop should succeed");
        assert!(control.is_active());
    }

    #[test]
    fn test_guard_drop_clears_flag() {
        let control = ScanControl::new();
        {
            let _guard = control.begin().expect("begin failed");
            assert!(control.is_active());
        }
        assert!(!control.is_active());
    }

    #[test]
    fn test_gate_open_on_ordinary_wishlist() {
        let html = r#"<html><body>
            <div class="wish-list__item"><a href="/p-saved.html">Saved</a></div>
        </body></html>"#;
        assert_eq!(classify_wishlist_gate(html), WishlistGate::Open);
    }

    #[test]
    fn test_gate_detects_access_denied() {
        let html = "<html><body><h1>Access Denied</h1><p>You don't have permission.</p></body></html>";
        assert_eq!(classify_wishlist_gate(html), WishlistGate::AccessDenied);
    }

    #[test]
    fn test_gate_detects_cookie_challenge() {
        let html = "<html><body><p>Please enable cookies and try again.</p></body></html>";
        assert_eq!(classify_wishlist_gate(html), WishlistGate::AccessDenied);
    }

    #[test]
    fn test_gate_detects_login_phrase() {
        let html = "<html><body><h2>Sign In to view your wishlist</h2></body></html>";
        assert_eq!(classify_wishlist_gate(html), WishlistGate::LoginRequired);
    }

    #[test]
    fn test_gate_detects_login_container() {
        let html = r#"<html><body><div id="login-box"><form></form></div></body></html>"#;
        assert_eq!(classify_wishlist_gate(html), WishlistGate::LoginRequired);
    }

    #[test]
    fn test_denied_wins_over_login() {
        // Challenge pages carry their own sign-in links.
        let html = "<html><body><h1>Access denied</h1><a href=\"/login\">Sign in</a></body></html>";
        assert_eq!(classify_wishlist_gate(html), WishlistGate::AccessDenied);
    }

    #[test]
    fn test_script_text_does_not_trigger_gates() {
        let html = r#"<html><body>
            <script>var s = {msg: "access denied", hint: "sign in"};</script>
            <div class="wish-list__item"><a href="/p-ok.html">ok</a></div>
        </body></html>"#;
        assert_eq!(classify_wishlist_gate(html), WishlistGate::Open);
    }
}
