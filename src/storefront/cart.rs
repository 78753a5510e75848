//! Cart preconditioning: the voucher API rejects every code against an empty
//! cart, so before a batch runs the cart must hold at least one item.
//!
//! The add-to-cart flow here is deliberately forgiving. Product share links
//! bounce through app-install interstitials, navigations time out after the
//! DOM is already usable, and overlays swallow the first click. Each step
//! tolerates failure and the final cart badge count is the only verdict that
//! counts.

use super::discovery;
use super::element_text;
use super::selectors::book;
use super::stock;
use crate::browser::{
    js_string, navigate_lenient, save_debug_snapshot, wait_for_selector, PageDriver,
};
use crate::config::Storefront;
use regex::Regex;
use scraper::{Html, Selector};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Navigation budget when opening a product page to add it.
const ADD_NAV_TIMEOUT: Duration = Duration::from_secs(90);
/// Settle delay after the product navigation.
const ADD_SETTLE: Duration = Duration::from_secs(5);
/// Navigation budget when following a decoded deep link.
const DEEPLINK_NAV_TIMEOUT: Duration = Duration::from_secs(60);
const DEEPLINK_SETTLE: Duration = Duration::from_secs(5);
/// Navigation budget for the hop from a landing page to a product.
const HUNT_NAV_TIMEOUT: Duration = Duration::from_secs(60);
const HUNT_SETTLE: Duration = Duration::from_secs(4);
/// Delay after selecting a size, letting the price block re-render.
const SIZE_SETTLE: Duration = Duration::from_secs(1);
/// How long to wait for any button to exist before clicking.
const BUTTON_WAIT: Duration = Duration::from_secs(5);
/// Delay after the add click before trusting the cart badge.
const POST_CLICK_SETTLE: Duration = Duration::from_secs(5);
/// Navigation budget for the fallback collection page.
const COLLECTION_NAV_TIMEOUT: Duration = Duration::from_secs(60);
/// Settle delay for the collection page, which lazy-loads its grid.
const COLLECTION_SETTLE: Duration = Duration::from_secs(6);
/// Delay after the lazy-load scroll nudge.
const SCROLL_SETTLE: Duration = Duration::from_secs(2);
/// Navigation budget for returning to the cart after an add.
const CART_NAV_TIMEOUT: Duration = Duration::from_secs(30);
/// Settle delay after returning to the cart.
const CART_RETURN_SETTLE: Duration = Duration::from_secs(3);
/// How many discovered links the fallback will try before giving up.
const FALLBACK_CANDIDATES: usize = 5;

/// Result of one add-to-cart attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    Added { cart_count: u32 },
    Failed { reason: String },
}

impl AddOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, AddOutcome::Added { .. })
    }
}

/// Drives cart state on a live page.
pub struct CartEngine<'a> {
    store: &'a Storefront,
    snapshots: bool,
}

impl<'a> CartEngine<'a> {
    pub fn new(store: &'a Storefront, snapshots: bool) -> Self {
        Self { store, snapshots }
    }

    /// Read the cart item count from the header badge on the current page.
    /// Any failure reads as zero.
    pub async fn cart_item_count(&self, page: &mut dyn PageDriver) -> u32 {
        let html = match page.html().await {
            Ok(h) => h,
            Err(e) => {
                debug!(error = %e, "could not read page for cart badge");
                return 0;
            }
        };
        tokio::task::spawn_blocking(move || parse_cart_count(&html))
            .await
            .unwrap_or(0)
    }

    /// Make sure the cart holds at least one item, sourcing a filler item
    /// from the fallback collection when it is empty. The caller is expected
    /// to already be on the cart page.
    pub async fn ensure_cart_has_item(&self, page: &mut dyn PageDriver) -> bool {
        let mut count = self.cart_item_count(page).await;
        info!(count, "cart item count");

        if count == 0 {
            info!("cart is empty; adding a filler item");
            if !self.add_fallback_item(page).await {
                return false;
            }
            navigate_lenient(page, &self.store.cart_url(), CART_NAV_TIMEOUT).await;
            tokio::time::sleep(CART_RETURN_SETTLE).await;
            count = self.cart_item_count(page).await;
        }

        count > 0
    }

    /// Open a product page and put the item in the cart, verifying through
    /// the cart badge.
    pub async fn add_to_cart(&self, page: &mut dyn PageDriver, product_url: &str) -> AddOutcome {
        let book = book();

        navigate_lenient(page, product_url, ADD_NAV_TIMEOUT).await;
        tokio::time::sleep(ADD_SETTLE).await;

        let mut current = page
            .current_url()
            .await
            .unwrap_or_else(|_| product_url.to_string());

        // Share links hide the real product URL behind a deep-link parameter.
        if let Some(target) = deep_link_target(&current, &book.navigation.deeplink_param) {
            info!(target = %target, "following deep link");
            navigate_lenient(page, &target, DEEPLINK_NAV_TIMEOUT).await;
            tokio::time::sleep(DEEPLINK_SETTLE).await;
            current = page.current_url().await.unwrap_or(current);
        }

        // Landed on an interstitial or a category page: hop to the first
        // product link we can find on it.
        let on_deeplink_host = book.navigation.is_deeplink_url(&current);
        let on_product = book.discovery.is_product_href(&current);
        let on_alt_product = book.navigation.has_fallback_product_marker(&current);
        if (on_deeplink_host || !on_product) && !on_alt_product {
            warn!(url = %current, "not on a product page; hunting for one");
            let links = discovery::discover_on_page(page).await;
            match links.first() {
                Some(first) => {
                    info!(link = %first, "hopping to first product link");
                    navigate_lenient(page, first, HUNT_NAV_TIMEOUT).await;
                    tokio::time::sleep(HUNT_SETTLE).await;
                }
                None => debug!("no product links on landing page; aborting hunt"),
            }
        }

        // A corner click dismisses overlays that would swallow the real one.
        let _ = page.click_at(10.0, 10.0).await;

        let _ = page
            .evaluate(&select_first_size_script(&book.product.size_options))
            .await;
        tokio::time::sleep(SIZE_SETTLE).await;

        wait_for_selector(page, "button", BUTTON_WAIT).await;

        let click_script = click_add_button_script(
            &book.product.add_button_selectors,
            &book.product.add_button_labels,
        );
        let clicked = match page.evaluate(&click_script).await {
            Ok(v) => v.as_bool().unwrap_or(false),
            Err(e) => {
                warn!(error = %e, "add-to-cart click could not run");
                if self.snapshots {
                    let _ = save_debug_snapshot(page, "add_error").await;
                }
                return AddOutcome::Failed {
                    reason: format!("add click failed: {e}"),
                };
            }
        };

        if !clicked {
            warn!("no enabled add-to-cart button on the page");
            if self.snapshots {
                let _ = save_debug_snapshot(page, "add_fail").await;
            }
            return AddOutcome::Failed {
                reason: "Add button not found".to_string(),
            };
        }

        info!("clicked add to bag; waiting for the cart badge");
        tokio::time::sleep(POST_CLICK_SETTLE).await;

        let count = self.cart_item_count(page).await;
        if count > 0 {
            info!(count, "item added to cart");
            AddOutcome::Added { cart_count: count }
        } else {
            AddOutcome::Failed {
                reason: "Verification failed".to_string(),
            }
        }
    }

    /// Source one available item from the fallback collection and add it.
    /// Tries the first few discovered links, skipping unavailable products.
    pub async fn add_fallback_item(&self, page: &mut dyn PageDriver) -> bool {
        info!("sourcing a filler item from the fallback collection");
        navigate_lenient(
            page,
            &self.store.fallback_collection_url(),
            COLLECTION_NAV_TIMEOUT,
        )
        .await;
        tokio::time::sleep(COLLECTION_SETTLE).await;

        // Nudge the lazy loader.
        let _ = page.evaluate("window.scrollBy(0, 500)").await;
        tokio::time::sleep(SCROLL_SETTLE).await;

        let links = discovery::discover_on_page(page).await;
        info!(count = links.len(), "product links in fallback collection");
        if links.is_empty() {
            if self.snapshots {
                let _ = save_debug_snapshot(page, "no_links").await;
            }
            return false;
        }

        for link in links.iter().take(FALLBACK_CANDIDATES) {
            debug!(link = %link, "checking fallback candidate");
            let info = stock::check_stock(page, link).await;
            if !info.is_available() {
                continue;
            }
            if self.add_to_cart(page, link).await.succeeded() {
                return true;
            }
        }
        false
    }
}

/// Pull the item count out of the first header badge with a leading integer.
fn parse_cart_count(html: &str) -> u32 {
    let book = book();
    let combined = book.cart.count_badges.join(", ");
    let Ok(sel) = Selector::parse(&combined) else {
        return 0;
    };
    let document = Html::parse_document(html);
    for el in document.select(&sel) {
        if let Some(n) = leading_int(&element_text(&el)) {
            return n;
        }
    }
    0
}

fn leading_int(text: &str) -> Option<u32> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"^\d+").expect("static regex"));
    re.find(text.trim()).and_then(|m| m.as_str().parse().ok())
}

/// Extract the decoded deep-link target from a URL, if present.
fn deep_link_target(url: &str, param: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let value = parsed
        .query_pairs()
        .find(|(k, _)| k == param)
        .map(|(_, v)| v.into_owned())?;
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

fn select_first_size_script(size_selector: &str) -> String {
    format!(
        "(() => {{ const sizes = document.querySelectorAll({sel}); if (sizes.length > 0) {{ sizes[0].click(); return true; }} return false; }})()",
        sel = js_string(size_selector)
    )
}

fn click_add_button_script(selectors: &[String], labels: &[String]) -> String {
    let sel = js_string(&selectors.join(", "));
    let labels_js = serde_json::to_string(labels).unwrap_or_else(|_| "[]".to_string());
    format!(
        r#"(() => {{
  const labels = {labels_js};
  const btns = Array.from(document.querySelectorAll({sel}));
  const addBtn = btns.find(b => {{
    const text = (b.innerText || '').toUpperCase();
    return labels.some(l => text.includes(l));
  }});
  if (addBtn && !addBtn.disabled) {{
    addBtn.scrollIntoView();
    addBtn.click();
    return true;
  }}
  return false;
}})()"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cart_count_first_badge_wins() {
        let html = r#"<html><body>
            <span class="j-bag-count">3</span>
            <span class="header-cart-count">7</span>
        </body></html>"#;
        assert_eq!(parse_cart_count(html), 3);
    }

    #[test]
    fn test_parse_cart_count_skips_non_numeric_badges() {
        let html = r#"<html><body>
            <span class="j-bag-count">Bag</span>
            <div class="iconfont-gouwudai"><i class="num"> 2 items</i></div>
        </body></html>"#;
        assert_eq!(parse_cart_count(html), 2);
    }

    #[test]
    fn test_parse_cart_count_empty_page() {
        assert_eq!(parse_cart_count("<html><body></body></html>"), 0);
        assert_eq!(
            parse_cart_count(r#"<span class="j-bag-count"></span>"#),
            0
        );
    }

    #[test]
    fn test_deep_link_target() {
        let url = "https://shein.onelink.me/go?pid=web&deep_link_value=https%3A%2F%2Fwww.shop.example%2Fp-item-1.html";
        assert_eq!(
            deep_link_target(url, "deep_link_value").as_deref(),
            Some("https://www.shop.example/p-item-1.html")
        );
        assert_eq!(
            deep_link_target("https://www.shop.example/p-item-1.html", "deep_link_value"),
            None
        );
        assert_eq!(deep_link_target("not a url", "deep_link_value"), None);
    }

    #[test]
    fn test_click_script_embeds_labels_and_selectors() {
        let script = click_add_button_script(
            &[
                "button".to_string(),
                ".product-intro__add-btn".to_string(),
            ],
            &["ADD TO BAG".to_string(), "ADD TO CART".to_string()],
        );
        assert!(script.contains(r#""button, .product-intro__add-btn""#));
        assert!(script.contains(r#"["ADD TO BAG","ADD TO CART"]"#));
        assert!(script.contains("!addBtn.disabled"));
    }

    #[test]
    fn test_size_script_quotes_selector() {
        let script = select_first_size_script(".a:not(.b)");
        assert!(script.contains(r#"querySelectorAll(".a:not(.b)")"#));
    }
}
