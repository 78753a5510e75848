//! Storefront selector book.
//!
//! Every CSS selector, URL marker, and text phrase the engine matches against
//! the storefront lives in `selectors.json`, embedded at compile time via
//! `include_str!`. Keeping them out of the code means a storefront redesign is
//! a data change, not a logic change.

use serde::Deserialize;
use std::sync::OnceLock;

/// Raw JSON content of the selector book, embedded at compile time so there
/// is no runtime file I/O.
const SELECTORS_JSON: &str = include_str!("selectors.json");

static BOOK: OnceLock<SelectorBook> = OnceLock::new();

/// The parsed selector book. Parsing happens once; the embedded JSON is
/// validated by a unit test, so a failure here means a broken build asset.
pub fn book() -> &'static SelectorBook {
    BOOK.get_or_init(|| {
        serde_json::from_str(SELECTORS_JSON).expect("embedded selectors.json must parse")
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct SelectorBook {
    pub discovery: DiscoverySelectors,
    pub product: ProductSelectors,
    pub cart: CartSelectors,
    pub navigation: NavigationMarkers,
    pub wishlist: WishlistSelectors,
}

/// Selectors and URL markers for finding product links in listing pages.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoverySelectors {
    /// Path fragment that identifies a product detail URL.
    pub product_href_marker: String,
    /// Hrefs containing any of these fragments are never product links.
    pub excluded_href_fragments: Vec<String>,
    /// Structural selectors for product card anchors, covering the grid,
    /// list, and wishlist layouts the storefront renders.
    pub card_anchors: Vec<String>,
}

/// Selectors for the product detail page.
#[derive(Debug, Clone, Deserialize)]
pub struct ProductSelectors {
    /// Phrases in visible page text that mean the item is gone.
    pub sold_out_phrases: Vec<String>,
    /// Matches only size options that are still orderable.
    pub size_options: String,
    pub title: String,
    pub price: String,
    /// Button labels that count as the purchase button when classifying stock.
    pub stock_button_labels: Vec<String>,
    /// Button labels accepted when actually clicking add-to-cart.
    pub add_button_labels: Vec<String>,
    /// Element selectors searched for the add-to-cart button.
    pub add_button_selectors: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CartSelectors {
    /// Header badges that carry the cart item count. First one with a
    /// leading integer wins.
    pub count_badges: Vec<String>,
}

/// URL shapes involved in landing on a product page.
#[derive(Debug, Clone, Deserialize)]
pub struct NavigationMarkers {
    /// Query parameter some share links carry with the real product URL.
    pub deeplink_param: String,
    /// Hosts that serve app-install interstitials instead of the product.
    pub deeplink_hosts: Vec<String>,
    /// Alternate product URL shapes that also count as a product page.
    pub product_url_fallback_markers: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WishlistSelectors {
    /// Phrases meaning the anti-bot wall blocked the page.
    pub denied_phrases: Vec<String>,
    /// Phrases meaning the storefront is asking for a login.
    pub login_phrases: Vec<String>,
    /// Login form containers; presence of any means a login prompt.
    pub login_selectors: Vec<String>,
}

impl DiscoverySelectors {
    pub fn is_product_href(&self, href: &str) -> bool {
        href.contains(&self.product_href_marker)
    }

    pub fn is_excluded_href(&self, href: &str) -> bool {
        self.excluded_href_fragments.iter().any(|f| href.contains(f))
    }
}

impl NavigationMarkers {
    pub fn is_deeplink_url(&self, url: &str) -> bool {
        self.deeplink_hosts.iter().any(|h| url.contains(h))
    }

    pub fn has_fallback_product_marker(&self, url: &str) -> bool {
        self.product_url_fallback_markers
            .iter()
            .any(|m| url.contains(m))
    }
}
