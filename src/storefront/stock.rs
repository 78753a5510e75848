//! Product availability classification.
//!
//! `classify_stock` is a pure function of the product page HTML. The checks
//! run in strict precedence order: a sold-out phrase anywhere in the visible
//! page text wins over everything, then the absence of orderable sizes, then
//! a missing or disabled purchase button. Only a page that clears all three
//! is reported available.

use super::selectors::book;
use super::{element_text, visible_text};
use crate::browser::PageDriver;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// Navigation budget for a product page before it counts as unreachable.
const PRODUCT_NAV_TIMEOUT: Duration = Duration::from_secs(30);
/// Settle delay after navigation, letting client-side rendering finish.
const PRODUCT_SETTLE: Duration = Duration::from_secs(2);

/// Fallback title when the product page carries none.
const DEFAULT_TITLE: &str = "Product";
/// Fallback price when the price block is missing.
const DEFAULT_PRICE: &str = "Unknown";

/// Availability verdict for one product page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "availability", rename_all = "snake_case")]
pub enum StockInfo {
    Available(ProductDetails),
    Unavailable { reason: StockReason },
}

/// What an available product looks like: name, display price, and the size
/// options that can still be ordered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDetails {
    pub title: String,
    pub price: String,
    pub sizes: Vec<String>,
}

/// Why a product was classified as unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockReason {
    SoldOut,
    NoSizes,
    PurchaseDisabled,
    PageLoadError,
}

impl StockInfo {
    pub fn unavailable(reason: StockReason) -> Self {
        Self::Unavailable { reason }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }

    pub fn reason(&self) -> Option<StockReason> {
        match self {
            Self::Available(_) => None,
            Self::Unavailable { reason } => Some(*reason),
        }
    }
}

impl fmt::Display for StockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StockReason::SoldOut => "Sold Out",
            StockReason::NoSizes => "No sizes available",
            StockReason::PurchaseDisabled => "Add to Bag disabled",
            StockReason::PageLoadError => "Page Load Error",
        };
        f.write_str(s)
    }
}

/// Classify availability from raw product page HTML.
pub fn classify_stock(html: &str) -> StockInfo {
    let book = book();
    let document = Html::parse_document(html);

    let text = visible_text(&document).to_lowercase();
    if book
        .product
        .sold_out_phrases
        .iter()
        .any(|p| text.contains(p.as_str()))
    {
        return StockInfo::unavailable(StockReason::SoldOut);
    }

    let sizes: Vec<String> = match Selector::parse(&book.product.size_options) {
        Ok(sel) => document
            .select(&sel)
            .map(|el| element_text(&el))
            .filter(|s| !s.is_empty())
            .collect(),
        Err(_) => Vec::new(),
    };
    if sizes.is_empty() {
        return StockInfo::unavailable(StockReason::NoSizes);
    }

    if !has_enabled_purchase_button(&document) {
        return StockInfo::unavailable(StockReason::PurchaseDisabled);
    }

    let title = select_text(&document, &book.product.title)
        .unwrap_or_else(|| DEFAULT_TITLE.to_string());
    let price = select_text(&document, &book.product.price)
        .unwrap_or_else(|| DEFAULT_PRICE.to_string());

    StockInfo::Available(ProductDetails {
        title,
        price,
        sizes,
    })
}

/// Navigate to a product page and classify it. Every failure mode along the
/// way collapses into `PageLoadError` so scan loops never abort on one bad
/// product.
pub async fn check_stock(page: &mut dyn PageDriver, product_url: &str) -> StockInfo {
    if let Err(e) = page.goto(product_url, PRODUCT_NAV_TIMEOUT).await {
        debug!(url = product_url, error = %e, "product page did not load");
        return StockInfo::unavailable(StockReason::PageLoadError);
    }
    tokio::time::sleep(PRODUCT_SETTLE).await;

    let html = match page.html().await {
        Ok(h) => h,
        Err(e) => {
            debug!(url = product_url, error = %e, "could not read product page");
            return StockInfo::unavailable(StockReason::PageLoadError);
        }
    };

    match tokio::task::spawn_blocking(move || classify_stock(&html)).await {
        Ok(info) => info,
        Err(_) => StockInfo::unavailable(StockReason::PageLoadError),
    }
}

fn has_enabled_purchase_button(document: &Html) -> bool {
    let book = book();
    let Ok(sel) = Selector::parse("button") else {
        return false;
    };
    document.select(&sel).any(|el| {
        let label = element_text(&el).to_uppercase();
        let named = book
            .product
            .stock_button_labels
            .iter()
            .any(|l| label.contains(l.as_str()));
        named && el.value().attr("disabled").is_none()
    })
}

fn select_text(document: &Html, selector: &str) -> Option<String> {
    let sel = Selector::parse(selector).ok()?;
    let el = document.select(&sel).next()?;
    let text = element_text(&el);
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product_page(extra: &str, sizes: &str, button: &str) -> String {
        format!(
            r#"<html><body>
            <div class="product-intro__head-name">Relaxed Fit Tee</div>
            <div class="product-intro__head-mainprice"><span class="common-price">₹599</span></div>
            <div class="product-intro__size-choose">{sizes}</div>
            {button}
            {extra}
            </body></html>"#
        )
    }

    const TWO_SIZES: &str = r#"
        <div class="product-intro__size-radio">S</div>
        <div class="product-intro__size-radio">M</div>
        <div class="product-intro__size-radio product-intro__size-radio_disabled">XL</div>"#;

    #[test]
    fn test_available_product() {
        let html = product_page("", TWO_SIZES, "<button>ADD TO BAG</button>");
        match classify_stock(&html) {
            StockInfo::Available(d) => {
                assert_eq!(d.title, "Relaxed Fit Tee");
                assert_eq!(d.price, "₹599");
                assert_eq!(d.sizes, vec!["S".to_string(), "M".to_string()]);
            }
            other => panic!("expected available, got {other:?}"),
        }
    }

    #[test]
    fn test_sold_out_wins_over_everything() {
        // Sizes and an enabled button are present, but the banner decides.
        let html = product_page(
            "<div class='banner'>Sold Out. Notify me on restock</div>",
            TWO_SIZES,
            "<button>ADD TO BAG</button>",
        );
        assert_eq!(
            classify_stock(&html).reason(),
            Some(StockReason::SoldOut)
        );
    }

    #[test]
    fn test_no_orderable_sizes() {
        let only_disabled = r#"<div class="product-intro__size-radio product-intro__size-radio_disabled">M</div>"#;
        let html = product_page("", only_disabled, "<button>ADD TO BAG</button>");
        assert_eq!(classify_stock(&html).reason(), Some(StockReason::NoSizes));
    }

    #[test]
    fn test_disabled_purchase_button() {
        let html = product_page("", TWO_SIZES, "<button disabled>ADD TO BAG</button>");
        assert_eq!(
            classify_stock(&html).reason(),
            Some(StockReason::PurchaseDisabled)
        );
    }

    #[test]
    fn test_missing_purchase_button() {
        let html = product_page("", TWO_SIZES, "<button>WISHLIST</button>");
        assert_eq!(
            classify_stock(&html).reason(),
            Some(StockReason::PurchaseDisabled)
        );
    }

    #[test]
    fn test_sold_out_phrase_in_script_does_not_count() {
        let html = product_page(
            r#"<script>window.__STATE__ = {"related": [{"status": "sold out"}]};</script>"#,
            TWO_SIZES,
            "<button>ADD TO BAG</button>",
        );
        assert!(classify_stock(&html).is_available());
    }

    #[test]
    fn test_defaults_for_missing_title_and_price() {
        let html = r#"<html><body>
            <div class="product-intro__size-choose">
                <div class="product-intro__size-radio">L</div>
            </div>
            <button>ADD TO BAG</button>
            </body></html>"#;
        match classify_stock(html) {
            StockInfo::Available(d) => {
                assert_eq!(d.title, "Product");
                assert_eq!(d.price, "Unknown");
            }
            other => panic!("expected available, got {other:?}"),
        }
    }

    #[test]
    fn test_reason_display_strings() {
        assert_eq!(StockReason::SoldOut.to_string(), "Sold Out");
        assert_eq!(StockReason::NoSizes.to_string(), "No sizes available");
        assert_eq!(
            StockReason::PurchaseDisabled.to_string(),
            "Add to Bag disabled"
        );
        assert_eq!(StockReason::PageLoadError.to_string(), "Page Load Error");
    }
}
