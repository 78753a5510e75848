//! Product link discovery in listing pages.
//!
//! Listing, search, collection, and wishlist pages all render product cards,
//! but not with one markup shape. Discovery therefore runs two passes: every
//! anchor whose href already carries the product path marker, then the
//! structural card selectors from the selector book. Results are absolute
//! URLs, deduplicated, in first-seen order.

use super::selectors::{book, SelectorBook};
use crate::browser::PageDriver;
use scraper::{Html, Selector};
use std::collections::HashSet;
use tracing::debug;
use url::Url;

/// Capture the current page and extract product links from it.
///
/// Read failures yield an empty list; callers treat that the same as a
/// page with no product cards.
pub async fn discover_on_page(page: &mut dyn PageDriver) -> Vec<String> {
    let url = page.current_url().await.unwrap_or_default();
    let html = match page.html().await {
        Ok(h) => h,
        Err(e) => {
            debug!(error = %e, "could not read page for link discovery");
            return Vec::new();
        }
    };
    tokio::task::spawn_blocking(move || extract_product_links(&html, &url))
        .await
        .unwrap_or_default()
}

/// Extract product detail links from a rendered listing page.
///
/// `page_url` is the address the HTML was captured from; relative and
/// protocol-relative hrefs are resolved against it.
pub fn extract_product_links(html: &str, page_url: &str) -> Vec<String> {
    let book = book();
    let document = Html::parse_document(html);
    let base = Url::parse(page_url).ok();

    let mut seen: HashSet<String> = HashSet::new();
    let mut links: Vec<String> = Vec::new();

    // Pass 1: anchors already carrying the product marker. The excluded
    // fragments drop cart, wishlist, and review deep links that happen to
    // embed a product path.
    if let Ok(sel) = Selector::parse("a[href]") {
        for el in document.select(&sel) {
            let Some(href) = el.value().attr("href") else {
                continue;
            };
            if !book.discovery.is_product_href(href) {
                continue;
            }
            push_candidate(href, &base, book, true, &mut seen, &mut links);
        }
    }

    // Pass 2: structural card anchors, for layouts where the product link
    // hides behind an image or name wrapper.
    for raw in &book.discovery.card_anchors {
        let Ok(sel) = Selector::parse(raw) else {
            continue;
        };
        for el in document.select(&sel) {
            let Some(href) = el.value().attr("href") else {
                continue;
            };
            push_candidate(href, &base, book, false, &mut seen, &mut links);
        }
    }

    links
}

fn push_candidate(
    href: &str,
    base: &Option<Url>,
    book: &SelectorBook,
    check_excluded: bool,
    seen: &mut HashSet<String>,
    links: &mut Vec<String>,
) {
    let Some(abs) = absolutize(href, base) else {
        return;
    };
    if !book.discovery.is_product_href(&abs) {
        return;
    }
    if check_excluded && book.discovery.is_excluded_href(&abs) {
        return;
    }
    if seen.insert(abs.clone()) {
        links.push(abs);
    }
}

fn absolutize(href: &str, base: &Option<Url>) -> Option<String> {
    match base {
        Some(b) => b.join(href).ok().map(|u| u.to_string()),
        None => Url::parse(href).ok().map(|u| u.to_string()),
    }
}
