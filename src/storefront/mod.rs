//! Storefront analysis and actions.
//!
//! The submodules split along one line: `discovery`, `stock`, and the
//! classifier half of `voucher` are pure functions over HTML or JSON that
//! never touch the network, while `cart` and the transport half of `voucher`
//! drive a live page. The pure half is where all the decision logic lives,
//! so it can be tested against fixture HTML without a browser.
//!
//! The `scraper` crate's types are `!Send`, so callers in async context wrap
//! the pure functions in `tokio::task::spawn_blocking`.

pub mod cart;
pub mod discovery;
pub mod selectors;
pub mod stock;
pub mod voucher;

use scraper::Html;

/// Collect all text content from an element, trimmed and whitespace-collapsed.
pub(crate) fn element_text(el: &scraper::ElementRef<'_>) -> String {
    el.text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Collect the rendered text of a document, skipping script, style, and
/// template subtrees. Matching phrases against raw `.text()` would also scan
/// embedded JSON state blobs, which on this storefront routinely contain
/// stock-status strings for unrelated products.
pub(crate) fn visible_text(document: &Html) -> String {
    let mut out = String::new();
    for node in document.root_element().descendants() {
        if let scraper::Node::Text(t) = node.value() {
            let hidden = node.ancestors().any(|a| match a.value() {
                scraper::Node::Element(el) => {
                    matches!(el.name(), "script" | "style" | "noscript" | "template")
                }
                _ => false,
            });
            if !hidden {
                out.push_str(t);
                out.push(' ');
            }
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}
