//! Voucher Batch Integration Test
//!
//! Drives the full batch check path over scripted pages and transports:
//! - one classified result per requested code, in request order
//! - empty-cart short circuit: every code reports ERROR_CART_EMPTY and the
//!   transport never fires
//! - cart navigation only happens when the page is not already on the cart
//!
//! No browser and no network: the page and the transport are scripted fakes.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::time::Duration;
use vouchsafe::browser::PageDriver;
use vouchsafe::config::Storefront;
use vouchsafe::storefront::voucher::{
    check_codes_on_page, ApplyOutcome, VoucherResult, VoucherStatus, VoucherTransport,
};

// ── Scripted Fakes ──

/// A page that renders the same HTML at every address, recording navigations.
struct FixedPage {
    url: String,
    html: String,
    goto_log: Vec<String>,
}

impl FixedPage {
    fn new(url: &str, html: &str) -> Self {
        Self {
            url: url.to_string(),
            html: html.to_string(),
            goto_log: Vec::new(),
        }
    }
}

#[async_trait]
impl PageDriver for FixedPage {
    async fn goto(&mut self, url: &str, _timeout: Duration) -> Result<()> {
        self.goto_log.push(url.to_string());
        self.url = url.to_string();
        Ok(())
    }

    async fn reload(&mut self) -> Result<()> {
        Ok(())
    }

    async fn current_url(&mut self) -> Result<String> {
        Ok(self.url.clone())
    }

    async fn html(&mut self) -> Result<String> {
        Ok(self.html.clone())
    }

    async fn evaluate(&mut self, _script: &str) -> Result<Value> {
        Ok(Value::Null)
    }

    async fn click_at(&mut self, _x: f64, _y: f64) -> Result<()> {
        Ok(())
    }

    async fn screenshot_png(&mut self) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

/// Replays scripted apply outcomes and records which codes were submitted.
struct ScriptedTransport {
    outcomes: VecDeque<ApplyOutcome>,
    codes_seen: Vec<String>,
}

impl ScriptedTransport {
    fn new(outcomes: Vec<ApplyOutcome>) -> Self {
        Self {
            outcomes: outcomes.into(),
            codes_seen: Vec::new(),
        }
    }
}

#[async_trait]
impl VoucherTransport for ScriptedTransport {
    async fn apply(&mut self, _page: &mut dyn PageDriver, code: &str) -> ApplyOutcome {
        self.codes_seen.push(code.to_string());
        self.outcomes
            .pop_front()
            .unwrap_or_else(|| ApplyOutcome::transport_error("script exhausted"))
    }
}

// ── Fixture Builders ──

fn store() -> Storefront {
    Storefront {
        base_url: "https://www.shop.example".to_string(),
        cart_path: "/cart".to_string(),
        fallback_collection_path: "/c/filler-collection".to_string(),
        wishlist_path: "/wishlist".to_string(),
        apply_voucher_path: "/api/cart/apply-voucher".to_string(),
    }
}

fn cart_page_html(count: u32) -> String {
    format!(
        r#"<html><body>
        <header><span class="j-bag-count">{count}</span></header>
        <div class="cart-list"><div class="cart-item">Relaxed Fit Tee</div></div>
        </body></html>"#
    )
}

fn codes(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

fn rejection(message: &str) -> ApplyOutcome {
    ApplyOutcome::http(
        false,
        400,
        Some(json!({"errorMessage": {"errors": [{"message": message}]}})),
    )
}

// ── Batch Semantics Tests ──

/// Test: mixed outcomes produce one result per code, in request order
#[tokio::test(start_paused = true)]
async fn test_one_result_per_code_in_request_order() {
    let store = store();
    let mut page = FixedPage::new(&store.cart_url(), &cart_page_html(2));
    let mut transport = ScriptedTransport::new(vec![
        ApplyOutcome::http(true, 200, Some(json!({"voucherAmount": {"value": 120.0}}))),
        rejection("Voucher already redeemed"),
        rejection("Invalid voucher code"),
        ApplyOutcome::http(true, 200, Some(json!({"voucherAmount": {"value": 0}}))),
        ApplyOutcome::transport_error("TypeError: failed to fetch"),
        ApplyOutcome::http(false, 502, None),
    ]);

    let batch = codes(&[
        "SVIAAAAAAAAAAAA",
        "SVDJBBBBBBBBBBB",
        "SVCSCCCCCCCCCCC",
        "SVIDDDDDDDDDDDD",
        "SVIEEEEEEEEEEEE",
        "SVIFFFFFFFFFFFF",
    ]);
    let mut streamed: Vec<VoucherResult> = Vec::new();
    let results = check_codes_on_page(&mut page, &store, &mut transport, &batch, false, &mut |r| {
        streamed.push(r.clone())
    })
    .await;

    let got_codes: Vec<&str> = results.iter().map(|r| r.code.as_str()).collect();
    assert_eq!(got_codes, batch.iter().map(String::as_str).collect::<Vec<_>>());

    let got_statuses: Vec<VoucherStatus> = results.iter().map(|r| r.status).collect();
    assert_eq!(
        got_statuses,
        vec![
            VoucherStatus::Applicable,
            VoucherStatus::Redeemed,
            VoucherStatus::Invalid,
            VoucherStatus::NotApplicable,
            VoucherStatus::Error,
            VoucherStatus::Unknown,
        ]
    );

    // Every code went through the transport, in order.
    assert_eq!(transport.codes_seen, batch);
    // The streaming callback saw exactly what the batch returned.
    assert_eq!(streamed, results);
    // Already on the cart, so no navigation happened.
    assert!(page.goto_log.is_empty(), "goto log: {:?}", page.goto_log);
}

/// Test: an unpreparable cart blocks the batch before any apply call
#[tokio::test(start_paused = true)]
async fn test_empty_cart_blocks_batch_without_applying() {
    let store = store();
    // Blank page everywhere: no cart badge, no product links to fall back on.
    let mut page = FixedPage::new("about:blank", "<html><body></body></html>");
    let mut transport = ScriptedTransport::new(vec![]);

    let batch = codes(&["SVIAAAAAAAAAAAA", "SVDJBBBBBBBBBBB", "SVCSCCCCCCCCCCC"]);
    let mut streamed: Vec<VoucherResult> = Vec::new();
    let results = check_codes_on_page(&mut page, &store, &mut transport, &batch, false, &mut |r| {
        streamed.push(r.clone())
    })
    .await;

    assert_eq!(results.len(), batch.len());
    for (result, code) in results.iter().zip(&batch) {
        assert_eq!(&result.code, code);
        assert_eq!(result.status, VoucherStatus::ErrorCartEmpty);
    }
    assert_eq!(streamed, results);

    // Not a single code reached the transport.
    assert!(
        transport.codes_seen.is_empty(),
        "transport fired for: {:?}",
        transport.codes_seen
    );

    // The engine went to the cart, then hunted the fallback collection.
    assert_eq!(
        page.goto_log,
        vec![store.cart_url(), store.fallback_collection_url()]
    );
}

/// Test: starting away from the cart navigates there exactly once
#[tokio::test(start_paused = true)]
async fn test_navigates_to_cart_when_elsewhere() {
    let store = store();
    let mut page = FixedPage::new("https://www.shop.example/", &cart_page_html(1));
    let mut transport = ScriptedTransport::new(vec![ApplyOutcome::http(
        true,
        200,
        Some(json!({"voucherAmount": {"value": 75.0}})),
    )]);

    let batch = codes(&["SVIAAAAAAAAAAAA"]);
    let results =
        check_codes_on_page(&mut page, &store, &mut transport, &batch, false, &mut |_| {}).await;

    assert_eq!(page.goto_log, vec![store.cart_url()]);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].status, VoucherStatus::Applicable);
}
