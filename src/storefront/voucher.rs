//! Voucher application and outcome classification.
//!
//! A voucher is tested by POSTing to the cart API from inside the page, so
//! the request rides the session's cookies, headers, and anti-bot clearance.
//! The raw outcome is then folded into a fixed status taxonomy by
//! [`classify_apply_outcome`], which is a pure function so the mapping table
//! can be tested without a browser.
//!
//! The batch checker reports exactly one result per requested code, in
//! request order, no matter what fails along the way.

use super::cart::CartEngine;
use crate::browser::{js_string, navigate_lenient, PageDriver};
use crate::config::Storefront;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::{info, warn};

/// Settle delay after navigating to the cart before touching it.
const CART_SETTLE: Duration = Duration::from_secs(4);
/// Navigation budget for reaching the cart page.
const CART_NAV_TIMEOUT: Duration = Duration::from_secs(30);
/// Pause between consecutive apply calls.
const CODE_DELAY: Duration = Duration::from_secs(1);

/// Error message fragments that mean the code itself is bad.
const INVALID_HINTS: &[&str] = &["invalid", "does not exist"];
/// Fragments that mean the code existed but is spent.
const REDEEMED_HINTS: &[&str] = &["redeemed", "limit", "used"];
/// Fragments that mean the code is real but this cart does not qualify.
const NOT_APPLICABLE_HINTS: &[&str] = &["applicable", "criteria", "eligible"];

/// Final verdict for one voucher code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VoucherStatus {
    /// The code applied and granted a positive discount.
    Applicable,
    /// The code is real but rejected for this cart.
    NotApplicable,
    /// The code does not exist or is malformed.
    Invalid,
    /// The code was already consumed or hit its usage limit.
    Redeemed,
    /// The apply call itself failed.
    Error,
    /// The cart could not be prepared, so no code was testable.
    ErrorCartEmpty,
    /// The response shape matched nothing we know.
    Unknown,
}

impl fmt::Display for VoucherStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VoucherStatus::Applicable => "APPLICABLE",
            VoucherStatus::NotApplicable => "NOT_APPLICABLE",
            VoucherStatus::Invalid => "INVALID",
            VoucherStatus::Redeemed => "REDEEMED",
            VoucherStatus::Error => "ERROR",
            VoucherStatus::ErrorCartEmpty => "ERROR_CART_EMPTY",
            VoucherStatus::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// One classified voucher code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoucherResult {
    pub code: String,
    pub status: VoucherStatus,
}

/// Raw result of a single apply call, before classification.
#[derive(Debug, Clone, Default)]
pub struct ApplyOutcome {
    /// Transport-level failure (network, evaluation, serialization). When
    /// set, the HTTP fields are meaningless.
    pub error: Option<String>,
    /// Whether the HTTP response had a 2xx status.
    pub ok: bool,
    pub status: u16,
    /// Parsed JSON response body; `None` when the body was not JSON.
    pub data: Option<Value>,
}

impl ApplyOutcome {
    pub fn transport_error(msg: impl Into<String>) -> Self {
        Self {
            error: Some(msg.into()),
            ..Self::default()
        }
    }

    pub fn http(ok: bool, status: u16, data: Option<Value>) -> Self {
        Self {
            error: None,
            ok,
            status,
            data,
        }
    }

    /// Interpret the object returned by the in-page apply script.
    fn from_eval(value: Value) -> Self {
        if let Some(err) = value.get("error").and_then(Value::as_str) {
            return Self::transport_error(err);
        }
        if !value.is_object() {
            return Self::transport_error("apply call returned no response object");
        }
        let ok = value.get("ok").and_then(Value::as_bool).unwrap_or(false);
        let status = value
            .get("status")
            .and_then(Value::as_u64)
            .unwrap_or(0) as u16;
        let data = value.get("data").filter(|d| !d.is_null()).cloned();
        Self::http(ok, status, data)
    }
}

/// How a voucher code gets submitted against the live cart.
///
/// The production implementation evaluates a fetch inside the page; tests
/// substitute a scripted one to drive the classifier without any network.
#[async_trait]
pub trait VoucherTransport: Send {
    async fn apply(&mut self, page: &mut dyn PageDriver, code: &str) -> ApplyOutcome;
}

/// Applies vouchers with an in-page `fetch` against the cart API.
pub struct InPageApply {
    path: String,
}

impl InPageApply {
    pub fn new(store: &Storefront) -> Self {
        Self {
            path: store.apply_voucher_path.clone(),
        }
    }
}

#[async_trait]
impl VoucherTransport for InPageApply {
    async fn apply(&mut self, page: &mut dyn PageDriver, code: &str) -> ApplyOutcome {
        match page.evaluate(&apply_script(&self.path, code)).await {
            Ok(value) => ApplyOutcome::from_eval(value),
            Err(e) => ApplyOutcome::transport_error(format!("apply call failed: {e}")),
        }
    }
}

/// Build the in-page apply call. The endpoint is relative so the request
/// inherits the page origin; the header marks it as the storefront's own
/// AJAX traffic.
fn apply_script(path: &str, code: &str) -> String {
    let path_lit = js_string(path);
    let code_lit = js_string(code);
    format!(
        r#"(async () => {{
  try {{
    const response = await fetch({path_lit}, {{
      method: 'POST',
      headers: {{ 'Content-Type': 'application/json', 'X-Requested-With': 'XMLHttpRequest' }},
      body: JSON.stringify({{ voucherId: {code_lit}, device: {{ client_type: 'web' }} }})
    }});
    const data = await response.json().catch(() => null);
    return {{ ok: response.ok, status: response.status, data }};
  }} catch (e) {{
    return {{ error: String((e && e.message) || e) }};
  }}
}})()"#
    )
}

/// Fold a raw apply outcome into the status taxonomy.
pub fn classify_apply_outcome(outcome: &ApplyOutcome) -> VoucherStatus {
    if outcome.error.is_some() {
        return VoucherStatus::Error;
    }
    let Some(data) = outcome.data.as_ref() else {
        return VoucherStatus::Unknown;
    };

    let error_message = data.get("errorMessage").filter(|v| !v.is_null());

    if outcome.ok && error_message.is_none() {
        let amount = data
            .get("voucherAmount")
            .and_then(|v| v.get("value"))
            .and_then(Value::as_f64)
            .unwrap_or(0.0);
        return if amount > 0.0 {
            VoucherStatus::Applicable
        } else {
            VoucherStatus::NotApplicable
        };
    }

    if let Some(errors) = error_message
        .and_then(|em| em.get("errors"))
        .and_then(Value::as_array)
        .filter(|a| !a.is_empty())
    {
        let msg = errors[0]
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_lowercase();
        if contains_any(&msg, INVALID_HINTS) {
            return VoucherStatus::Invalid;
        }
        if contains_any(&msg, REDEEMED_HINTS) {
            return VoucherStatus::Redeemed;
        }
        if contains_any(&msg, NOT_APPLICABLE_HINTS) {
            return VoucherStatus::NotApplicable;
        }
        // An error we cannot read still means the code was rejected.
        return VoucherStatus::Invalid;
    }

    // Some responses signal success without a voucherAmount block.
    let code_ok = data.get("code").and_then(Value::as_str) == Some("0");
    let msg_ok = data.get("msg").and_then(Value::as_str) == Some("success");
    if code_ok || msg_ok {
        return VoucherStatus::Applicable;
    }

    VoucherStatus::Unknown
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Check a batch of codes against the cart on the current page.
///
/// Ensures the page is on the cart and the cart is non-empty first; when the
/// cart cannot be prepared, every code reports `ERROR_CART_EMPTY` without a
/// single apply call going out. Returns one result per code, in input order.
pub async fn check_codes_on_page(
    page: &mut dyn PageDriver,
    store: &Storefront,
    transport: &mut dyn VoucherTransport,
    codes: &[String],
    snapshots: bool,
    on_result: &mut (dyn FnMut(&VoucherResult) + Send),
) -> Vec<VoucherResult> {
    let current = page.current_url().await.unwrap_or_default();
    if !current.contains("cart") {
        navigate_lenient(page, &store.cart_url(), CART_NAV_TIMEOUT).await;
        tokio::time::sleep(CART_SETTLE).await;
    }

    let cart = CartEngine::new(store, snapshots);
    if !cart.ensure_cart_has_item(page).await {
        warn!("cart could not be prepared; no code is testable");
        return codes
            .iter()
            .map(|code| {
                let result = VoucherResult {
                    code: code.clone(),
                    status: VoucherStatus::ErrorCartEmpty,
                };
                on_result(&result);
                result
            })
            .collect();
    }

    let mut results = Vec::with_capacity(codes.len());
    for code in codes {
        let outcome = transport.apply(page, code).await;
        let status = classify_apply_outcome(&outcome);
        info!(code = %code, status = %status, "voucher classified");
        let result = VoucherResult {
            code: code.clone(),
            status,
        };
        on_result(&result);
        results.push(result);
        tokio::time::sleep(CODE_DELAY).await;
    }
    results
}
