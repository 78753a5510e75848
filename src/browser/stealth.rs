//! Launch flags and page-level evasion.
//!
//! The storefront fronts its cart API with an anti-bot wall. Two layers keep
//! the session on the right side of it: launch flags that strip Chromium's
//! automation tells, and an init script registered before any navigation so
//! every document sees an ordinary browser profile.

use anyhow::{anyhow, Result};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::page::Page;

/// Flags applied to every launch, headless or not.
pub fn launch_args() -> &'static [&'static str] {
    &[
        "--no-sandbox",
        "--disable-setuid-sandbox",
        "--disable-dev-shm-usage",
        "--disable-accelerated-2d-canvas",
        "--no-first-run",
        "--no-zygote",
        "--disable-gpu",
        "--disable-features=IsolateOrigins,site-per-process",
        "--disable-blink-features=AutomationControlled",
    ]
}

/// Evasion script evaluated on every new document before the page's own
/// scripts run. Covers the probes the storefront's wall actually checks:
/// `navigator.webdriver`, an empty plugin list, a missing `window.chrome`,
/// and the permissions-query quirk of headless Chromium.
const EVASION_JS: &str = r#"
Object.defineProperty(navigator, 'webdriver', { get: () => undefined, configurable: true });
Object.defineProperty(navigator, 'languages', { get: () => ['en-US', 'en'], configurable: true });
Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3], configurable: true });
if (!window.chrome) { window.chrome = {}; }
if (!window.chrome.runtime) { window.chrome.runtime = {}; }
const originalQuery = window.navigator.permissions && window.navigator.permissions.query;
if (originalQuery) {
    window.navigator.permissions.query = (parameters) => (
        parameters.name === 'notifications'
            ? Promise.resolve({ state: Notification.permission })
            : originalQuery(parameters)
    );
}
"#;

/// Register the evasion script on a fresh page.
pub async fn prepare_page(page: &Page) -> Result<()> {
    page.execute(AddScriptToEvaluateOnNewDocumentParams::new(EVASION_JS))
        .await
        .map_err(|e| anyhow!("failed to register evasion script: {e}"))?;
    Ok(())
}
