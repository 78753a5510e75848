//! Browser abstraction layer.
//!
//! All storefront logic drives a [`PageDriver`] rather than chromiumoxide
//! directly. The production driver is a Chromium page; tests substitute
//! scripted fakes, which is the only way to exercise the cart and voucher
//! flows without a storefront to point at.

pub mod chromium;
pub mod stealth;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Poll cadence for [`wait_for_selector`].
const SELECTOR_POLL: Duration = Duration::from_millis(250);

/// One live page. The engine only ever holds one.
#[async_trait]
pub trait PageDriver: Send {
    /// Navigate to `url`, bounded by `timeout`. An error here does not
    /// always mean the page is unusable; callers that can proceed on a
    /// partially loaded page use [`navigate_lenient`] instead.
    async fn goto(&mut self, url: &str, timeout: Duration) -> Result<()>;

    async fn reload(&mut self) -> Result<()>;

    async fn current_url(&mut self) -> Result<String>;

    /// Serialized DOM of the current page.
    async fn html(&mut self) -> Result<String>;

    /// Evaluate a JS expression, awaiting promises, and return its value.
    /// Expressions that resolve to `undefined` yield `Value::Null`.
    async fn evaluate(&mut self, script: &str) -> Result<Value>;

    /// Dispatch a real mouse click at viewport coordinates.
    async fn click_at(&mut self, x: f64, y: f64) -> Result<()>;

    async fn screenshot_png(&mut self) -> Result<Vec<u8>>;

    /// Close the page and whatever owns it.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Launches browser sessions. One implementation wraps chromiumoxide; tests
/// provide counting stubs to pin down launch-once semantics.
#[async_trait]
pub trait BrowserRuntime: Send + Sync {
    async fn launch(&self, headless: bool) -> Result<Box<dyn PageDriver>>;
}

/// Navigate and tolerate failure. Slow storefront pages regularly blow the
/// navigation budget after the DOM is already usable, so the caller gets
/// whatever URL the page actually ended up on.
pub async fn navigate_lenient(page: &mut dyn PageDriver, url: &str, timeout: Duration) -> String {
    if let Err(e) = page.goto(url, timeout).await {
        warn!(url, error = %e, "navigation did not settle; continuing with current page state");
    }
    page.current_url()
        .await
        .unwrap_or_else(|_| url.to_string())
}

/// Poll until `selector` matches something or the timeout passes.
pub async fn wait_for_selector(
    page: &mut dyn PageDriver,
    selector: &str,
    timeout: Duration,
) -> bool {
    let probe = format!("!!document.querySelector({})", js_string(selector));
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Ok(v) = page.evaluate(&probe).await {
            if v.as_bool() == Some(true) {
                return true;
            }
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(SELECTOR_POLL).await;
    }
}

/// Capture the current page as a timestamped PNG in the working directory.
/// Failures are logged and swallowed; a missing snapshot never fails the
/// operation it was documenting.
pub async fn save_debug_snapshot(page: &mut dyn PageDriver, label: &str) -> Option<PathBuf> {
    let bytes = match page.screenshot_png().await {
        Ok(b) => b,
        Err(e) => {
            debug!(error = %e, "screenshot failed");
            return None;
        }
    };
    let path = PathBuf::from(format!(
        "debug_{label}_{}.png",
        chrono::Utc::now().timestamp_millis()
    ));
    match std::fs::write(&path, &bytes) {
        Ok(()) => {
            info!(path = %path.display(), "saved debug snapshot");
            Some(path)
        }
        Err(e) => {
            debug!(error = %e, "could not write snapshot");
            None
        }
    }
}

/// Render `s` as a JS string literal.
pub(crate) fn js_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    struct StubPage {
        probe_answers: Vec<bool>,
        calls: usize,
        fail_goto: bool,
        url: String,
    }

    impl StubPage {
        fn probing(answers: Vec<bool>) -> Self {
            Self {
                probe_answers: answers,
                calls: 0,
                fail_goto: false,
                url: String::new(),
            }
        }
    }

    #[async_trait]
    impl PageDriver for StubPage {
        async fn goto(&mut self, url: &str, _timeout: Duration) -> Result<()> {
            if self.fail_goto {
                return Err(anyhow!("net::ERR_TIMED_OUT"));
            }
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
            Ok(String::new())
        }

        async fn evaluate(&mut self, _script: &str) -> Result<Value> {
            let answer = self
                .probe_answers
                .get(self.calls.min(self.probe_answers.len().saturating_sub(1)))
                .copied()
                .unwrap_or(false);
            self.calls += 1;
            Ok(Value::Bool(answer))
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

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_selector_finds_late_element() {
        let mut page = StubPage::probing(vec![false, false, true]);
        assert!(wait_for_selector(&mut page, "button", Duration::from_secs(5)).await);
        assert_eq!(page.calls, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_selector_gives_up() {
        let mut page = StubPage::probing(vec![false]);
        assert!(!wait_for_selector(&mut page, "button", Duration::from_millis(600)).await);
    }

    #[tokio::test]
    async fn test_navigate_lenient_reports_where_it_ended_up() {
        let mut page = StubPage::probing(vec![]);
        page.url = "https://shop.example/old".to_string();
        page.fail_goto = true;
        let reached =
            navigate_lenient(&mut page, "https://shop.example/next", Duration::from_secs(1)).await;
        assert_eq!(reached, "https://shop.example/old");

        page.fail_goto = false;
        let reached =
            navigate_lenient(&mut page, "https://shop.example/next", Duration::from_secs(1)).await;
        assert_eq!(reached, "https://shop.example/next");
    }

    #[test]
    fn test_js_string_escapes() {
        assert_eq!(js_string("plain"), "\"plain\"");
        assert_eq!(js_string("with \"quote\""), r#""with \"quote\"""#);
    }
}
