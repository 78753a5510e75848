//! Chromium-based page driver using chromiumoxide.

use super::{stealth, BrowserRuntime, PageDriver};
use crate::config::Config;
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, ReloadParams};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::layout::Point;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Settle delay after opening the fresh page, before anyone drives it.
const LAUNCH_SETTLE: Duration = Duration::from_secs(1);

/// Find the Chromium binary path.
pub fn find_chromium() -> Option<PathBuf> {
    // 1. VOUCHSAFE_CHROMIUM_PATH env
    if let Ok(p) = std::env::var("VOUCHSAFE_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. ~/.vouchsafe/chromium/
    if let Some(home) = dirs::home_dir() {
        let candidates = if cfg!(target_os = "macos") {
            vec![
                home.join(".vouchsafe/chromium/chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".vouchsafe/chromium/chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".vouchsafe/chromium/chrome"),
            ]
        } else {
            vec![
                home.join(".vouchsafe/chromium/chrome-linux64/chrome"),
                home.join(".vouchsafe/chromium/chrome"),
            ]
        };
        for c in candidates {
            if c.exists() {
                return Some(c);
            }
        }
    }

    // 3. System PATH
    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 4. Common macOS location
    if cfg!(target_os = "macos") {
        let common = PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Launches stealth Chromium sessions against a persistent profile.
pub struct ChromiumRuntime {
    chromium_path: Option<PathBuf>,
    profile_dir: PathBuf,
}

impl ChromiumRuntime {
    pub fn new(config: &Config) -> Self {
        Self {
            chromium_path: config.chromium_path.clone(),
            profile_dir: config.profile_dir.clone(),
        }
    }
}

#[async_trait]
impl BrowserRuntime for ChromiumRuntime {
    async fn launch(&self, headless: bool) -> Result<Box<dyn PageDriver>> {
        let chrome_path = match &self.chromium_path {
            Some(p) if p.exists() => p.clone(),
            _ => find_chromium().context(
                "Chromium not found. Install Chrome or set VOUCHSAFE_CHROMIUM_PATH.",
            )?,
        };
        std::fs::create_dir_all(&self.profile_dir).ok();

        let mut builder = BrowserConfig::builder()
            .chrome_executable(&chrome_path)
            .user_data_dir(&self.profile_dir);
        for arg in stealth::launch_args() {
            builder = builder.arg(*arg);
        }
        if headless {
            builder = builder.arg("--headless=new");
        } else {
            builder = builder.with_head();
        }
        let config = builder
            .build()
            .map_err(|e| anyhow!("failed to build browser config: {e}"))?;

        info!(headless, browser = %chrome_path.display(), "launching Chromium");
        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        // The persistent profile restores old tabs; close everything so the
        // session starts on exactly one fresh page.
        if let Ok(pages) = browser.pages().await {
            for page in pages {
                let _ = page.close().await;
            }
        }

        let page = browser
            .new_page("about:blank")
            .await
            .context("failed to open page")?;
        stealth::prepare_page(&page).await?;
        tokio::time::sleep(LAUNCH_SETTLE).await;

        Ok(Box::new(ChromiumSession {
            browser,
            page,
            handler_task,
        }))
    }
}

/// One live Chromium page plus the browser that owns it.
pub struct ChromiumSession {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
}

#[async_trait]
impl PageDriver for ChromiumSession {
    async fn goto(&mut self, url: &str, timeout: Duration) -> Result<()> {
        let result = tokio::time::timeout(timeout, self.page.goto(url)).await;
        match result {
            Ok(Ok(_response)) => {
                // Let the load event land; not fatal if it never does.
                let _ = self.page.wait_for_navigation().await;
                Ok(())
            }
            Ok(Err(e)) => bail!("navigation failed: {e}"),
            Err(_) => bail!("navigation timed out after {}ms", timeout.as_millis()),
        }
    }

    async fn reload(&mut self) -> Result<()> {
        self.page
            .execute(ReloadParams::default())
            .await
            .context("reload failed")?;
        let _ = self.page.wait_for_navigation().await;
        Ok(())
    }

    async fn current_url(&mut self) -> Result<String> {
        let url = self
            .page
            .url()
            .await
            .context("failed to get URL")?
            .map(|u| u.to_string())
            .unwrap_or_default();
        Ok(url)
    }

    async fn html(&mut self) -> Result<String> {
        let result = self
            .page
            .evaluate("document.documentElement.outerHTML")
            .await
            .context("failed to get HTML")?;
        let html: String = result
            .into_value()
            .map_err(|e| anyhow!("failed to convert HTML result: {e:?}"))?;
        Ok(html)
    }

    async fn evaluate(&mut self, script: &str) -> Result<Value> {
        // Explicit params: the apply call and the scroll loops are async
        // IIFEs, so promises must be awaited and values returned by value.
        let params = EvaluateParams::builder()
            .expression(script)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(|e| anyhow!("failed to build evaluate params: {e}"))?;
        let result = self
            .page
            .evaluate(params)
            .await
            .context("JS execution failed")?;
        Ok(result.into_value().unwrap_or(Value::Null))
    }

    async fn click_at(&mut self, x: f64, y: f64) -> Result<()> {
        self.page
            .click(Point::new(x, y))
            .await
            .context("click failed")?;
        Ok(())
    }

    async fn screenshot_png(&mut self) -> Result<Vec<u8>> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(false)
            .build();
        let bytes = self
            .page
            .screenshot(params)
            .await
            .context("screenshot failed")?;
        Ok(bytes)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let ChromiumSession {
            mut browser,
            page,
            handler_task,
        } = *self;
        if let Err(e) = page.close().await {
            debug!(error = %e, "page close reported an error");
        }
        if let Err(e) = browser.close().await {
            debug!(error = %e, "browser close reported an error");
        }
        handler_task.abort();
        Ok(())
    }
}
