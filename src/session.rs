//! Shared browser session orchestration.
//!
//! Exactly one browser session exists at a time. Every operation that
//! needs a page funnels through the host's async-mutex slot: the session
//! is launched lazily on first use, reused until torn down, and mutated
//! only by the operation currently holding the lock. Callers never touch
//! the page directly; they call the host's operations.

use crate::browser::{chromium::ChromiumRuntime, navigate_lenient, BrowserRuntime, PageDriver};
use crate::config::Config;
use crate::events::{now_timestamp, EngineEvent, EventBus};
use crate::scan::{self, ScanControl, ScanHit, ScanSummary};
use crate::storefront::voucher::{self, InPageApply, VoucherResult, VoucherStatus};
use anyhow::{bail, Context, Result};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

const LOGIN_NAV_TIMEOUT: Duration = Duration::from_secs(60);
/// How long the interactive login window stays open.
const LOGIN_WINDOW: Duration = Duration::from_secs(300);
const EVENT_BUS_CAPACITY: usize = 256;

/// Browser session could not be started.
///
/// Attached as context on the anyhow chain so callers can
/// `downcast_ref::<LaunchError>()` to tell launch failures apart from
/// in-session failures.
#[derive(Debug, Clone, Copy, Error)]
#[error("could not launch browser")]
pub struct LaunchError;

/// Options for a voucher batch check.
#[derive(Debug, Clone, Copy, Default)]
pub struct CheckOptions {
    /// Keep the browser alive after the batch. Defaults to false because
    /// an idle browser holds the profile lock; repeated cycles (the watch
    /// loop) pass true since relaunching per cycle is expensive.
    pub keep_session: bool,
}

/// Owns the one shared browser session and the operations that use it.
pub struct SessionHost {
    config: Config,
    runtime: Arc<dyn BrowserRuntime>,
    slot: Mutex<Option<Box<dyn PageDriver>>>,
    scans: ScanControl,
    events: EventBus,
}

impl SessionHost {
    pub fn new(config: Config) -> Self {
        let runtime = Arc::new(ChromiumRuntime::new(&config));
        Self::with_runtime(config, runtime)
    }

    /// Build a host over any runtime. Tests inject fakes here.
    pub fn with_runtime(config: Config, runtime: Arc<dyn BrowserRuntime>) -> Self {
        Self {
            config,
            runtime,
            slot: Mutex::new(None),
            scans: ScanControl::new(),
            events: EventBus::new(EVENT_BUS_CAPACITY),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Ask the running scan (if any) to stop at its next link boundary.
    pub fn request_stop(&self) {
        self.scans.request_stop();
    }

    pub fn scan_active(&self) -> bool {
        self.scans.is_active()
    }

    // ── Session lifecycle ──

    /// Launch the session if the slot is empty, then hand back the page.
    ///
    /// `headless_override` forces a mode for this launch; otherwise the
    /// configured default applies. No effect on an already-running session.
    async fn ensure_session<'s>(
        &self,
        slot: &'s mut Option<Box<dyn PageDriver>>,
        headless_override: Option<bool>,
    ) -> Result<&'s mut (dyn PageDriver + 'static)> {
        if slot.is_none() {
            let headless = headless_override.unwrap_or(self.config.headless);
            let page = self
                .runtime
                .launch(headless)
                .await
                .context(LaunchError)?;
            self.events.emit(EngineEvent::SessionLaunched { headless });
            *slot = Some(page);
        }
        match slot.as_mut() {
            Some(page) => Ok(page.as_mut()),
            None => bail!("session slot empty after launch"),
        }
    }

    async fn unmount(slot: &mut Option<Box<dyn PageDriver>>, events: &EventBus) {
        if let Some(page) = slot.take() {
            if let Err(e) = page.close().await {
                warn!(error = %e, "browser teardown reported an error");
            }
            events.emit(EngineEvent::SessionClosed);
            info!("session closed");
        }
    }

    /// Tear down the session if one is running.
    pub async fn teardown(&self) {
        let mut slot = self.slot.lock().await;
        Self::unmount(&mut slot, &self.events).await;
    }

    /// Open a visible browser on the storefront and hold it for five
    /// minutes so a human can log in. The persistent profile keeps the
    /// authenticated cookies for every later headless session.
    pub async fn interactive_login(&self) -> Result<()> {
        let mut slot = self.slot.lock().await;
        // A headless session cannot show the login form; restart headful.
        Self::unmount(&mut slot, &self.events).await;
        let page = self.ensure_session(&mut slot, Some(false)).await?;

        let base = self.config.storefront.base_url.clone();
        navigate_lenient(page, &base, LOGIN_NAV_TIMEOUT).await;
        info!(
            seconds = LOGIN_WINDOW.as_secs(),
            "log in by hand in the opened window"
        );
        tokio::time::sleep(LOGIN_WINDOW).await;

        Self::unmount(&mut slot, &self.events).await;
        info!("login window closed; profile saved");
        Ok(())
    }

    // ── Operations ──

    /// Check a batch of voucher codes against the cart.
    ///
    /// Returns one result per input code, in input order, regardless of
    /// what went wrong along the way.
    pub async fn check_codes(
        &self,
        codes: &[String],
        options: CheckOptions,
    ) -> Result<Vec<VoucherResult>> {
        let mut slot = self.slot.lock().await;
        let page = self.ensure_session(&mut slot, None).await?;
        self.events.emit(EngineEvent::CheckStarted {
            total: codes.len(),
            timestamp: now_timestamp(),
        });

        let mut transport = InPageApply::new(&self.config.storefront);
        let events = &self.events;
        let mut on_result = |r: &VoucherResult| {
            events.emit(EngineEvent::VoucherChecked {
                code: r.code.clone(),
                status: r.status,
            });
        };
        let results = voucher::check_codes_on_page(
            page,
            &self.config.storefront,
            &mut transport,
            codes,
            self.config.snapshots,
            &mut on_result,
        )
        .await;

        let cart_blocked = results
            .iter()
            .any(|r| r.status == VoucherStatus::ErrorCartEmpty);
        self.events.emit(EngineEvent::CheckCompleted {
            total: results.len(),
            cart_blocked,
        });

        if !options.keep_session {
            Self::unmount(&mut slot, &self.events).await;
        }
        Ok(results)
    }

    /// Scan a catalog page for available products. `target` overrides the
    /// default collection. The session stays up afterwards; callers decide
    /// when to tear down.
    pub async fn scan_catalog(&self, target: Option<&str>) -> Result<ScanSummary> {
        let guard = self.scans.begin()?;
        let mut slot = self.slot.lock().await;
        let page = self.ensure_session(&mut slot, None).await?;

        let url = match target {
            Some(t) => t.to_string(),
            None => self.config.storefront.fallback_collection_url(),
        };
        self.events.emit(EngineEvent::ScanStarted {
            kind: "catalog".to_string(),
            url,
            timestamp: now_timestamp(),
        });

        let events = &self.events;
        let mut on_hit = |hit: &ScanHit| emit_hit(events, hit);
        let outcome = scan::scan_catalog(
            page,
            &self.config.storefront,
            &self.scans,
            self.config.snapshots,
            target,
            &mut on_hit,
        )
        .await;
        drop(guard);
        self.finish_scan("catalog", outcome)
    }

    /// Scan the account wishlist for available products.
    pub async fn scan_wishlist(&self) -> Result<ScanSummary> {
        let guard = self.scans.begin()?;
        let mut slot = self.slot.lock().await;
        let page = self.ensure_session(&mut slot, None).await?;

        self.events.emit(EngineEvent::ScanStarted {
            kind: "wishlist".to_string(),
            url: self.config.storefront.wishlist_url(),
            timestamp: now_timestamp(),
        });

        let events = &self.events;
        let mut on_hit = |hit: &ScanHit| emit_hit(events, hit);
        let outcome = scan::scan_wishlist(
            page,
            &self.config.storefront,
            &self.scans,
            self.config.snapshots,
            &mut on_hit,
        )
        .await;
        drop(guard);
        self.finish_scan("wishlist", outcome)
    }

    fn finish_scan(&self, kind: &str, outcome: Result<ScanSummary>) -> Result<ScanSummary> {
        match outcome {
            Ok(summary) => {
                self.events.emit(EngineEvent::ScanCompleted {
                    kind: kind.to_string(),
                    discovered: summary.discovered,
                    checked: summary.checked,
                    available: summary.available,
                    stopped_early: summary.stopped_early,
                });
                Ok(summary)
            }
            Err(e) => {
                self.events.emit(EngineEvent::ScanFailed {
                    kind: kind.to_string(),
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }
}

fn emit_hit(events: &EventBus, hit: &ScanHit) {
    events.emit(EngineEvent::ProductFound {
        link: hit.link.clone(),
        title: hit.details.title.clone(),
        price: hit.details.price.clone(),
    });
}
