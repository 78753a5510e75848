//! Protected-code roster and the watch loop.
//!
//! Codes worth keeping an eye on (gifted vouchers, codes found applicable
//! once) live in a small JSON roster under the profile directory. The
//! watch loop re-checks the roster on a fixed cadence with a kept-alive
//! session and reports status transitions between cycles.

use crate::events::EngineEvent;
use crate::session::{CheckOptions, SessionHost};
use crate::storefront::voucher::{VoucherResult, VoucherStatus};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Default re-check cadence.
pub const WATCH_INTERVAL: Duration = Duration::from_secs(180);

/// Consecutive failed cycles tolerated before the watch gives up.
const MAX_CONSECUTIVE_FAILURES: u32 = 3;

// ── Roster ──

/// The set of codes under watch, persisted as a JSON array.
#[derive(Debug)]
pub struct Roster {
    path: PathBuf,
    codes: BTreeSet<String>,
}

impl Roster {
    /// Load the roster at `path`. A missing file is an empty roster.
    pub fn open(path: &Path) -> Result<Self> {
        let codes = match std::fs::read_to_string(path) {
            Ok(raw) => serde_json::from_str(&raw)
                .with_context(|| format!("malformed roster file: {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeSet::new(),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("could not read roster: {}", path.display()))
            }
        };
        Ok(Self {
            path: path.to_path_buf(),
            codes,
        })
    }

    /// The default roster location, ~/.vouchsafe/protected.json.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".vouchsafe")
            .join("protected.json")
    }

    /// Add a code. Returns false when it was already present.
    pub fn add(&mut self, code: &str) -> bool {
        self.codes.insert(code.trim().to_uppercase())
    }

    /// Remove a code. Returns false when it was not present.
    pub fn release(&mut self, code: &str) -> bool {
        self.codes.remove(&code.trim().to_uppercase())
    }

    pub fn codes(&self) -> Vec<String> {
        self.codes.iter().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Write the roster back to disk.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.codes)?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("could not write roster: {}", self.path.display()))
    }
}

// ── Watch loop ──

/// One status transition observed between watch cycles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub code: String,
    /// None on the first sighting of a code.
    pub from: Option<VoucherStatus>,
    pub to: VoucherStatus,
}

/// Compare a cycle's results against the last known statuses.
///
/// Every first sighting counts as a change so a fresh watch reports the
/// starting state of each code.
pub fn diff_statuses(
    last: &HashMap<String, VoucherStatus>,
    results: &[VoucherResult],
) -> Vec<StatusChange> {
    results
        .iter()
        .filter(|r| last.get(&r.code) != Some(&r.status))
        .map(|r| StatusChange {
            code: r.code.clone(),
            from: last.get(&r.code).copied(),
            to: r.status,
        })
        .collect()
}

/// Re-check `codes` every `interval` until stopped or repeatedly failing.
///
/// The session is kept alive across cycles; transient cycle failures are
/// tolerated up to a limit, then the loop gives up. Status transitions go
/// to the event bus and the callback.
pub async fn run_watch(
    host: &SessionHost,
    codes: &[String],
    interval: Duration,
    on_change: &mut (dyn FnMut(&StatusChange) + Send),
) -> Result<()> {
    if codes.is_empty() {
        bail!("nothing to watch; add codes to the roster first");
    }
    info!(
        codes = codes.len(),
        interval_secs = interval.as_secs(),
        "watch started"
    );

    let mut ticker = tokio::time::interval(interval);
    let mut last: HashMap<String, VoucherStatus> = HashMap::new();
    let mut cycle: u64 = 0;
    let mut consecutive_failures: u32 = 0;

    loop {
        ticker.tick().await;
        cycle += 1;
        host.events().emit(EngineEvent::WatchCycleStarted { cycle });

        let options = CheckOptions { keep_session: true };
        let results = match host.check_codes(codes, options).await {
            Ok(results) => {
                consecutive_failures = 0;
                results
            }
            Err(e) => {
                consecutive_failures += 1;
                warn!(
                    error = %e,
                    failures = consecutive_failures,
                    "watch cycle failed"
                );
                if consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                    bail!("watch gave up after {MAX_CONSECUTIVE_FAILURES} failed cycles: {e}");
                }
                continue;
            }
        };

        for change in diff_statuses(&last, &results) {
            info!(
                code = %change.code,
                to = %change.to,
                "voucher status changed"
            );
            host.events().emit(EngineEvent::StatusChanged {
                code: change.code.clone(),
                from: change.from,
                to: change.to,
            });
            on_change(&change);
        }
        for result in &results {
            last.insert(result.code.clone(), result.status);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::{BrowserRuntime, PageDriver};
    use crate::config::Config;
    use async_trait::async_trait;
    use std::sync::Arc;

    fn result(code: &str, status: VoucherStatus) -> VoucherResult {
        VoucherResult {
            code: code.to_string(),
            status,
        }
    }

    #[test]
    fn test_first_sighting_counts_as_change() {
        let last = HashMap::new();
        let results = vec![result("SVIAAAAAAAAAAAB", VoucherStatus::NotApplicable)];
        let changes = diff_statuses(&last, &results);
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].from, None);
        assert_eq!(changes[0].to, VoucherStatus::NotApplicable);
    }

    #[test]
    fn test_stable_status_is_not_reported() {
        let mut last = HashMap::new();
        last.insert(
            "SVIAAAAAAAAAAAB".to_string(),
            VoucherStatus::NotApplicable,
        );
        let results = vec![result("SVIAAAAAAAAAAAB", VoucherStatus::NotApplicable)];
        assert!(diff_statuses(&last, &results).is_empty());
    }

    #[test]
    fn test_transition_reports_old_and_new() {
        let mut last = HashMap::new();
        last.insert("SVIAAAAAAAAAAAB".to_string(), VoucherStatus::NotApplicable);
        let results = vec![result("SVIAAAAAAAAAAAB", VoucherStatus::Applicable)];
        let changes = diff_statuses(&last, &results);
        assert_eq!(
            changes,
            vec![StatusChange {
                code: "SVIAAAAAAAAAAAB".to_string(),
                from: Some(VoucherStatus::NotApplicable),
                to: VoucherStatus::Applicable,
            }]
        );
    }

    #[test]
    fn test_roster_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let roster = Roster::open(&dir.path().join("protected.json")).unwrap();
        assert!(roster.is_empty());
    }

    #[test]
    fn test_roster_add_save_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("protected.json");

        let mut roster = Roster::open(&path).unwrap();
        assert!(roster.add("svi5ppt4wrf29ak"));
        assert!(!roster.add("SVI5PPT4WRF29AK"), "codes are case-folded");
        roster.save().unwrap();

        let reloaded = Roster::open(&path).unwrap();
        assert_eq!(reloaded.codes(), vec!["SVI5PPT4WRF29AK".to_string()]);
    }

    #[test]
    fn test_roster_release() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("protected.json");

        let mut roster = Roster::open(&path).unwrap();
        roster.add("SVCSAAAAAAAAAAB");
        assert!(roster.release("SVCSAAAAAAAAAAB"));
        assert!(!roster.release("SVCSAAAAAAAAAAB"));
        assert!(roster.is_empty());
    }

    #[test]
    fn test_roster_rejects_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("protected.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(Roster::open(&path).is_err());
    }

    struct BrokenRuntime;

    #[async_trait]
    impl BrowserRuntime for BrokenRuntime {
        async fn launch(&self, _headless: bool) -> anyhow::Result<Box<dyn PageDriver>> {
            anyhow::bail!("no browser on this host")
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_gives_up_after_repeated_failures() {
        let config = Config {
            headless: true,
            profile_dir: std::env::temp_dir().join("vouchsafe-watch-test"),
            chromium_path: None,
            snapshots: false,
            storefront: Default::default(),
        };
        let host = SessionHost::with_runtime(config, Arc::new(BrokenRuntime));
        let codes = vec!["SVIAAAAAAAAAAAB".to_string()];

        let mut seen = 0usize;
        let mut on_change = |_: &StatusChange| seen += 1;
        let err = run_watch(&host, &codes, Duration::from_secs(1), &mut on_change)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("gave up"));
        assert_eq!(seen, 0);
    }

    #[tokio::test]
    async fn test_watch_refuses_empty_code_list() {
        let config = Config {
            headless: true,
            profile_dir: std::env::temp_dir().join("vouchsafe-watch-test"),
            chromium_path: None,
            snapshots: false,
            storefront: Default::default(),
        };
        let host = SessionHost::with_runtime(config, Arc::new(BrokenRuntime));
        let mut on_change = |_: &StatusChange| {};
        assert!(
            run_watch(&host, &[], Duration::from_secs(1), &mut on_change)
                .await
                .is_err()
        );
    }
}
