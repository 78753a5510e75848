// Copyright 2026 Vouchsafe Contributors
// SPDX-License-Identifier: Apache-2.0

//! Vouchsafe event bus: typed events from every component.
//!
//! The EventBus is a `tokio::sync::broadcast` channel that carries
//! [`EngineEvent`] values. Any consumer (CLI progress output, the watch
//! loop, log sinks) can subscribe independently. When no subscribers
//! exist, events are silently dropped (zero overhead).

use crate::storefront::voucher::VoucherStatus;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Every event the engine emits. Serialized to JSON for machine consumers.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EngineEvent {
    // ── Session Events ────────────────────
    /// A browser session was launched.
    SessionLaunched { headless: bool },
    /// The browser session was torn down.
    SessionClosed,

    // ── Voucher Events ────────────────────
    /// A voucher batch check has started.
    CheckStarted { total: usize, timestamp: String },
    /// One voucher code was classified.
    VoucherChecked { code: String, status: VoucherStatus },
    /// A voucher batch finished.
    CheckCompleted { total: usize, cart_blocked: bool },

    // ── Scan Events ───────────────────────
    /// A catalog or wishlist scan has started.
    ScanStarted {
        kind: String,
        url: String,
        timestamp: String,
    },
    /// An available product was found during a scan.
    ProductFound {
        link: String,
        title: String,
        price: String,
    },
    /// A scan finished.
    ScanCompleted {
        kind: String,
        discovered: usize,
        checked: usize,
        available: usize,
        stopped_early: bool,
    },
    /// A scan aborted with an error.
    ScanFailed { kind: String, error: String },

    // ── Watch Events ──────────────────────
    /// A watch cycle began.
    WatchCycleStarted { cycle: u64 },
    /// A protected code changed status between watch cycles.
    StatusChanged {
        code: String,
        /// None on the first sighting of a code.
        from: Option<VoucherStatus>,
        to: VoucherStatus,
    },
}

/// The central event bus.
///
/// All components emit events through this bus. Consumers subscribe
/// to receive a stream of all events.
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all subscribers. Silently ignores if no subscribers.
    pub fn emit(&self, event: EngineEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to receive all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }
}

/// The voucher code an event concerns, for per-code filtering.
pub fn event_code(event: &EngineEvent) -> Option<&str> {
    match event {
        EngineEvent::VoucherChecked { code, .. } | EngineEvent::StatusChanged { code, .. } => {
            Some(code)
        }
        _ => None,
    }
}

/// ISO-8601 timestamp for the current time.
pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = EngineEvent::VoucherChecked {
            code: "SVI5PPT4WRF29AK".to_string(),
            status: VoucherStatus::Applicable,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("VoucherChecked"));
        assert!(json.contains("SVI5PPT4WRF29AK"));
        assert!(json.contains("APPLICABLE"));

        // Roundtrip
        let parsed: EngineEvent = serde_json::from_str(&json).unwrap();
        match parsed {
            EngineEvent::VoucherChecked { code, status } => {
                assert_eq!(code, "SVI5PPT4WRF29AK");
                assert_eq!(status, VoucherStatus::Applicable);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn test_scan_completed_serialization() {
        let event = EngineEvent::ScanCompleted {
            kind: "catalog".to_string(),
            discovered: 73,
            checked: 50,
            available: 4,
            stopped_early: false,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("ScanCompleted"));
        assert!(json.contains("73"));
    }

    #[test]
    fn test_event_bus_emit_no_subscribers() {
        let bus = EventBus::new(16);
        // Should not panic when no subscribers
        bus.emit(EngineEvent::SessionClosed);
    }

    #[test]
    fn test_event_bus_subscribe_receive() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.emit(EngineEvent::SessionLaunched { headless: true });

        let event = rx.try_recv().unwrap();
        match event {
            EngineEvent::SessionLaunched { headless } => assert!(headless),
            _ => panic!("wrong event"),
        }
    }

    #[test]
    fn test_event_code_filter() {
        let checked = EngineEvent::VoucherChecked {
            code: "SVDJAAAAAAAAAAA".to_string(),
            status: VoucherStatus::Redeemed,
        };
        assert_eq!(event_code(&checked), Some("SVDJAAAAAAAAAAA"));

        let session = EngineEvent::SessionClosed;
        assert_eq!(event_code(&session), None);
    }
}
