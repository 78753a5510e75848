//! JSONL audit log of voucher checks and scans.
//!
//! Append-only, one JSON object per line, rotated at `MAX_LOG_SIZE`
//! (rotations named `.1` through `.5`). The log answers "which codes did
//! we burn against the storefront, when, and what came back" long after
//! the terminal scrollback is gone.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

/// Maximum audit log size before rotation (100 MB).
const MAX_LOG_SIZE: u64 = 100 * 1024 * 1024;

/// Maximum number of rotated log files to keep.
const MAX_ROTATIONS: u32 = 5;

/// A single audit row.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub timestamp: String,
    /// Operation family: `check`, `scan_catalog`, `scan_wishlist`, `login`, `watch`.
    pub operation: String,
    /// Voucher code, for per-code rows.
    pub code: Option<String>,
    pub url: Option<String>,
    pub status: String,
    /// Wall time for the row's operation; None for per-code rows that
    /// are part of a timed batch.
    pub duration_ms: Option<u64>,
}

/// Append-only JSONL audit logger with automatic rotation.
pub struct AuditLogger {
    file: File,
    path: PathBuf,
    /// Approximate current size (may drift slightly; re-checked on rotation).
    current_size: u64,
}

impl AuditLogger {
    /// Open or create the audit log file.
    pub fn open(path: &PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open audit log: {}", path.display()))?;

        let current_size = file.metadata().map(|m| m.len()).unwrap_or(0);

        Ok(Self {
            file,
            path: path.clone(),
            current_size,
        })
    }

    /// Open the default audit log at ~/.vouchsafe/audit.jsonl.
    pub fn default_logger() -> Result<Self> {
        let path = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".vouchsafe")
            .join("audit.jsonl");
        Self::open(&path)
    }

    /// Append one audit row.
    pub fn log(&mut self, event: &AuditEvent) -> Result<()> {
        if self.current_size >= MAX_LOG_SIZE {
            self.rotate()?;
        }

        let json = serde_json::to_string(event)?;
        let bytes_written = writeln!(self.file, "{json}")
            .map(|()| json.len() as u64 + 1)
            .unwrap_or(0);
        self.current_size += bytes_written;
        Ok(())
    }

    /// Append a timestamped operation row.
    pub fn log_operation(
        &mut self,
        operation: &str,
        code: Option<&str>,
        url: Option<&str>,
        status: &str,
        duration_ms: Option<u64>,
    ) -> Result<()> {
        self.log(&AuditEvent {
            timestamp: Utc::now().to_rfc3339(),
            operation: operation.to_string(),
            code: code.map(String::from),
            url: url.map(String::from),
            status: status.to_string(),
            duration_ms,
        })
    }

    /// Rotate log files: audit.jsonl → audit.jsonl.1, .1 → .2, etc.
    fn rotate(&mut self) -> Result<()> {
        self.file.flush()?;

        for i in (1..MAX_ROTATIONS).rev() {
            let from = rotation_path(&self.path, i);
            let to = rotation_path(&self.path, i + 1);
            if from.exists() {
                let _ = std::fs::rename(&from, &to);
            }
        }

        let first_rotation = rotation_path(&self.path, 1);
        let _ = std::fs::rename(&self.path, &first_rotation);

        let oldest = rotation_path(&self.path, MAX_ROTATIONS);
        if oldest.exists() {
            let _ = std::fs::remove_file(&oldest);
        }

        self.file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| "failed to reopen audit log after rotation")?;
        self.current_size = 0;

        Ok(())
    }
}

/// Build path for a rotated log file: `audit.jsonl.1`, `audit.jsonl.2`, etc.
fn rotation_path(base: &std::path::Path, index: u32) -> PathBuf {
    let name = format!(
        "{}.{index}",
        base.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audit.jsonl")
    );
    base.with_file_name(name)
}
