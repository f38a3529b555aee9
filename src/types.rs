use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::service;

/// Outcome class of a single probe.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PortStatus {
    /// Handshake completed.
    Open,
    /// Actively refused or reset by the peer.
    Closed,
    /// No answer within the deadline.
    Filtered,
}

impl PortStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PortStatus::Open => "open",
            PortStatus::Closed => "closed",
            PortStatus::Filtered => "filtered",
        }
    }
}

impl fmt::Display for PortStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One probed port. `banner == None` means nothing was captured.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PortProbeResult {
    pub port: u16,
    pub status: PortStatus,
    pub banner: Option<String>,
    pub service: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub observed_at: OffsetDateTime,
    pub target_host: String,
}

impl PortProbeResult {
    /// Build a result stamped now, running the service classifier only for open ports
    /// so `service` is never set on a closed or filtered result.
    pub fn classified(
        target_host: impl Into<String>,
        port: u16,
        status: PortStatus,
        banner: Option<String>,
    ) -> Self {
        let service = match status {
            PortStatus::Open => service::classify(port, banner.as_deref()).map(str::to_string),
            PortStatus::Closed | PortStatus::Filtered => None,
        };
        Self {
            port,
            status,
            banner,
            service,
            observed_at: OffsetDateTime::now_utc(),
            target_host: target_host.into(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == PortStatus::Open
    }
}

/// Lifecycle state of a scan session. `Completed`, `Error` and `Cancelled` are terminal.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScanStatus {
    Queued,
    Running,
    Completed,
    Error,
    Cancelled,
}

impl ScanStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScanStatus::Completed | ScanStatus::Error | ScanStatus::Cancelled
        )
    }
}

/// Lifecycle and progress of one orchestrated range scan.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScanSession {
    pub id: Uuid,
    pub target_host: String,
    pub start_port: u16,
    pub end_port: u16,
    pub status: ScanStatus,
    pub total_ports: u32,
    pub scanned_ports: u32,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub ended_at: Option<OffsetDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScanSession {
    /// A fresh `queued` session covering `start..=end` (caller has validated the range).
    pub fn new(target_host: impl Into<String>, start_port: u16, end_port: u16) -> Self {
        Self {
            id: Uuid::new_v4(),
            target_host: target_host.into(),
            start_port,
            end_port,
            status: ScanStatus::Queued,
            total_ports: u32::from(end_port) - u32::from(start_port) + 1,
            scanned_ports: 0,
            started_at: OffsetDateTime::now_utc(),
            ended_at: None,
            error: None,
        }
    }

    pub fn progress_percent(&self) -> f64 {
        if self.total_ports == 0 {
            return 0.0;
        }
        f64::from(self.scanned_ports) / f64::from(self.total_ports) * 100.0
    }

    /// Count one more finished probe, saturating at `total_ports`.
    pub fn record_scanned(&mut self) {
        if self.scanned_ports < self.total_ports {
            self.scanned_ports += 1;
        }
    }

    /// Move to a terminal status and stamp `ended_at`.
    pub fn finish(&mut self, status: ScanStatus, error: Option<String>) {
        debug_assert!(status.is_terminal());
        self.status = status;
        self.error = error;
        self.ended_at = Some(OffsetDateTime::now_utc());
    }
}

/// What a finished scan hands back: the open ports, plus the bookkeeping around them.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    pub session_id: Uuid,
    pub target_host: String,
    pub start_port: u16,
    pub end_port: u16,
    pub total_ports: u32,
    pub scanned_ports: u32,
    pub status: ScanStatus,
    pub results: Vec<PortProbeResult>,
    #[serde(with = "time::serde::rfc3339")]
    pub scan_time: OffsetDateTime,
}

/// Counts folded over a result snapshot.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ResultStats {
    pub open_ports: usize,
    pub closed_ports: usize,
    pub filtered_ports: usize,
    pub common_services: BTreeMap<String, usize>,
}

/// Dashboard aggregate across sessions and stored results.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ScanStats {
    /// Scans that reached a terminal state, including ones retention has since dropped.
    pub total_scans: u64,
    pub active_sessions: usize,
    #[serde(flatten)]
    pub results: ResultStats,
    pub recent_scans: Vec<ScanSession>,
}
