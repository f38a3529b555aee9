use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ScannerConfig;
use crate::error::{Result, ScanError, ValidationError};
use crate::ports::PortRange;
use crate::probe::{Prober, TcpProber};
use crate::session::{SessionPolicy, SessionTracker};
use crate::store::ResultStore;
use crate::types::{PortProbeResult, PortStatus, ScanReport, ScanSession, ScanStats, ScanStatus};

/// Sessions listed in `ScanStats::recent_scans`.
const RECENT_SCANS: usize = 10;

/// Fans probes out over a port range with a concurrency ceiling and keeps the
/// session tracker and result store up to date as probes finish.
///
/// - Validates host and range before anything is created.
/// - Limits in-flight probes with a `Semaphore`; permits are taken before spawning.
/// - Stops issuing probes on cancellation or an internal fault, then drains.
pub struct Scanner<P: Prober = TcpProber> {
    config: ScannerConfig,
    prober: Arc<P>,
    sessions: Arc<SessionTracker>,
    results: Arc<ResultStore>,
}

impl Scanner<TcpProber> {
    pub fn new(config: ScannerConfig) -> Result<Self> {
        let prober = TcpProber::from_config(&config);
        Self::with_prober(config, prober)
    }
}

impl<P: Prober> Scanner<P> {
    pub fn with_prober(config: ScannerConfig, prober: P) -> Result<Self> {
        config.validate()?;
        let sessions = SessionTracker::new(SessionPolicy::from(&config));
        let results = ResultStore::new(config.result_capacity);
        Ok(Self {
            config,
            prober: Arc::new(prober),
            sessions: Arc::new(sessions),
            results: Arc::new(results),
        })
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    pub fn sessions(&self) -> &Arc<SessionTracker> {
        &self.sessions
    }

    pub fn results(&self) -> &Arc<ResultStore> {
        &self.results
    }

    /// Check a request without starting anything.
    pub fn validate(
        &self,
        host: &str,
        start: u32,
        end: u32,
    ) -> std::result::Result<PortRange, ValidationError> {
        if host.trim().is_empty() {
            return Err(ValidationError::EmptyHost);
        }
        PortRange::new(start, end, self.config.max_range)
    }

    pub async fn start_scan(&self, host: &str, start: u32, end: u32) -> Result<ScanHandle> {
        self.start_scan_with_cancel(host, start, end, CancellationToken::new())
            .await
    }

    /// Validate, resolve the host once, register a `running` session and launch the
    /// fan-out in the background.
    ///
    /// Triggering `cancel` stops new probes; in-flight ones finish and the
    /// session ends up `cancelled`.
    pub async fn start_scan_with_cancel(
        &self,
        host: &str,
        start: u32,
        end: u32,
        cancel: CancellationToken,
    ) -> Result<ScanHandle> {
        let range = self.validate(host, start, end)?;
        let host = host.trim().to_string();
        self.prober.check_host(&host).await?;

        let mut session = ScanSession::new(&host, range.start(), range.end());
        session.status = ScanStatus::Running;
        let id = self.sessions.create(session).await;
        info!(
            session = %id,
            host = %host,
            start = range.start(),
            end = range.end(),
            concurrency = self.config.concurrency,
            "scan started"
        );

        let run = ScanRun {
            id,
            host,
            range,
            concurrency: self.config.concurrency,
            retries: self.config.retries,
            prober: self.prober.clone(),
            sessions: self.sessions.clone(),
            results: self.results.clone(),
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(run.execute());

        Ok(ScanHandle {
            id,
            cancel,
            sessions: self.sessions.clone(),
            task,
        })
    }

    /// Run a scan to completion and return its report.
    pub async fn scan(&self, host: &str, start: u32, end: u32) -> Result<ScanReport> {
        self.start_scan(host, start, end).await?.wait().await
    }

    pub async fn session(&self, id: Uuid) -> Result<ScanSession> {
        self.sessions.get(id).await
    }

    pub async fn stats(&self) -> ScanStats {
        ScanStats {
            total_scans: self.sessions.finished_total(),
            active_sessions: self.sessions.active_count().await,
            results: self.results.stats().await,
            recent_scans: self.sessions.recent(RECENT_SCANS).await,
        }
    }
}

/// A running scan. Dropping the handle does not stop the scan.
#[derive(Debug)]
pub struct ScanHandle {
    id: Uuid,
    cancel: CancellationToken,
    sessions: Arc<SessionTracker>,
    task: JoinHandle<Result<ScanReport>>,
}

impl ScanHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the scan to finish. The report lists open ports only, in port order.
    pub async fn wait(self) -> Result<ScanReport> {
        match self.task.await {
            Ok(report) => report,
            Err(e) => {
                let message = format!("scan task aborted: {e}");
                // The run never reached its own finalization.
                let _ = self
                    .sessions
                    .update(self.id, |s| s.finish(ScanStatus::Error, Some(message.clone())))
                    .await;
                Err(ScanError::Orchestration(message))
            }
        }
    }
}

/// Everything one background scan needs, moved into its task.
struct ScanRun<P: Prober> {
    id: Uuid,
    host: String,
    range: PortRange,
    concurrency: usize,
    retries: u8,
    prober: Arc<P>,
    sessions: Arc<SessionTracker>,
    results: Arc<ResultStore>,
    cancel: CancellationToken,
}

enum FanOutEnd {
    Finished,
    Cancelled,
    Failed(ScanError),
}

impl<P: Prober> ScanRun<P> {
    async fn execute(self) -> Result<ScanReport> {
        let mut open = Vec::new();
        let end = self.fan_out(&mut open).await;

        let (status, error) = match &end {
            FanOutEnd::Finished => (ScanStatus::Completed, None),
            FanOutEnd::Cancelled => (ScanStatus::Cancelled, None),
            FanOutEnd::Failed(e) => (ScanStatus::Error, Some(e.to_string())),
        };
        let session = self
            .sessions
            .update(self.id, |s| s.finish(status, error))
            .await?;

        match end {
            FanOutEnd::Failed(e) => {
                warn!(
                    session = %self.id,
                    error = %e,
                    scanned = session.scanned_ports,
                    "scan failed"
                );
                Err(e)
            }
            FanOutEnd::Finished | FanOutEnd::Cancelled => {
                if status == ScanStatus::Cancelled {
                    warn!(session = %self.id, scanned = session.scanned_ports, "scan cancelled");
                }
                info!(
                    session = %self.id,
                    open = open.len(),
                    scanned = session.scanned_ports,
                    "scan finished"
                );
                open.sort_by_key(|r| r.port);
                Ok(ScanReport {
                    session_id: self.id,
                    target_host: session.target_host,
                    start_port: session.start_port,
                    end_port: session.end_port,
                    total_ports: session.total_ports,
                    scanned_ports: session.scanned_ports,
                    status: session.status,
                    results: open,
                    scan_time: session.ended_at.unwrap_or(session.started_at),
                })
            }
        }
    }

    async fn fan_out(&self, open: &mut Vec<PortProbeResult>) -> FanOutEnd {
        let sem = Arc::new(Semaphore::new(self.concurrency.max(1)));
        let mut set = JoinSet::new();
        let mut end = FanOutEnd::Finished;

        for port in self.range.iter() {
            let permit = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    end = FanOutEnd::Cancelled;
                    break;
                }
                permit = sem.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(e) => {
                        end = FanOutEnd::Failed(ScanError::Orchestration(e.to_string()));
                        break;
                    }
                },
            };

            while let Some(joined) = set.try_join_next() {
                if let Err(e) = collect(joined, open) {
                    end = FanOutEnd::Failed(e);
                }
            }
            if matches!(end, FanOutEnd::Failed(_)) {
                break;
            }

            let prober = self.prober.clone();
            let sessions = self.sessions.clone();
            let results = self.results.clone();
            let host = self.host.clone();
            let (id, retries) = (self.id, self.retries);

            set.spawn(async move {
                let _permit = permit; // held until the result is recorded
                let result = probe_with_retries(&*prober, &host, port, retries).await?;
                results.push(result.clone()).await;
                if let Err(e) = sessions.update(id, |s| s.record_scanned()).await {
                    debug!(session = %id, error = %e, "progress not recorded");
                }
                Ok::<_, ScanError>(result)
            });
        }

        while let Some(joined) = set.join_next().await {
            if let Err(e) = collect(joined, open) {
                if !matches!(end, FanOutEnd::Failed(_)) {
                    end = FanOutEnd::Failed(e);
                }
            }
        }
        end
    }
}

/// Keep open results; a local socket failure or a crashed task fails the scan.
fn collect(
    joined: std::result::Result<Result<PortProbeResult>, JoinError>,
    open: &mut Vec<PortProbeResult>,
) -> Result<()> {
    match joined {
        Ok(Ok(result)) => {
            if result.is_open() {
                open.push(result);
            }
            Ok(())
        }
        Ok(Err(e)) => Err(e),
        Err(e) => Err(ScanError::Orchestration(format!("probe task failed: {e}"))),
    }
}

/// Re-probe only ports that came back filtered; any other answer is final.
async fn probe_with_retries<P: Prober>(
    prober: &P,
    host: &str,
    port: u16,
    retries: u8,
) -> Result<PortProbeResult> {
    let mut result = prober.probe(host, port).await?;
    for _ in 0..retries {
        if result.status != PortStatus::Filtered {
            break;
        }
        result = prober.probe(host, port).await?;
    }
    Ok(result)
}
