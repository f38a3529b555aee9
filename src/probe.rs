//! Single-port TCP connect probe.
//!
//! One probe is one connect attempt, an optional greeting, and at most one banner
//! read, all under a single deadline. Every exit path yields exactly one
//! outcome and drops the socket before returning: a classified result, or a
//! local socket failure that says nothing about the peer.

use std::future::Future;
use std::io;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{lookup_host, TcpStream};
use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

use crate::config::ScannerConfig;
use crate::error::{Result, ScanError, ValidationError};
use crate::types::{PortProbeResult, PortStatus};

/// Something that can probe one `(host, port)`.
///
/// Answers from the peer, or their absence, are results. `Err` is reserved for
/// local failures that prevented the attempt. The scanner is generic over this
/// so tests can count or fake probes.
pub trait Prober: Send + Sync + 'static {
    fn probe(&self, host: &str, port: u16) -> impl Future<Output = Result<PortProbeResult>> + Send;

    /// Checked once per scan before any session exists. Accepts everything by default.
    fn check_host(
        &self,
        _host: &str,
    ) -> impl Future<Output = std::result::Result<(), ValidationError>> + Send {
        async { Ok(()) }
    }
}

/// Where the connect phase ended.
#[derive(Debug)]
enum ConnectState {
    Connected(TcpStream),
    TimedOut,
    Failed(io::Error),
}

#[derive(Debug, Clone)]
pub struct TcpProber {
    connect_timeout: Duration,
    banner_timeout: Duration,
    banner_cap: usize,
    greeting: Vec<u8>,
}

impl Default for TcpProber {
    fn default() -> Self {
        Self::from_config(&ScannerConfig::default())
    }
}

impl TcpProber {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            ..Self::default()
        }
    }

    pub fn from_config(config: &ScannerConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout(),
            banner_timeout: config.banner_timeout(),
            banner_cap: config.banner_cap.max(1),
            greeting: config.greeting.as_bytes().to_vec(),
        }
    }

    pub fn with_banner_timeout(mut self, timeout: Duration) -> Self {
        self.banner_timeout = timeout;
        self
    }

    pub fn with_banner_cap(mut self, cap: usize) -> Self {
        self.banner_cap = cap.max(1);
        self
    }

    /// An empty greeting makes the probe purely passive.
    pub fn with_greeting(mut self, greeting: impl Into<Vec<u8>>) -> Self {
        self.greeting = greeting.into();
        self
    }

    async fn run<F>(&self, connect: F) -> io::Result<(PortStatus, Option<String>)>
    where
        F: Future<Output = io::Result<TcpStream>>,
    {
        let deadline = Instant::now() + self.connect_timeout;
        let state = match time::timeout_at(deadline, connect).await {
            Ok(Ok(stream)) => ConnectState::Connected(stream),
            Ok(Err(e)) => ConnectState::Failed(e),
            Err(_) => ConnectState::TimedOut,
        };

        match state {
            ConnectState::Connected(mut stream) => {
                let banner = self.grab_banner(&mut stream, deadline).await;
                Ok((PortStatus::Open, banner))
            }
            ConnectState::TimedOut => Ok((PortStatus::Filtered, None)),
            ConnectState::Failed(e) => {
                trace!(error = %e, kind = ?e.kind(), "connect failed");
                match status_for_connect_error(&e) {
                    Some(status) => Ok((status, None)),
                    None => Err(e),
                }
            }
        }
    }

    async fn grab_banner(&self, stream: &mut TcpStream, deadline: Instant) -> Option<String> {
        let read_deadline = deadline.min(Instant::now() + self.banner_timeout);

        // Peers that hang up early just make the write fail; the port is still open.
        if !self.greeting.is_empty() {
            let _ = time::timeout_at(read_deadline, stream.write_all(&self.greeting)).await;
        }

        let mut buf = vec![0u8; self.banner_cap];
        match time::timeout_at(read_deadline, stream.read(&mut buf)).await {
            Ok(Ok(n)) if n > 0 => banner_text(&buf[..n]),
            _ => None,
        }
    }
}

impl Prober for TcpProber {
    async fn probe(&self, host: &str, port: u16) -> Result<PortProbeResult> {
        match self.run(TcpStream::connect((host, port))).await {
            Ok((status, banner)) => {
                debug!(host, port, %status, has_banner = banner.is_some(), "probe finished");
                Ok(PortProbeResult::classified(host, port, status, banner))
            }
            Err(source) => {
                warn!(host, port, error = %source, "local socket failure");
                Err(ScanError::Socket { port, source })
            }
        }
    }

    async fn check_host(&self, host: &str) -> std::result::Result<(), ValidationError> {
        let unresolvable = |reason: String| ValidationError::UnresolvableHost {
            host: host.to_string(),
            reason,
        };
        let mut addrs = time::timeout(self.connect_timeout, lookup_host((host, 0)))
            .await
            .map_err(|_| unresolvable("lookup timed out".into()))?
            .map_err(|e| unresolvable(e.to_string()))?;
        match addrs.next() {
            Some(_) => Ok(()),
            None => Err(unresolvable("no addresses".into())),
        }
    }
}

/// Peer refusal or reset means closed; unreachable or an OS-level timeout looks like a
/// silent drop. Anything else is a local failure with no verdict on the port.
fn status_for_connect_error(err: &io::Error) -> Option<PortStatus> {
    match err.kind() {
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted => Some(PortStatus::Closed),
        io::ErrorKind::TimedOut
        | io::ErrorKind::HostUnreachable
        | io::ErrorKind::NetworkUnreachable => Some(PortStatus::Filtered),
        _ => None,
    }
}

fn banner_text(bytes: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(bytes);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
