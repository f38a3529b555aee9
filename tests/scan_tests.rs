use std::time::Duration;

use portprobe::config::ScannerConfig;
use portprobe::types::{PortStatus, ScanStatus};
use portprobe::{ScanError, Scanner, ValidationError};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

fn fast_config() -> ScannerConfig {
    ScannerConfig {
        connect_timeout_ms: 1_000,
        banner_timeout_ms: 150,
        concurrency: 8,
        ..ScannerConfig::default()
    }
}

/// A listener that greets every client with `banner` and keeps the socket briefly.
async fn greeting_listener(banner: &'static [u8]) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        loop {
            let Ok((mut sock, _)) = listener.accept().await else { break };
            tokio::spawn(async move {
                let _ = sock.write_all(banner).await;
                tokio::time::sleep(Duration::from_millis(300)).await;
            });
        }
    });
    port
}

/// A port that nothing listens on any more.
async fn free_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

#[tokio::test]
async fn loopback_scan_reports_open_port_with_banner() {
    let port = greeting_listener(b"220 ProFTPD FTP Server ready\r\n").await;
    let scanner = Scanner::new(fast_config()).unwrap();

    let report = scanner.scan("127.0.0.1", port.into(), port.into()).await.unwrap();

    assert_eq!(report.status, ScanStatus::Completed);
    assert_eq!(report.total_ports, 1);
    assert_eq!(report.results.len(), 1);
    let r = &report.results[0];
    assert_eq!(r.port, port);
    assert_eq!(r.status, PortStatus::Open);
    assert_eq!(r.banner.as_deref(), Some("220 ProFTPD FTP Server ready"));
    assert_eq!(r.service.as_deref(), Some("FTP"));
    assert_eq!(r.target_host, "127.0.0.1");
}

#[tokio::test]
async fn closed_ports_stay_out_of_report_but_in_store() {
    let closed = free_port().await;
    let scanner = Scanner::new(fast_config()).unwrap();

    let report = scanner.scan("127.0.0.1", closed.into(), closed.into()).await.unwrap();
    assert!(report.results.is_empty());
    assert_eq!(report.scanned_ports, 1);

    let stored = scanner.results().snapshot().await;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].status, PortStatus::Closed);
    assert_eq!(stored[0].service, None);
}

#[tokio::test]
async fn session_is_queryable_after_scan() {
    let port = greeting_listener(b"SSH-2.0-OpenSSH_9.6\r\n").await;
    let scanner = Scanner::new(fast_config()).unwrap();

    let handle = scanner.start_scan("127.0.0.1", port.into(), port.into()).await.unwrap();
    let id = handle.id();
    let report = handle.wait().await.unwrap();
    assert_eq!(report.session_id, id);

    let session = scanner.session(id).await.unwrap();
    assert_eq!(session.status, ScanStatus::Completed);
    assert_eq!(session.scanned_ports, session.total_ports);

    let stats = scanner.stats().await;
    assert_eq!(stats.results.common_services.get("SSH"), Some(&1));
    assert_eq!(stats.recent_scans.len(), 1);
}

#[tokio::test]
async fn unresolvable_host_is_rejected_before_any_session() {
    let scanner = Scanner::new(fast_config()).unwrap();

    let err = scanner.start_scan("no-such-host.invalid", 1, 10).await.unwrap_err();
    assert!(err.is_client_error());
    assert!(matches!(
        err,
        ScanError::Validation(ValidationError::UnresolvableHost { .. })
    ));
    assert!(scanner.sessions().is_empty().await);
    assert_eq!(scanner.stats().await.total_scans, 0);
}
