use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use portprobe::config::ScannerConfig;
use portprobe::logging::{self, LogConfig, LogFormat};
use portprobe::ports;
use portprobe::scanner::Scanner;
use portprobe::server;
use portprobe::types::ScanReport;

/// portprobe — bounded async TCP connect port prober with banner capture.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "portprobe",
    version,
    about = "Bounded async TCP connect port prober with banner capture and a small JSON API.",
    long_about = None
)]
struct Cli {
    /// TOML config file; flags below override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to scan (name or IP). Optional when only serving the API.
    #[arg(long)]
    host: Option<String>,

    /// Port or inclusive range, e.g. `22` or `1-1024`.
    #[arg(long, default_value = "1-1024")]
    ports: String,

    /// Max concurrent probes.
    #[arg(long)]
    concurrency: Option<usize>,

    /// Per-probe deadline in milliseconds.
    #[arg(long = "timeout-ms")]
    timeout_ms: Option<u64>,

    /// Banner wait in milliseconds.
    #[arg(long = "banner-timeout-ms")]
    banner_timeout_ms: Option<u64>,

    /// Write the report as pretty JSON to this path.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Serve the JSON API on this address, e.g. 127.0.0.1:8080.
    #[arg(long)]
    serve: Option<String>,

    /// Log level used when RUST_LOG is unset.
    #[arg(long = "log-level", default_value = "info")]
    log_level: String,

    /// pretty, compact or json.
    #[arg(long = "log-format", default_value = "compact")]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(
        LogConfig::default()
            .level(cli.log_level.clone())
            .format(cli.log_format),
    )?;

    let config = build_config(&cli)?;
    let scanner = Arc::new(Scanner::new(config).context("invalid scanner configuration")?);

    if let Some(bind) = cli.serve.clone() {
        let scanner = scanner.clone();
        tokio::spawn(async move {
            if let Err(e) = server::spawn_server(&bind, scanner).await {
                warn!(error = %e, "API server stopped");
            }
        });
    }

    if let Some(host) = cli.host.as_deref() {
        let range = ports::parse_range_str(&cli.ports, scanner.config().max_range)
            .with_context(|| format!("invalid --ports value: {}", cli.ports))?;

        // Ctrl-C stops issuing probes; whatever finished is still reported.
        let cancel = CancellationToken::new();
        let cancel_ctrlc = cancel.clone();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            cancel_ctrlc.cancel();
        });

        let handle = scanner
            .start_scan_with_cancel(
                host,
                u32::from(range.start()),
                u32::from(range.end()),
                cancel,
            )
            .await?;
        let report = handle.wait().await?;
        print_results_table(&report);
        if let Some(path) = cli.output.as_deref() {
            write_report_json(path, &report)
                .with_context(|| format!("failed to write JSON to {}", path.display()))?;
            println!("Wrote JSON report to {}", path.display());
        }
    }

    if cli.serve.is_some() {
        println!("Press Ctrl+C to stop the server...");
        let _ = tokio::signal::ctrl_c().await;
    } else if cli.host.is_none() {
        anyhow::bail!("nothing to do: pass --host to scan or --serve to start the API");
    }

    Ok(())
}

fn build_config(cli: &Cli) -> Result<ScannerConfig> {
    let mut config = match cli.config.as_deref() {
        Some(path) => ScannerConfig::from_file(path)?,
        None => ScannerConfig::default(),
    };
    if let Some(c) = cli.concurrency {
        config.concurrency = c;
    }
    if let Some(t) = cli.timeout_ms {
        config.connect_timeout_ms = t;
    }
    if let Some(t) = cli.banner_timeout_ms {
        config.banner_timeout_ms = t;
    }
    config.validate()?;
    Ok(config)
}

fn print_results_table(report: &ScanReport) {
    let port_w = 5usize;
    let mut service_w = "service".len();
    for r in &report.results {
        service_w = service_w.max(r.service.as_deref().map_or(0, str::len));
    }

    println!(
        "\n{}: {} open of {} scanned ({} total, {:?})",
        report.target_host,
        report.results.len(),
        report.scanned_ports,
        report.total_ports,
        report.status
    );
    println!(
        "{:>port_w$}  {:<service_w$}  banner",
        "port",
        "service",
        port_w = port_w,
        service_w = service_w
    );
    println!(
        "{:->port_w$}  {:-<service_w$}  {:-<6}",
        "",
        "",
        "",
        port_w = port_w,
        service_w = service_w
    );
    for r in &report.results {
        let mut bsnip = r.banner.clone().unwrap_or_default().replace(['\r', '\n'], " ");
        if bsnip.chars().count() > 60 {
            bsnip = bsnip.chars().take(60).collect();
        }
        println!(
            "{:>port_w$}  {:<service_w$}  {}",
            r.port,
            r.service.as_deref().unwrap_or("-"),
            bsnip,
            port_w = port_w,
            service_w = service_w
        );
    }
}

fn write_report_json(path: &std::path::Path, report: &ScanReport) -> Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, report)?;
    Ok(())
}
