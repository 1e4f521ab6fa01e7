//! Pod Detective - explains why Kubernetes containers fail
//!
//! Polls the pods of one namespace, recognizes failing container states and
//! prints a plain-language explanation with remediation steps for every new
//! failure. Explanations go to stdout, logs to stderr.

use anyhow::{Context, Result};
use clap::Parser;
use detective_lib::{
    health::HealthRegistry, observability::DetectorMetrics, FailureDetector, KubeCluster, Report,
};
use kube::config::{KubeConfigOptions, Kubeconfig};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const DETECTIVE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    let cli = config::Cli::parse();
    let settings = config::DetectiveConfig::load(&cli)?;

    init_tracing(settings.log_format);
    info!(
        version = DETECTIVE_VERSION,
        namespace = %settings.namespace,
        "Starting pod-detective"
    );

    let client = build_client(settings.kubeconfig.as_deref()).await?;
    let cluster = Arc::new(KubeCluster::new(client));

    let health_registry = HealthRegistry::new();
    let metrics = DetectorMetrics::new();

    if let Some(port) = settings.metrics_port {
        let app_state = Arc::new(api::AppState::new(health_registry.clone(), metrics.clone()));
        tokio::spawn(async move {
            if let Err(e) = api::serve(port, app_state).await {
                error!(error = %e, "Health and metrics server stopped");
            }
        });
    }

    let (detector, mut reports) = FailureDetector::new(cluster, settings.detector_config());
    let detector = detector.with_health(health_registry);

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let detector_handle = tokio::spawn(detector.run(shutdown_rx));

    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(());
    });

    eprintln!("🔍 Pod Detective is watching namespace '{}'", settings.namespace);

    // The channel closes once the detector stops
    while let Some(report) = reports.recv().await {
        write_report(&report, settings.output)?;
    }

    match detector_handle.await.context("Detector task failed")? {
        Ok(()) => {
            info!("Shutdown complete");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Detector stopped");
            Err(anyhow::Error::new(e).context("Cannot list pods, giving up"))
        }
    }
}

fn init_tracing(format: config::LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        config::LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        config::LogFormat::Text => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}

/// Resolve cluster credentials: explicit kubeconfig, in-cluster, then inference
async fn build_client(kubeconfig: Option<&Path>) -> Result<kube::Client> {
    let config = match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path)
                .with_context(|| format!("Failed to read kubeconfig {}", path.display()))?;
            kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .context("Invalid kubeconfig")?
        }
        None => match kube::Config::incluster() {
            Ok(config) => {
                info!("Using in-cluster configuration");
                config
            }
            Err(_) => kube::Config::infer()
                .await
                .context("Failed to load Kubernetes configuration")?,
        },
    };

    kube::Client::try_from(config).context("Failed to create Kubernetes client")
}

fn write_report(report: &Report, format: config::OutputFormat) -> Result<()> {
    let mut stdout = std::io::stdout().lock();

    match format {
        config::OutputFormat::Text => stdout.write_all(report.block().as_bytes())?,
        config::OutputFormat::Json => {
            serde_json::to_writer(&mut stdout, report)?;
            stdout.write_all(b"\n")?;
        }
    }

    stdout.flush().context("Failed to write report")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("SIGINT received"),
        _ = terminate => info!("SIGTERM received"),
    }
}
