//! Command line and layered configuration
//!
//! Settings are resolved from built-in defaults, an optional config file,
//! `DETECTIVE_*` environment variables and finally explicit flags.

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use detective_lib::{DedupPolicy, DetectorConfig, WorkloadFilter};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Watch Kubernetes pods and explain container failures
#[derive(Debug, Parser)]
#[command(name = "pod-detective")]
#[command(author, version, about = "Watches pods and explains why containers fail", long_about = None)]
pub struct Cli {
    /// Path to a kubeconfig file (in-cluster config or inference when omitted)
    #[arg(long)]
    pub kubeconfig: Option<PathBuf>,

    /// Namespace to watch
    #[arg(long, short = 'n')]
    pub namespace: Option<String>,

    /// Only watch the pod with this name
    #[arg(long)]
    pub pod: Option<String>,

    /// Label selector, e.g. app=web
    #[arg(long, short = 'l')]
    pub selector: Option<String>,

    /// Seconds between polls
    #[arg(long)]
    pub interval_secs: Option<u64>,

    /// Log lines attached to each explanation
    #[arg(long)]
    pub log_tail_lines: Option<i64>,

    /// Report a failure again after it has been absent this long
    #[arg(long)]
    pub renotify_after_secs: Option<u64>,

    /// Maximum failures remembered for deduplication (0 = unbounded)
    #[arg(long)]
    pub max_tracked_failures: Option<u64>,

    /// Serve /healthz, /readyz and /metrics on this port
    #[arg(long)]
    pub metrics_port: Option<u16>,

    /// Report output format
    #[arg(long, value_enum)]
    pub output: Option<OutputFormat>,

    /// Log output format (logs go to stderr)
    #[arg(long, value_enum)]
    pub log_format: Option<LogFormat>,

    /// Config file (TOML, YAML or JSON)
    #[arg(long, env = "DETECTIVE_CONFIG")]
    pub config: Option<PathBuf>,
}

/// How reports are written to stdout
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Plain-text explanation blocks (default)
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

impl OutputFormat {
    fn as_str(self) -> &'static str {
        match self {
            OutputFormat::Text => "text",
            OutputFormat::Json => "json",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Text,
}

impl LogFormat {
    fn as_str(self) -> &'static str {
        match self {
            LogFormat::Json => "json",
            LogFormat::Text => "text",
        }
    }
}

/// Resolved detective configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DetectiveConfig {
    #[serde(default)]
    pub kubeconfig: Option<PathBuf>,

    pub namespace: String,

    #[serde(default)]
    pub pod: Option<String>,

    #[serde(default)]
    pub selector: Option<String>,

    pub interval_secs: u64,

    pub log_tail_lines: i64,

    #[serde(default)]
    pub renotify_after_secs: Option<u64>,

    pub max_tracked_failures: u64,

    #[serde(default)]
    pub metrics_port: Option<u16>,

    pub output: OutputFormat,

    pub log_format: LogFormat,
}

impl DetectiveConfig {
    /// Resolve configuration for the given command line
    pub fn load(cli: &Cli) -> Result<Self> {
        let mut builder = config::Config::builder()
            .set_default("namespace", "default")?
            .set_default("interval_secs", 10u64)?
            .set_default("log_tail_lines", 10i64)?
            .set_default("max_tracked_failures", detective_lib::detector::DEFAULT_MAX_ENTRIES as u64)?
            .set_default("output", OutputFormat::default().as_str())?
            .set_default("log_format", LogFormat::default().as_str())?;

        if let Some(path) = &cli.config {
            builder = builder.add_source(config::File::from(path.as_path()).required(true));
        }

        let config: DetectiveConfig = builder
            .add_source(config::Environment::with_prefix("DETECTIVE").try_parsing(true))
            .set_override_option(
                "kubeconfig",
                cli.kubeconfig
                    .as_ref()
                    .map(|p| p.to_string_lossy().into_owned()),
            )?
            .set_override_option("namespace", cli.namespace.clone())?
            .set_override_option("pod", cli.pod.clone())?
            .set_override_option("selector", cli.selector.clone())?
            .set_override_option("interval_secs", cli.interval_secs)?
            .set_override_option("log_tail_lines", cli.log_tail_lines)?
            .set_override_option("renotify_after_secs", cli.renotify_after_secs)?
            .set_override_option("max_tracked_failures", cli.max_tracked_failures)?
            .set_override_option("metrics_port", cli.metrics_port.map(u64::from))?
            .set_override_option("output", cli.output.map(OutputFormat::as_str))?
            .set_override_option("log_format", cli.log_format.map(LogFormat::as_str))?
            .build()
            .context("Failed to assemble configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.namespace.is_empty() {
            bail!("namespace must not be empty");
        }
        if self.interval_secs == 0 {
            bail!("interval_secs must be at least 1");
        }
        if self.log_tail_lines < 1 {
            bail!("log_tail_lines must be at least 1");
        }
        if let Some(window) = self.renotify_after_secs {
            if window <= self.interval_secs {
                bail!(
                    "renotify_after_secs ({}) must be greater than interval_secs ({})",
                    window,
                    self.interval_secs
                );
            }
        }
        Ok(())
    }

    /// Detection loop settings derived from this configuration
    pub fn detector_config(&self) -> DetectorConfig {
        DetectorConfig {
            namespace: self.namespace.clone(),
            filter: WorkloadFilter {
                name: self.pod.clone(),
                label_selector: self.selector.clone(),
            },
            interval: Duration::from_secs(self.interval_secs),
            log_tail_lines: self.log_tail_lines,
            dedup: DedupPolicy {
                renotify_after: self.renotify_after_secs.map(Duration::from_secs),
                max_entries: match self.max_tracked_failures {
                    0 => None,
                    max => Some(max as usize),
                },
            },
            ..DetectorConfig::default()
        }
    }
}
