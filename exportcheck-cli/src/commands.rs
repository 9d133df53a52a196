use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::info;

use exportcheck_config::{ExportCheckConfig, TransportKind};
use exportcheck_core::{DataType, ScenarioKind};
use exportcheck_engine::{check_consume_contract, CheckParams};
use exportcheck_simulator::{RetryMode, RetryingExporterFactory};
use exportcheck_telemetry::{EventLogger, MetricsRecorder};

#[derive(Parser)]
#[command(name = "exportcheck", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the delivery-contract scenarios against the reference exporter
    Run(RunArgs),
    /// List the scenario menu with outcome probabilities
    Scenarios,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum TransportArg {
    InProcess,
    Tcp,
}

impl From<TransportArg> for TransportKind {
    fn from(arg: TransportArg) -> Self {
        match arg {
            TransportArg::InProcess => TransportKind::InProcess,
            TransportArg::Tcp => TransportKind::Tcp,
        }
    }
}

/// Command-line values override the configuration file and environment.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Configuration file (defaults to config/exportcheck.yaml when present)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// logs, traces or metrics
    #[arg(long)]
    pub data_type: Option<DataType>,
    /// Items generated per scenario
    #[arg(long)]
    pub items: Option<usize>,
    #[arg(long)]
    pub workers: Option<usize>,
    /// Scenario to run; repeat for several (default: all)
    #[arg(long = "scenario")]
    pub scenarios: Vec<ScenarioKind>,
    #[arg(long)]
    pub seed: Option<u64>,
    #[arg(long, value_enum)]
    pub transport: Option<TransportArg>,
    /// Receiver listen address for the TCP transport
    #[arg(long)]
    pub endpoint: Option<String>,
    /// How the reference exporter treats failures
    #[arg(long, default_value_t = RetryMode::Compliant)]
    pub exporter_mode: RetryMode,
    /// Directory for YAML reports of failed scenarios
    #[arg(long)]
    pub report_dir: Option<PathBuf>,
    /// Print Prometheus metrics after the run
    #[arg(long)]
    pub metrics: bool,
}

impl RunArgs {
    fn apply(&self, config: &mut ExportCheckConfig) {
        if let Some(data_type) = self.data_type {
            config.run.data_type = data_type;
        }
        if let Some(items) = self.items {
            config.run.item_count = items;
        }
        if let Some(workers) = self.workers {
            config.run.workers = workers;
        }
        if !self.scenarios.is_empty() {
            config.run.scenarios = self.scenarios.clone();
        }
        if let Some(seed) = self.seed {
            config.run.seed = Some(seed);
        }
        if let Some(transport) = self.transport {
            config.receiver.transport = transport.into();
        }
        if let Some(endpoint) = &self.endpoint {
            config.receiver.endpoint = endpoint.clone();
        }
        if self.metrics {
            config.telemetry.metrics = true;
        }
    }
}

/// Returns whether every scenario passed.
pub async fn run_contract_check(args: RunArgs) -> anyhow::Result<bool> {
    let mut config = match &args.config {
        Some(path) => ExportCheckConfig::load_from_path(path)?,
        None => ExportCheckConfig::load()?,
    };
    args.apply(&mut config);
    config.check()?;

    EventLogger::init(&config.telemetry.log_level);
    info!(mode = %args.exporter_mode, "Loaded configuration");

    let metrics = if config.telemetry.metrics {
        Some(Arc::new(MetricsRecorder::new()?))
    } else {
        None
    };

    let factory = Arc::new(RetryingExporterFactory::new(args.exporter_mode));
    let mut params = CheckParams::from_config(&config, factory)?;
    if let Some(dir) = &args.report_dir {
        params = params.with_report_dir(dir);
    }
    if let Some(metrics) = &metrics {
        params = params.with_metrics(metrics.clone());
    }

    let cancel = params.cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let report = check_consume_contract(params).await?;

    println!(
        "{} contract check started {} ({} items per scenario)",
        report.data_type,
        report.started_at.to_rfc3339(),
        config.run.item_count
    );
    for result in &report.results {
        println!("{result}");
    }
    if let Some(metrics) = metrics {
        print!("{}", metrics.gather_metrics()?);
    }

    Ok(report.all_passed())
}

pub fn list_scenarios() {
    for scenario in ScenarioKind::ALL {
        let weights = scenario.weights();
        println!(
            "{:<18} success={:.2} transient={:.2} permanent={:.2}",
            scenario.name(),
            weights.success(),
            weights.transient,
            weights.permanent
        );
    }
}
