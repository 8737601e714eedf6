use clap::Parser;
use kestrel_core::install_signal_handler;
use kestrel_server::{bind, build_dispatcher, run_server, BoundaryAdapter, ServerConfig, ServerError};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(
    name = "kestrel-server",
    version,
    about = "Pod lifecycle reconciliation server"
)]
struct Cli {
    /// TOML configuration file.
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Address to listen on.
    #[arg(long)]
    listen: Option<String>,

    /// HTTP worker threads.
    #[arg(long)]
    workers: Option<usize>,

    /// Extra scenario definitions.
    #[arg(long)]
    scenario_file: Option<PathBuf>,

    /// Persist pod records under this directory.
    #[arg(long)]
    journal_dir: Option<PathBuf>,

    /// Network subsystem endpoint for setup requests.
    #[arg(long)]
    provisioner_url: Option<String>,

    #[arg(long)]
    network_timeout_ms: Option<u64>,

    #[arg(long)]
    max_retries: Option<u32>,
}

impl Cli {
    fn apply(self, config: &mut ServerConfig) {
        if let Some(listen) = self.listen {
            config.listen = listen;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if self.scenario_file.is_some() {
            config.scenario_file = self.scenario_file;
        }
        if self.journal_dir.is_some() {
            config.journal_dir = self.journal_dir;
        }
        if self.provisioner_url.is_some() {
            config.provisioner_url = self.provisioner_url;
        }
        if let Some(ms) = self.network_timeout_ms {
            config.engine.network_timeout_ms = ms;
        }
        if let Some(n) = self.max_retries {
            config.engine.max_retries = n;
        }
    }
}

fn run(cli: Cli) -> Result<(), ServerError> {
    let mut config = match &cli.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    cli.apply(&mut config);
    config.validate()?;

    install_signal_handler();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .thread_name("kestrel-worker")
        .enable_all()
        .build()?;
    let dispatcher = Arc::new(build_dispatcher(&config)?);

    let report = dispatcher.recover()?;
    info!(
        "restored {} pod records, {} interrupted by restart",
        report.restored,
        report.interrupted.len()
    );
    for pod_id in &report.interrupted {
        warn!("pod '{pod_id}' failed: network setup interrupted by restart");
    }

    let adapter = BoundaryAdapter::new(Arc::clone(&dispatcher), runtime.handle().clone());
    let server = bind(&config.listen)?;
    info!(
        "starting kestrel-server on {} with {} workers",
        config.listen, config.workers
    );

    let result = run_server(&adapter, &server, config.workers);
    dispatcher.shutdown();
    runtime.shutdown_timeout(Duration::from_secs(1));
    result
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("KESTREL_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
