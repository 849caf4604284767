//! gcode-uploader - send G-code files to networked CNC and 3D-printer devices.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Parser;
use gcode_uploader as app;
use tokio_util::sync::CancellationToken;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

use app::config::{AppConfig, ConfigLoadResult};
use app::progress::{Progress, ProgressFn};
use app::storage::KnownDevices;
use app::upload::UploadService;

/// Upload G-code files to a device found on the local network.
#[derive(Parser)]
#[command(name = "gcode-uploader", version)]
struct Cli {
    /// Files to upload, in order
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Device id, IP address or hostname (discovered when omitted)
    #[arg(long)]
    host: Option<String>,

    /// Config file (defaults to the platform config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Discovery timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Also write logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _log_guard = init_logging(cli.log_file.as_deref())?;

    tracing::info!("gcode-uploader {} starting...", env!("CARGO_PKG_VERSION"));

    let config_path = cli.config.clone().unwrap_or_else(AppConfig::default_path);
    tracing::info!("Config path: {:?}", config_path);

    let mut config = match AppConfig::try_load(&config_path) {
        ConfigLoadResult::Loaded(config) => {
            tracing::info!("Config loaded successfully");
            config
        }
        ConfigLoadResult::Missing => {
            tracing::info!("Config missing, using defaults");
            AppConfig::default()
        }
        ConfigLoadResult::Invalid(e) => bail!("invalid config {}: {e}", config_path.display()),
    };
    if let Some(secs) = cli.timeout {
        config.discovery.timeout_ms = secs.saturating_mul(1000);
    }
    config.validate().context("invalid settings")?;

    let store_path = config.storage.known_devices_path();
    let store = KnownDevices::load(&store_path).context("loading known devices")?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling upload");
            on_signal.cancel();
        }
    });

    let progress: ProgressFn = Arc::new(|p: Progress| {
        eprint!("\rProgress: {p}   ");
        let _ = std::io::stderr().flush();
    });

    let mut service = UploadService::new(config, store).with_progress(progress);
    let result = service.upload_files(cli.host.as_deref(), &cli.files, &cancel).await;
    eprintln!();

    let reports = result?;
    for report in &reports {
        println!("{}", report.summary());
    }
    Ok(())
}

/// Log to stderr, and to `log_file` as well when given.
fn init_logging(log_file: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into());

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
            let name = path
                .file_name()
                .with_context(|| format!("log file {} has no file name", path.display()))?;
            let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    Ok(guard)
}
