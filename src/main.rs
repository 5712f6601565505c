// Main entrypoint for the photon runtime.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use photon::app::App;
use photon::artifact::{self, Artifact};
use photon::config::{Config, ConfigTrait};
use photon::instance::{Catalog, HostedInstance};
use photon::shutdown::GracefulShutdown;
use photon::{liveness, logfile, prebuilt};

const CONFIG_PATH: &str = "cfg/photon.cfg.yaml";

/// Photon - package units of logic as artifacts and serve them over HTTP
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Custom config file path
    #[arg(short, long, value_name = "FILE", global = true)]
    cfg: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve a unit, either fresh from the catalog or loaded from an artifact
    Run {
        /// Unit type from the built-in catalog
        #[arg(long, conflicts_with = "artifact", required_unless_present = "artifact")]
        model: Option<String>,
        /// Artifact file to load
        #[arg(long)]
        artifact: Option<PathBuf>,
        /// Instance name
        #[arg(long)]
        name: Option<String>,
    },
    /// Save a fresh instance of a unit as an artifact
    Create {
        #[arg(long)]
        model: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long, value_name = "FILE")]
        out: PathBuf,
    },
    /// Print an artifact's metadata
    Inspect {
        #[arg(long, value_name = "FILE")]
        artifact: PathBuf,
    },
}

/// Loads the configuration: the given file, else the default file if
/// present, else built-in defaults. Environment overrides apply on top.
fn load_cfg(path: Option<PathBuf>) -> Result<Config> {
    let mut cfg = match path {
        Some(custom_path) => Config::load(&custom_path)
            .with_context(|| format!("failed to load custom config from {:?}", custom_path))?,
        None if Path::new(CONFIG_PATH).exists() => {
            Config::load(CONFIG_PATH).with_context(|| format!("failed to load config from {}", CONFIG_PATH))?
        }
        None => Config::default(),
    };
    cfg.apply_env().context("invalid environment override")?;
    Ok(cfg)
}

/// Configures structured logging based on configuration.
fn configure_logger(cfg: &Config) -> Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let log_level = cfg
        .logs()
        .and_then(|logs| logs.level.as_deref())
        .unwrap_or("info");
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let log_file = cfg.logs().and_then(|logs| logs.file.as_ref());
    if let Some(path) = log_file {
        logfile::open(path).with_context(|| format!("failed to open log file {:?}", path))?;
    }
    let file_layer = log_file.map(|_| fmt::layer().json().with_ansi(false).with_writer(logfile::writer));

    if cfg.is_prod() {
        // Production: JSON format
        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .with(fmt::layer().json())
            .init();
    } else {
        // Development: Pretty console format
        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .with(fmt::layer().pretty())
            .init();
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    let cfg = load_cfg(args.cfg)?;

    // The recorder is process-wide; install it before any metric is touched.
    if cfg.is_metrics_enabled() {
        if let Err(e) = photon::controller::metrics::init_prometheus_exporter() {
            eprintln!("Warning: Failed to initialize Prometheus metrics exporter: {}", e);
        }
    }

    tokio::runtime::Runtime::new()
        .context("Failed to create tokio runtime")?
        .block_on(async_main(cfg, args.command))
}

async fn async_main(cfg: Config, command: Command) -> Result<()> {
    configure_logger(&cfg)?;
    let catalog = prebuilt::catalog().context("prebuilt units failed to register")?;

    match command {
        Command::Run { model, artifact, name } => {
            let instance = match (model, artifact) {
                (_, Some(path)) => {
                    let artifact = Artifact::open(&path).with_context(|| format!("failed to open artifact {:?}", path))?;
                    artifact::load(&artifact, catalog).context("failed to load artifact")?
                }
                (Some(model), None) => fresh_instance(&catalog, &model, name)?,
                (None, None) => bail!("either --model or --artifact is required"),
            };
            serve(cfg, instance).await
        }
        Command::Create { model, name, out } => {
            let instance = fresh_instance(&catalog, &model, name)?;
            let artifact = artifact::save_to(&instance, &out)
                .with_context(|| format!("failed to write artifact {:?}", out))?;
            info!(
                component = "main",
                event = "artifact_created",
                path = ?out,
                id = %artifact.metadata().id,
                "artifact created"
            );
            println!("{}", artifact.metadata().id);
            Ok(())
        }
        Command::Inspect { artifact } => {
            let metadata = artifact::load_metadata(&artifact)
                .with_context(|| format!("failed to read artifact {:?}", artifact))?;
            println!("{}", serde_json::to_string_pretty(&metadata)?);
            Ok(())
        }
    }
}

fn fresh_instance(catalog: &Arc<Catalog>, model: &str, name: Option<String>) -> Result<Arc<HostedInstance>> {
    let Some(definition) = catalog.unit(model) else {
        bail!(
            "unknown unit `{}`; available: {}",
            model,
            catalog.unit_names().join(", ")
        );
    };
    let mut builder = HostedInstance::builder(definition).catalog(Arc::clone(catalog));
    if let Some(name) = name {
        builder = builder.name(name);
    }
    Ok(builder.build())
}

async fn serve(mut cfg: Config, instance: Arc<HostedInstance>) -> Result<()> {
    // Values declared by the unit win over file and environment.
    cfg.apply_unit(instance.definition());

    let shutdown_token = CancellationToken::new();
    let graceful_shutdown = GracefulShutdown::new(shutdown_token.clone())
        .with_graceful_timeout(cfg.graceful_timeout())
        .with_grace_period(cfg.incoming_traffic_grace_period());

    let probe = Arc::new(liveness::Probe::new(cfg.probe_timeout()));
    let app = App::new(shutdown_token, cfg, instance, probe)?;

    if let Err(e) = app.serve(&graceful_shutdown).await {
        error!(
            component = "main",
            scope = "app",
            event = "start_failed",
            error = %e,
            "failed to start app"
        );
        app.close();
        if let Err(e) = graceful_shutdown.await_shutdown().await {
            warn!(component = "main", event = "drain_failed", error = %e, "listeners did not stop in time");
        }
        return Err(e);
    }

    if let Err(e) = graceful_shutdown.await_shutdown().await {
        error!(
            component = "main",
            scope = "service",
            event = "graceful_shutdown_failed",
            error = %e,
            "failed to gracefully shut down service"
        );
        return Err(e);
    }

    Ok(())
}
