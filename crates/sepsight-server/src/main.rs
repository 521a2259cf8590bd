//! SepSight
//!
//! Sepsis mortality risk assessment from five ICU lab values and a free-text
//! clinical note. Serves a JSON API with an embedded web form, or runs one
//! assessment from the command line.

use anyhow::Result;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusHandle;
use sepsight_models::{load_models, EnsembleMetadata, ModelStore};
use sepsight_server::{AppConfig, AppState, AssessResponse, Cli, Commands, Overrides};
use sepsight_telemetry::MetricsCollector;
use std::path::Path;
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            address,
            port,
            predictor_dir,
            verbose,
        } => {
            init_logging(verbose);

            let overrides = Overrides {
                address,
                port,
                predictor_dir,
            };
            let config = AppConfig::load(&config, &overrides)?;
            let addr = config.server.socket_addr()?;
            info!("Ensemble directory: {}", config.models.predictor.dir.display());

            let metrics_handle = init_metrics()?;
            let metrics = MetricsCollector::new();

            // Models load on the first request that needs them
            let store = ModelStore::from_config(config.models.clone(), metrics.clone());
            let state = AppState::new(store, metrics)
                .with_prometheus(metrics_handle)
                .with_any_origin(config.server.allow_any_origin);

            println!();
            println!("  SepSight sepsis risk demonstrator");
            println!("  Open http://{} in your browser", addr);
            println!();

            let shutdown = async {
                shutdown_signal().await;
                warn!("Shutdown signal received, stopping server...");
            };
            sepsight_server::run_server(state, addr, shutdown).await?;
        }

        Commands::Inspect { config, model } => {
            init_logging(false);

            let config = AppConfig::load(&config, &Overrides::default())?;
            inspect(&config.models.predictor.dir, model.as_deref())?;
        }

        Commands::Assess {
            config,
            labs,
            note,
            verbose,
        } => {
            init_logging(verbose);

            let config = AppConfig::load(&config, &Overrides::default())?;
            let metrics = MetricsCollector::new();
            let models = config.models.clone();
            let loaded =
                tokio::task::spawn_blocking(move || load_models(&models, &metrics)).await??;

            for violation in labs.range_violations() {
                eprintln!("warning: {}", violation);
            }

            let assessment = loaded.pipeline.assess(&labs.to_input(), &note).await?;
            let response = AssessResponse::from(assessment);
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
    }

    Ok(())
}

fn inspect(dir: &Path, model: Option<&str>) -> Result<()> {
    let metadata = EnsembleMetadata::load(dir)?;
    let model = metadata.scoring_model(model)?;

    println!("Ensemble:    {}", dir.display());
    if let Some(version) = &metadata.version {
        println!("Version:     {}", version);
    }
    println!("Best model:  {}", metadata.model_best);
    println!("Features:    {}", metadata.features.len());
    println!("Models ({}):", metadata.models.len());
    for name in &metadata.models {
        let marker = if name == &metadata.model_best { "*" } else { " " };
        println!("  {} {}", marker, name);
    }

    let deps = metadata.transitive_dependencies(model);
    println!("Dependencies of {} ({}):", model, deps.len());
    for dep in &deps {
        println!("    {}", dep);
    }
    Ok(())
}

/// Listen for shutdown signals (SIGTERM, SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Logs go to stderr so `assess` output stays parseable
fn init_logging(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        "sepsight=debug,sepsight_models=debug,sepsight_server=debug,tower_http=debug"
    } else {
        "sepsight=info,sepsight_models=info,sepsight_server=info,tower_http=warn"
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Install the Prometheus recorder and return the handle for rendering
fn init_metrics() -> Result<PrometheusHandle> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics: {}", e))?;

    sepsight_telemetry::describe_metrics();
    Ok(handle)
}
