use clap::Parser;
use pulse_core::api::{spawn_api_server, ApiState};
use pulse_core::{read_config_file, Core};
use tokio::sync::RwLock;
use tracing::{error, info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short, long)]
    file: String,
}

fn init_logging() {
    let filter = filter::Targets::new().with_targets(vec![("pulse_core", LevelFilter::TRACE), ("pulsed", LevelFilter::TRACE)]);
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).compact())
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = read_config_file(&args.file)?;
    let resolved = config.resolve()?;
    info!(
        endpoints = resolved.endpoints.len(),
        rules = resolved.alert_rules.len(),
        "configuration resolved"
    );

    let core = Core::new(resolved.clone()).await?;

    if let Some(api_config) = resolved.api.clone() {
        let rule_set = std::sync::Arc::new(RwLock::new(pulse_core::api::state::AlertRuleSet {
            rules: resolved.alert_rules.clone(),
            overrides: resolved.overrides.clone(),
        }));

        let api_state = ApiState {
            scheduler: core.scheduler.clone(),
            cache: core.cache.clone(),
            metrics: core.metrics.clone(),
            alerts: core.alerts.clone(),
            events: core.events.clone(),
            rule_set,
        };

        match spawn_api_server(api_config, api_state).await {
            Ok(addr) => info!(%addr, "API server listening"),
            Err(e) => error!(error = %e, "failed to start API server"),
        }
    } else {
        info!("API server disabled (not configured)");
    }

    info!("pulse running, press Ctrl+C to shut down");
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received shutdown signal"),
        Err(err) => warn!("unable to listen for shutdown signal: {err}"),
    }

    core.shutdown().await;
    Ok(())
}
