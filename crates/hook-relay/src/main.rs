//! hook-relay: routes source-control webhook deliveries to the destinations
//! named in the webhook URL's query string, forwarding the payload unchanged.

mod config;
mod dispatch;
mod error;
mod event;
mod relay;
mod rules;
mod server;
mod stats;

use std::time::Duration;

use config::RelayConfig;
use dispatch::Dispatcher;
use relay::forward::Forwarder;
use server::AppState;
use stats::RelayStats;

fn main() -> anyhow::Result<()> {
    let config_path = {
        let args: Vec<String> = std::env::args().collect();
        args.iter()
            .position(|a| a == "--config")
            .and_then(|i| args.get(i + 1).cloned())
            .or_else(|| args.get(1).filter(|a| !a.starts_with('-')).cloned())
            .or_else(|| std::env::var("HOOK_RELAY_CONFIG").ok())
            .unwrap_or_else(|| "hook-relay.toml".to_string())
    };

    let config = RelayConfig::load(&config_path)?;

    // The tonic OTLP exporter needs a reactor context, so build the runtime first.
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let tracing_guard = hook_tracing::init_tracing(&config.tracing);

        tracing::info!(
            config_path = %config_path,
            listen_address = %config.server.listen_address,
            webhook_path = %config.server.webhook_path,
            timeout_secs = ?config.forward.timeout_secs,
            otlp_enabled = tracing_guard.otlp_enabled(),
            "Starting hook-relay"
        );

        run(config).await
    })
}

async fn run(config: RelayConfig) -> anyhow::Result<()> {
    let mut client = relay::forward::client_builder();
    if let Some(secs) = config.forward.timeout_secs {
        client = client.timeout(Duration::from_secs(secs));
    }
    if let Some(secs) = config.forward.connect_timeout_secs {
        client = client.connect_timeout(Duration::from_secs(secs));
    }
    let dispatcher = Dispatcher::new(Forwarder::new(client.build()?));

    let state = AppState {
        config,
        dispatcher,
        stats: RelayStats::new(),
    };

    server::run(state).await
}
