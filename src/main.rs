use anyhow::Context;
use nginx_bootstrap::{DockerRuntime, Outcome, ReconcileError, Reconciler, ReconcilerConfig};
use tokio_util::sync::CancellationToken;

fn init_logging() {
    let mut builder = pretty_env_logger::formatted_timed_builder();
    builder
        .target(env_logger::Target::Stdout)
        .filter_level(log::LevelFilter::Info);
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    builder.init();
}

async fn run(config: ReconcilerConfig, cancel: &CancellationToken) -> anyhow::Result<Outcome> {
    let runtime = DockerRuntime::connect()
        .await
        .context("Failed to connect to Docker daemon")?;
    log::debug!("Connected to Docker daemon");

    let reconciler = Reconciler::new(runtime, config);
    let outcome = reconciler.reconcile(cancel).await?;
    Ok(outcome)
}

#[tokio::main]
async fn main() {
    init_logging();
    log::info!("Trying to create a simple nginx container");

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, cancelling reconciliation");
            on_interrupt.cancel();
        }
    });

    let config = ReconcilerConfig::default();
    let name = config.container_name.clone();
    let port_spec = config.port_spec();

    match run(config, &cancel).await {
        Ok(Outcome::Created { container_id }) => {
            log::info!("Container '{}' is ready ({})", name, container_id);
        }
        Ok(Outcome::AlreadyRunning {
            container_id,
            host_port: Some(port),
        }) => {
            log::info!("Container '{}' ({}) is reachable on host port {}", name, container_id, port);
        }
        Ok(Outcome::AlreadyRunning {
            container_id,
            host_port: None,
        }) => {
            log::warn!("Container '{}' ({}) has no host port for {}", name, container_id, port_spec);
        }
        Err(e) => match e.downcast_ref::<ReconcileError>() {
            Some(failure) => log::error!("Reconciliation failed at {} stage: {}", failure.stage(), failure),
            None => log::error!("{:#}", e),
        },
    }
}
