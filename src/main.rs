use std::path::Path;

use d_topology::metrics::init_metrics;
use d_topology::utils::file_io::open_file_for_append;
use d_topology::Error;
use d_topology::NodeBuilder;
use d_topology::Result;
use d_topology::Settings;
use d_topology::SystemError;
use tokio::signal::unix::signal;
use tokio::signal::unix::SignalKind;
use tokio::sync::watch;
use tracing::error;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<()> {
    let settings = Settings::new()?.validate()?;

    let _log_guard = init_logging(&settings.node.alias, &settings.node.log_dir)?;
    init_metrics();

    let (stop_tx, stop_rx) = watch::channel(());
    let node = NodeBuilder::new(settings, stop_rx).build().await?;
    info!(uri = %node.self_uri(), "topology node is up, send SIGINT or SIGTERM to stop");

    tokio::spawn(async move {
        if let Err(e) = wait_for_signal(stop_tx).await {
            error!(error = ?e, "signal handling failed");
        }
    });

    if let Err(e) = node.run().await {
        error!(error = ?e, "node terminated with error");
    }
    info!("bye");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM and broadcasts the stop signal.
async fn wait_for_signal(stop_tx: watch::Sender<()>) -> Result<()> {
    let listen = |kind: SignalKind| signal(kind).map_err(|e| SystemError::Signal(e.to_string()));
    let mut interrupt = listen(SignalKind::interrupt())?;
    let mut terminate = listen(SignalKind::terminate())?;

    let which = tokio::select! {
        _ = interrupt.recv() => "SIGINT",
        _ = terminate.recv() => "SIGTERM",
    };
    info!(signal = which, "stopping");

    stop_tx
        .send(())
        .map_err(|e| Error::from(SystemError::Signal(format!("stop signal not delivered: {e}"))))
}

/// Routes tracing output to `{log_dir}/{alias}/topology.log`, filtered by `RUST_LOG`.
fn init_logging(
    alias: &str,
    log_dir: &Path,
) -> Result<WorkerGuard> {
    let dir = if alias.is_empty() { "node" } else { alias };
    let file = open_file_for_append(log_dir.join(dir).join("topology.log"))?;

    let (writer, guard) = tracing_appender::non_blocking(file);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(EnvFilter::from_default_env()),
        )
        .init();
    Ok(guard)
}
