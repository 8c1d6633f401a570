//! Worker-side lifecycle: runtime setup, shared listener, and the graceful
//! shutdown coordinator.
//!
//! A worker accepts and serves connections until the first shutdown-class
//! signal arrives. The coordinator then fires the optional pre-shutdown hook
//! (isolated) and asks the adapter to stop gracefully; the serve loop returns
//! once in-flight work has drained, and the process exits with the serve
//! result. No shutdown timeout is imposed and a second signal during the
//! drain is deliberately left unhandled — bounded shutdown latency is the
//! adapter's call, not ours.

use std::sync::Arc;

use crate::{
    adapter::Serve,
    affinity,
    context::ProcessContext,
    hooks::{fire_isolated, LifecycleHook},
    listener::{bind_listener, Network},
    signal::{ShutdownSignal, ShutdownSignals},
    PackError,
};

pub(crate) async fn run<S>(
    ctx: &ProcessContext,
    core: usize,
    network: Network,
    address: &str,
    server: S,
    on_shutdown: Option<Arc<dyn LifecycleHook>>,
) -> Result<(), PackError>
where
    S: Serve,
{
    let pid = ctx.pid();

    // Best-effort: the worker still works unpinned, just with worse cache
    // locality.
    if let Err(err) = affinity::pin_to_core(core) {
        log::warn!("could not set affinity of worker PID={pid} to cpu core {core}: {err}");
    }

    let listener = bind_listener(network, address)?;
    log::info!("starting worker PID={pid} on cpu core {core}, listening on {address}");

    let server = Arc::new(server);

    // Subscribe before serving so a signal racing startup is not lost.
    let mut signals = ShutdownSignals::subscribe().map_err(PackError::Signals)?;
    let coordinator = Arc::clone(&server);
    tokio::spawn(async move {
        let sig = signals.recv().await;
        shutdown_sequence(pid, sig, on_shutdown.as_deref(), coordinator.as_ref()).await;
    });

    server.serve(listener).await.map_err(PackError::Serve)
}

/// Runs once, on receipt of the single shutdown signal the coordinator
/// listens for. A hook failure cannot keep the graceful stop from happening.
async fn shutdown_sequence<S>(
    pid: u32,
    sig: ShutdownSignal,
    on_shutdown: Option<&dyn LifecycleHook>,
    server: &S,
) where
    S: Serve,
{
    log::info!("worker process PID={pid} received signal: {sig}, shutting down gracefully");
    if let Some(hook) = on_shutdown {
        fire_isolated("pre-shutdown", hook);
    }
    server.graceful_stop().await;
}
