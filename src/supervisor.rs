//! The main process: owns the worker pool, the upgrade protocol, and the
//! top-level signal loop.
//!
//! Lifecycle: spawn one worker per CPU core, then sit on the signal loop.
//! A shutdown-class signal is fanned out to every live worker and the
//! supervisor exits only after every wait-for-exit has returned. SIGUSR2
//! spawns a successor supervisor from the executable currently on disk and
//! the loop keeps running — the successor retires this generation itself,
//! after a fixed grace interval, by sending it SIGTERM.

use std::{io, sync::Arc, time::Duration};

use nix::{errno::Errno, sys::signal::kill, unistd::Pid};
use tokio::process::Child;

use crate::{
    context::ProcessContext,
    hooks::{fire_isolated, LifecycleHook},
    signal::{ShutdownSignal, SupervisorEvent, SupervisorSignals},
    spawn, PackError,
};

/// How long a freshly upgraded supervisor lets its predecessor keep serving
/// before telling it to exit.
pub(crate) const PREDECESSOR_GRACE: Duration = Duration::from_secs(5);

/// Supervisor-side handle to one worker process.
pub(crate) struct WorkerRecord {
    pub(crate) core: usize,
    pub(crate) child: Child,
}

/// One slot per CPU core; `None` means the spawn for that core failed and
/// the slot stayed empty.
pub(crate) struct WorkerPool {
    workers: Vec<Option<WorkerRecord>>,
}

impl WorkerPool {
    /// Spawns `count` workers with core indices `0..count`. A failed spawn is
    /// logged and leaves its slot empty; it never aborts pool startup.
    pub(crate) fn populate<F>(count: usize, mut spawn_one: F) -> Self
    where
        F: FnMut(usize) -> io::Result<WorkerRecord>,
    {
        let mut workers = Vec::with_capacity(count);
        for core in 0..count {
            match spawn_one(core) {
                Ok(record) => {
                    let pid = record.child.id().unwrap_or_default();
                    log::info!("worker process PID={pid} started on cpu core {core}");
                    workers.push(Some(record));
                }
                Err(err) => {
                    log::error!("could not start worker process on cpu core {core}: {err}");
                    workers.push(None);
                }
            }
        }
        Self { workers }
    }

    pub(crate) fn live_count(&self) -> usize {
        self.workers.iter().flatten().count()
    }

    /// Propagates `sig` to every live worker, then waits for all of them.
    ///
    /// All signals are issued before any wait completes, and every dispatched
    /// wait must return — success, failure and non-zero exits are each logged
    /// without blocking the others.
    pub(crate) async fn signal_and_wait(self, sig: ShutdownSignal) {
        let waits = self
            .workers
            .into_iter()
            .flatten()
            .map(|record| signal_and_reap(record, sig));
        futures::future::join_all(waits).await;
    }
}

async fn signal_and_reap(record: WorkerRecord, sig: ShutdownSignal) {
    let WorkerRecord { core, mut child } = record;
    let Some(pid) = child.id() else {
        log::info!("worker on cpu core {core} already exited");
        return;
    };
    if let Err(err) = kill(Pid::from_raw(pid as i32), sig.as_raw()) {
        log::error!("could not send {sig} to worker process PID={pid}: {err}");
        return;
    }
    match child.wait().await {
        Ok(status) => log::info!("worker process PID={pid} exited with status: {status}"),
        Err(err) => log::error!("waiting failed after sending {sig} to worker process PID={pid}: {err}"),
    }
}

/// Runs the supervisor until a shutdown-class signal ends the pack.
///
/// The returned error names the signal that ended the run; there is no
/// successful return.
pub(crate) async fn run(
    ctx: &ProcessContext,
    on_upgrade: Option<Arc<dyn LifecycleHook>>,
) -> Result<(), PackError> {
    let pid = ctx.pid();
    log::info!("main process PID={pid}, starting up a pack");

    // Subscribe before spawning so an early signal is not lost.
    let mut signals = SupervisorSignals::subscribe().map_err(PackError::Signals)?;

    let cores = num_cpus::get();
    let pool = WorkerPool::populate(cores, |core| {
        spawn::spawn(&ctx.worker_tokens(core)).map(|child| WorkerRecord { core, child })
    });
    log::info!("{} of {cores} workers running", pool.live_count());

    // If this generation replaced another, schedule the predecessor's
    // retirement without blocking the signal loop.
    if let Some(predecessor) = ctx.predecessor() {
        tokio::spawn(retire_predecessor(pid, predecessor));
    }

    loop {
        match signals.recv().await {
            SupervisorEvent::Shutdown(sig) => {
                log::info!("main process PID={pid} received signal: {sig}");
                pool.signal_and_wait(sig).await;
                return Err(PackError::Terminated(sig));
            }
            SupervisorEvent::Upgrade => {
                if let Some(hook) = &on_upgrade {
                    fire_isolated("pre-upgrade", hook.as_ref());
                }
                log::info!("main process PID={pid} starting new main process");
                match spawn::spawn(&ctx.upgrade_tokens()) {
                    Ok(successor) => {
                        let new_pid = successor.id().unwrap_or_default();
                        log::info!(
                            "main process PID={pid} new main process PID={new_pid} has started"
                        );
                    }
                    Err(err) => {
                        log::error!("main process PID={pid} could not start new main process: {err}")
                    }
                }
            }
        }
    }
}

/// Lets the two generations co-exist for the grace interval, then asks the
/// predecessor to shut down. A predecessor that already exited is not an
/// error.
async fn retire_predecessor(pid: u32, predecessor: i32) {
    tokio::time::sleep(PREDECESSOR_GRACE).await;
    terminate_predecessor(pid, predecessor);
}

fn terminate_predecessor(pid: u32, predecessor: i32) {
    match kill(Pid::from_raw(predecessor), nix::sys::signal::Signal::SIGTERM) {
        Ok(()) => log::info!("main process PID={pid} sent SIGTERM to previous PID={predecessor}"),
        Err(Errno::ESRCH) => {
            log::info!("main process PID={pid} previous PID={predecessor} already exited")
        }
        Err(err) => log::error!(
            "main process PID={pid} could not send SIGTERM to previous PID={predecessor}: {err}"
        ),
    }
}
