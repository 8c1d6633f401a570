#![doc = include_str!("../README.md")]

pub mod adapter;
mod affinity;
mod context;
mod env;
mod hooks;
mod listener;
mod signal;
mod spawn;
mod supervisor;
mod worker;

use std::{io, sync::Arc};

use derive_more::{Display, Error, From};

use crate::context::ProcessContext;

// reexports
pub use crate::{
    adapter::{RpcAdapter, RpcServer, Serve, TcpServer},
    affinity::AffinityError,
    context::Role,
    env::EnvError,
    hooks::LifecycleHook,
    listener::{bind_listener, Connection, ListenError, Network, PackListener, SocketOptionErrors},
    signal::ShutdownSignal,
};

#[cfg(feature = "http")]
pub use crate::adapter::HttpServer;

/// Why a pack run ended, or never started.
#[derive(Debug, Display, Error, From)]
pub enum PackError {
    /// The supervisor was ended by a shutdown signal. This is the normal way
    /// a pack run finishes and names the signal that did it.
    #[display("signal received: {_0}")]
    Terminated(#[error(not(source))] ShutdownSignal),

    /// The handshake environment this process was started with is invalid.
    #[display("invalid process environment: {_0}")]
    #[from]
    Env(EnvError),

    /// The shared-port listener could not be built.
    #[display("could not bind listener: {_0}")]
    #[from]
    Listen(ListenError),

    /// Signal handlers could not be installed.
    #[display("could not install signal handlers: {_0}")]
    Signals(io::Error),

    /// The per-process async runtime could not be built.
    #[display("could not build runtime: {_0}")]
    Runtime(io::Error),

    /// The adapter's serve loop failed.
    #[display("serve failed: {_0}")]
    Serve(io::Error),
}

/// Entry point: a process's view of the pack it belongs to.
///
/// Build one at the very top of `main`, then call [`Pack::serve`]. The same
/// code path runs in every process of the pack; the role read from the
/// environment at build time decides whether this process supervises or
/// serves.
pub struct Pack {
    ctx: ProcessContext,
    on_upgrade: Option<Arc<dyn LifecycleHook>>,
    on_shutdown: Option<Arc<dyn LifecycleHook>>,
}

/// Configures hooks before the role is locked in with [`PackBuilder::build`].
#[derive(Default)]
pub struct PackBuilder {
    on_upgrade: Option<Arc<dyn LifecycleHook>>,
    on_shutdown: Option<Arc<dyn LifecycleHook>>,
}

impl PackBuilder {
    /// Called in the supervisor right before it spawns its successor during
    /// an executable upgrade. Panics in the hook are contained.
    pub fn on_upgrade<H: LifecycleHook>(mut self, hook: H) -> Self {
        self.on_upgrade = Some(Arc::new(hook));
        self
    }

    /// Called in a worker right before its graceful stop begins. Panics in
    /// the hook are contained.
    pub fn on_shutdown<H: LifecycleHook>(mut self, hook: H) -> Self {
        self.on_shutdown = Some(Arc::new(hook));
        self
    }

    /// Reads the handshake environment once and fixes this process's role.
    ///
    /// Fails on a malformed handshake (e.g. a worker spawned without a
    /// parseable core assignment); there is nothing sensible to default to.
    pub fn build(self) -> Result<Pack, EnvError> {
        Ok(Pack {
            ctx: ProcessContext::from_env()?,
            on_upgrade: self.on_upgrade,
            on_shutdown: self.on_shutdown,
        })
    }
}

impl Pack {
    pub fn builder() -> PackBuilder {
        PackBuilder::default()
    }

    /// This process's role, fixed at build time.
    pub fn role(&self) -> Role {
        self.ctx.role()
    }

    /// True in the coordinating process, false in workers.
    pub fn is_supervisor(&self) -> bool {
        matches!(self.ctx.role(), Role::Supervisor)
    }

    /// The CPU core this worker settles on, or `None` in the supervisor.
    pub fn worker_core(&self) -> Option<usize> {
        match self.ctx.role() {
            Role::Worker { core } => Some(core),
            Role::Supervisor => None,
        }
    }

    pub fn pid(&self) -> u32 {
        self.ctx.pid()
    }

    /// Runs this process's side of the pack until it ends.
    ///
    /// In the supervisor this spawns one worker per CPU core, then blocks on
    /// the signal loop; `network`, `address` and `server` are only used by
    /// workers, and the return value is always the error naming the signal
    /// that ended the run. In a worker this pins the process to its core,
    /// binds the shared-port listener and blocks on the adapter's serve loop;
    /// the return value is the serve result after a graceful stop.
    ///
    /// Each process runs on its own current-thread runtime, which is what
    /// keeps a worker's scheduling confined to the single core it is pinned
    /// to.
    pub fn serve<S>(self, network: Network, address: &str, server: S) -> Result<(), PackError>
    where
        S: Serve,
    {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(PackError::Runtime)?;

        match self.ctx.role() {
            Role::Supervisor => runtime.block_on(supervisor::run(&self.ctx, self.on_upgrade)),
            Role::Worker { core } => runtime.block_on(worker::run(
                &self.ctx,
                core,
                network,
                address,
                server,
                self.on_shutdown,
            )),
        }
    }
}
