//! Signal subscriptions for both process roles.
//!
//! Each subscription is a set of tokio unix signal streams plus a `recv`
//! that suspends until the first qualifying signal arrives. Delivery is
//! single-slot: one in-flight notification per stream, no queueing.

use std::io;

use derive_more::Display;
use tokio::signal::unix::{signal, Signal, SignalKind};

/// A signal that requests graceful shutdown. Both roles honor all three.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ShutdownSignal {
    #[display("SIGINT")]
    Interrupt,
    #[display("SIGTERM")]
    Terminate,
    #[display("SIGQUIT")]
    Quit,
}

impl ShutdownSignal {
    /// The raw signal to forward to a child process.
    pub(crate) fn as_raw(self) -> nix::sys::signal::Signal {
        use nix::sys::signal::Signal as Raw;
        match self {
            ShutdownSignal::Interrupt => Raw::SIGINT,
            ShutdownSignal::Terminate => Raw::SIGTERM,
            ShutdownSignal::Quit => Raw::SIGQUIT,
        }
    }
}

/// What the supervisor's signal loop acts on. Workers never subscribe to
/// upgrade requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SupervisorEvent {
    Shutdown(ShutdownSignal),
    Upgrade,
}

/// Shutdown-class subscription used by workers.
pub(crate) struct ShutdownSignals {
    interrupt: Signal,
    terminate: Signal,
    quit: Signal,
}

impl ShutdownSignals {
    pub(crate) fn subscribe() -> io::Result<Self> {
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
            quit: signal(SignalKind::quit())?,
        })
    }

    /// Resolves with the first shutdown signal to arrive.
    ///
    /// The streams never terminate, so a resolved branch always means a
    /// delivered signal.
    pub(crate) async fn recv(&mut self) -> ShutdownSignal {
        tokio::select! {
            _ = self.interrupt.recv() => ShutdownSignal::Interrupt,
            _ = self.terminate.recv() => ShutdownSignal::Terminate,
            _ = self.quit.recv() => ShutdownSignal::Quit,
        }
    }
}

/// Supervisor subscription: shutdown classes plus SIGUSR2 as the upgrade
/// request.
pub(crate) struct SupervisorSignals {
    shutdown: ShutdownSignals,
    upgrade: Signal,
}

impl SupervisorSignals {
    pub(crate) fn subscribe() -> io::Result<Self> {
        Ok(Self {
            shutdown: ShutdownSignals::subscribe()?,
            upgrade: signal(SignalKind::user_defined2())?,
        })
    }

    /// Resolves with exactly one event; the caller decides whether its loop
    /// continues (upgrade) or ends (shutdown).
    pub(crate) async fn recv(&mut self) -> SupervisorEvent {
        tokio::select! {
            sig = self.shutdown.recv() => SupervisorEvent::Shutdown(sig),
            _ = self.upgrade.recv() => SupervisorEvent::Upgrade,
        }
    }
}
