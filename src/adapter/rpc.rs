//! RPC adapter.
//!
//! RPC frameworks ship their own serve loop and graceful stop; the pack only
//! needs to drive them. Implement [`RpcServer`] for whatever glue wraps your
//! framework's server (e.g. a tonic router spawned on the listener with a
//! shutdown future) and hand it to the pack through [`RpcAdapter`].

use std::io;

use async_trait::async_trait;

use crate::listener::PackListener;

use super::Serve;

/// The surface an RPC server must expose to be controlled by a pack.
#[async_trait]
pub trait RpcServer: Send + Sync + 'static {
    /// Serve RPC traffic on `listener` until stopped.
    async fn serve(&self, listener: PackListener) -> io::Result<()>;

    /// Stop accepting new RPCs, let in-flight ones finish, return when
    /// drained.
    async fn graceful_stop(&self);
}

/// Bridges any [`RpcServer`] into the pack's serve contract.
pub struct RpcAdapter<S> {
    server: S,
}

impl<S: RpcServer> RpcAdapter<S> {
    pub fn new(server: S) -> Self {
        Self { server }
    }
}

#[async_trait]
impl<S: RpcServer> Serve for RpcAdapter<S> {
    async fn serve(&self, listener: PackListener) -> io::Result<()> {
        self.server.serve(listener).await
    }

    async fn graceful_stop(&self) {
        self.server.graceful_stop().await;
    }
}
