//! Protocol adapters.
//!
//! The lifecycle core never depends on a concrete protocol library; it only
//! needs something it can hand a listener to and later ask to stop. That
//! contract is [`Serve`]. The adapters in this module are thin shims binding
//! protocol families to it: raw TCP ([`TcpServer`]), HTTP ([`HttpServer`],
//! behind the `http` feature) and bring-your-own RPC ([`RpcAdapter`]).

use std::io;

use async_trait::async_trait;

use crate::listener::PackListener;

#[cfg(feature = "http")]
mod http;
mod rpc;
mod tcp;

#[cfg(feature = "http")]
pub use http::HttpServer;
pub use rpc::{RpcAdapter, RpcServer};
pub use tcp::TcpServer;

/// The serve/shutdown capability the lifecycle core drives.
#[async_trait]
pub trait Serve: Send + Sync + 'static {
    /// Runs the accept loop on `listener` until a fatal error or until a
    /// graceful stop has fully drained in-flight work.
    async fn serve(&self, listener: PackListener) -> io::Result<()>;

    /// Stops accepting new work, lets in-flight work finish, and returns once
    /// drained. Invoked at most once, from the shutdown coordinator.
    async fn graceful_stop(&self);
}
