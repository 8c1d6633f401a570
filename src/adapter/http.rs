//! HTTP adapter on hyper.
//!
//! One hyper connection task per accepted stream, each watched by a
//! [`GracefulShutdown`] so that stopping waits for in-flight requests to
//! finish instead of slamming connections shut.

use std::io;

use async_trait::async_trait;
use hyper::{
    body::{Body, Incoming},
    server::conn::http1,
    service::Service,
    Request, Response,
};
use hyper_util::{rt::TokioIo, server::graceful::GracefulShutdown};
use tokio_util::sync::CancellationToken;

use crate::listener::PackListener;

use super::Serve;

/// HTTP/1 server serving a cloneable hyper service on every connection.
pub struct HttpServer<S> {
    service: S,
    stop: CancellationToken,
    drained: CancellationToken,
}

impl<S> HttpServer<S> {
    pub fn new(service: S) -> Self {
        Self {
            service,
            stop: CancellationToken::new(),
            drained: CancellationToken::new(),
        }
    }
}

#[async_trait]
impl<S, B> Serve for HttpServer<S>
where
    S: Service<Request<Incoming>, Response = Response<B>> + Clone + Send + Sync + 'static,
    S::Future: Send + 'static,
    S::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    B: Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    async fn serve(&self, listener: PackListener) -> io::Result<()> {
        let builder = http1::Builder::new();
        let graceful = GracefulShutdown::new();

        loop {
            tokio::select! {
                _ = self.stop.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok(conn) => {
                        let connection = builder
                            .serve_connection(TokioIo::new(conn), self.service.clone());
                        let watched = graceful.watch(connection);
                        tokio::spawn(async move {
                            if let Err(err) = watched.await {
                                log::warn!("error serving http connection: {err}");
                            }
                        });
                    }
                    Err(err) => {
                        log::warn!("accept connection error: {err}");
                    }
                },
            }
        }

        // Stop accepting first, then drain what is already in flight.
        drop(listener);
        graceful.shutdown().await;
        self.drained.cancel();
        Ok(())
    }

    async fn graceful_stop(&self) {
        self.stop.cancel();
        self.drained.cancelled().await;
    }
}
