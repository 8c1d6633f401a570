//! Raw byte-stream adapter.
//!
//! Every accepted connection is handed to a user closure running as its own
//! task. Accept errors do not kill the loop. On graceful stop the listener is
//! dropped first, then the in-flight connection tracker drains to zero.

use std::{future::Future, io};

use async_trait::async_trait;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::listener::{Connection, PackListener};

use super::Serve;

/// TCP/unix-stream server driven by one handler per connection.
pub struct TcpServer<H> {
    handler: H,
    stop: CancellationToken,
    drained: CancellationToken,
    connections: TaskTracker,
}

impl<H, F> TcpServer<H>
where
    H: Fn(Connection) -> F + Send + Sync + 'static,
    F: Future<Output = ()> + Send + 'static,
{
    /// `handler` is called once per accepted connection; the connection is
    /// closed when the returned future completes.
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            stop: CancellationToken::new(),
            drained: CancellationToken::new(),
            connections: TaskTracker::new(),
        }
    }
}

#[async_trait]
impl<H, F> Serve for TcpServer<H>
where
    H: Fn(Connection) -> F + Send + Sync + 'static,
    F: Future<Output = ()> + Send + 'static,
{
    async fn serve(&self, listener: PackListener) -> io::Result<()> {
        loop {
            tokio::select! {
                _ = self.stop.cancelled() => break,
                accepted = listener.accept() => match accepted {
                    Ok(conn) => {
                        log::debug!("new connection accepted from {}", conn.peer());
                        self.connections.spawn((self.handler)(conn));
                    }
                    Err(err) => {
                        log::warn!("accept connection error: {err}");
                    }
                },
            }
        }

        // Close the socket before draining so no new connections land while
        // in-flight ones finish.
        drop(listener);
        self.connections.close();
        self.connections.wait().await;
        self.drained.cancel();
        Ok(())
    }

    async fn graceful_stop(&self) {
        self.stop.cancel();
        self.drained.cancelled().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, time::Duration};
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::{TcpListener, TcpStream},
    };

    async fn echo(mut conn: Connection) {
        let mut buf = [0u8; 256];
        loop {
            match conn.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if conn.write_all(&buf[..n]).await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    #[tokio::test]
    async fn serves_and_drains_on_graceful_stop() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = Arc::new(TcpServer::new(echo));
        let serving = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.serve(listener.into()).await })
        };

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"howl").await.unwrap();
        let mut reply = [0u8; 4];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(&reply, b"howl");

        // Stop while the client connection is still open: the echo task ends
        // once the client side closes, and only then does the drain finish.
        let stopper = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.graceful_stop().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!stopper.is_finished(), "drain finished with a live connection");

        drop(client);
        tokio::time::timeout(Duration::from_secs(5), stopper)
            .await
            .unwrap()
            .unwrap();
        tokio::time::timeout(Duration::from_secs(5), serving)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn no_new_connections_after_stop() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = Arc::new(TcpServer::new(echo));
        let serving = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.serve(listener.into()).await })
        };

        server.graceful_stop().await;
        serving.await.unwrap().unwrap();

        // The listening socket is gone; a fresh connection must fail.
        assert!(TcpStream::connect(addr).await.is_err());
    }
}
