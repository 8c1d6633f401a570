//! Shared-port listener construction.
//!
//! Every worker binds the identical address. That only works because both
//! `SO_REUSEADDR` and `SO_REUSEPORT` are set on the socket *before* bind;
//! with port reuse in place the kernel hashes each incoming connection's
//! 4-tuple and hands it to exactly one of the bound sockets, which is the
//! entire load-balancing story of a pack. Option failures are collected and
//! surfaced together — a listener that silently got only one of the two
//! options would change load distribution behind the operator's back.

use std::{
    fmt, io,
    net::SocketAddr,
    pin::Pin,
    task::{Context, Poll},
};

use derive_more::{Display, Error, From};
use socket2::{Domain, SockAddr, Socket, Type};
use tokio::{
    io::{AsyncRead, AsyncWrite, ReadBuf},
    net::{TcpListener, TcpStream, UnixListener, UnixStream},
};

const BACKLOG: i32 = 128;

/// Address family a pack listens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    /// TCP on an `ip:port` address.
    Tcp,
    /// Unix domain stream socket on a filesystem path.
    Unix,
}

/// Why a listener could not be produced.
#[derive(Debug, Display, Error, From)]
pub enum ListenError {
    /// The TCP address string did not parse.
    #[display("invalid listen address {address:?}: {source}")]
    Address {
        address: String,
        source: std::net::AddrParseError,
    },

    /// One or more socket options could not be applied. Partial application
    /// is reported the same as total failure.
    #[display("could not set socket options: {_0}")]
    Options(#[error(not(source))] SocketOptionErrors),

    /// Creating, binding or registering the socket failed.
    #[display("{_0}")]
    #[from]
    Io(io::Error),
}

/// Every socket option that failed to apply, reported as one error.
#[derive(Debug)]
pub struct SocketOptionErrors {
    failures: Vec<(&'static str, io::Error)>,
}

impl fmt::Display for SocketOptionErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (option, err) in &self.failures {
            if !first {
                write!(f, "; ")?;
            }
            write!(f, "{option}: {err}")?;
            first = false;
        }
        Ok(())
    }
}

/// A bound, listening socket ready for an accept loop.
#[derive(Debug)]
pub enum PackListener {
    Tcp(TcpListener),
    Unix(UnixListener),
}

/// One accepted stream, address-family erased so adapters can stay generic.
pub enum Connection {
    Tcp(TcpStream),
    Unix(UnixStream),
}

/// Binds `address` with address- and port-reuse enabled.
///
/// Must run inside a tokio runtime; the returned listener is already
/// registered with the reactor.
pub fn bind_listener(network: Network, address: &str) -> Result<PackListener, ListenError> {
    match network {
        Network::Tcp => {
            let addr: SocketAddr = address.parse().map_err(|source| ListenError::Address {
                address: address.to_string(),
                source,
            })?;
            let socket = Socket::new(Domain::for_address(addr), Type::STREAM, None)?;
            apply_sharing_options(&socket)?;
            socket.set_nonblocking(true)?;
            socket.bind(&addr.into())?;
            socket.listen(BACKLOG)?;
            let listener: std::net::TcpListener = socket.into();
            Ok(PackListener::Tcp(TcpListener::from_std(listener)?))
        }
        Network::Unix => {
            let socket = Socket::new(Domain::UNIX, Type::STREAM, None)?;
            apply_sharing_options(&socket)?;
            socket.set_nonblocking(true)?;
            socket.bind(&SockAddr::unix(address)?)?;
            socket.listen(BACKLOG)?;
            let listener: std::os::unix::net::UnixListener = socket.into();
            Ok(PackListener::Unix(UnixListener::from_std(listener)?))
        }
    }
}

/// Reuse options must be applied before bind; afterwards they are inert.
fn apply_sharing_options(socket: &Socket) -> Result<(), ListenError> {
    let mut failures = Vec::new();
    if let Err(err) = socket.set_reuse_address(true) {
        failures.push(("SO_REUSEADDR", err));
    }
    if let Err(err) = socket.set_reuse_port(true) {
        failures.push(("SO_REUSEPORT", err));
    }
    if failures.is_empty() {
        Ok(())
    } else {
        Err(ListenError::Options(SocketOptionErrors { failures }))
    }
}

impl PackListener {
    /// Waits for the next incoming connection.
    pub async fn accept(&self) -> io::Result<Connection> {
        match self {
            PackListener::Tcp(listener) => listener
                .accept()
                .await
                .map(|(stream, _)| Connection::Tcp(stream)),
            PackListener::Unix(listener) => listener
                .accept()
                .await
                .map(|(stream, _)| Connection::Unix(stream)),
        }
    }
}

impl From<TcpListener> for PackListener {
    fn from(listener: TcpListener) -> Self {
        PackListener::Tcp(listener)
    }
}

impl From<UnixListener> for PackListener {
    fn from(listener: UnixListener) -> Self {
        PackListener::Unix(listener)
    }
}

impl Connection {
    /// Best-effort peer description for logging.
    pub fn peer(&self) -> String {
        match self {
            Connection::Tcp(stream) => stream
                .peer_addr()
                .map(|addr| format!("tcp/{addr}"))
                .unwrap_or_else(|_| "tcp/unknown".to_string()),
            Connection::Unix(stream) => stream
                .peer_addr()
                .ok()
                .and_then(|addr| addr.as_pathname().map(|p| format!("unix/{}", p.display())))
                .unwrap_or_else(|| "unix/unnamed".to_string()),
        }
    }
}

impl AsyncRead for Connection {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Connection::Tcp(stream) => Pin::new(stream).poll_read(cx, buf),
            Connection::Unix(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for Connection {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Connection::Tcp(stream) => Pin::new(stream).poll_write(cx, buf),
            Connection::Unix(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Connection::Tcp(stream) => Pin::new(stream).poll_flush(cx),
            Connection::Unix(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Connection::Tcp(stream) => Pin::new(stream).poll_shutdown(cx),
            Connection::Unix(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}
