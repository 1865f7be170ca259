//! Listener capability consumed by the accept loop.

use std::future::Future;
use std::io;
use std::net::SocketAddr;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};

/// Failure returned by [`Listener::accept`].
#[derive(Debug, Error)]
pub enum AcceptError {
    /// The listener is still usable; the accept loop retries.
    #[error("temporary accept error: {0}")]
    Temporary(io::Error),

    /// The listener is broken; the accept loop stops.
    #[error("fatal accept error: {0}")]
    Fatal(io::Error),
}

impl AcceptError {
    pub fn is_temporary(&self) -> bool {
        matches!(self, Self::Temporary(_))
    }

    /// Sort an IO error from `accept(2)` into retryable and fatal.
    ///
    /// Aborted handshakes and descriptor or buffer exhaustion clear up on
    /// their own; anything else means the socket itself is unusable.
    pub fn classify(err: io::Error) -> Self {
        use io::ErrorKind::{
            ConnectionAborted, ConnectionRefused, ConnectionReset, Interrupted, TimedOut,
            WouldBlock,
        };
        let temporary = matches!(
            err.kind(),
            ConnectionAborted | ConnectionReset | ConnectionRefused | Interrupted | WouldBlock
                | TimedOut
        ) || matches!(err.raw_os_error(), Some(code) if is_resource_exhaustion(code));

        if temporary {
            Self::Temporary(err)
        } else {
            Self::Fatal(err)
        }
    }
}

#[cfg(unix)]
fn is_resource_exhaustion(code: i32) -> bool {
    // ENOMEM, ENFILE, EMFILE, ENOBUFS (Linux numbering; BSDs share the first three)
    matches!(code, 12 | 23 | 24 | 105)
}

#[cfg(not(unix))]
fn is_resource_exhaustion(_code: i32) -> bool {
    false
}

/// A source of inbound byte streams.
///
/// Implemented for [`tokio::net::TcpListener`]; tests use
/// [`crate::testing::MockListener`].
pub trait Listener: Send + 'static {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Wait for the next inbound stream and its remote address.
    fn accept(
        &mut self,
    ) -> impl Future<Output = Result<(Self::Stream, SocketAddr), AcceptError>> + Send;

    /// Address the listener is bound to.
    fn local_addr(&self) -> io::Result<SocketAddr>;

    /// Stop accepting. Called once when the accept loop ends.
    fn close(&mut self) {}
}

impl Listener for TcpListener {
    type Stream = TcpStream;

    async fn accept(&mut self) -> Result<(TcpStream, SocketAddr), AcceptError> {
        let (stream, addr) = TcpListener::accept(self)
            .await
            .map_err(AcceptError::classify)?;
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(%addr, error = %e, "failed to set TCP_NODELAY");
        }
        Ok((stream, addr))
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        TcpListener::local_addr(self)
    }
}
