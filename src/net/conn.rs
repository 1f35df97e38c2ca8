//! Active (connected) sockets
//!
//! [`Connector`] builds a [`Connection`]: it allocates a stream descriptor,
//! runs the configured hooks, then connects. [`dial`] is the one-shot form
//! with default settings.

use std::fmt;
use std::io::{self, IoSlice};
use std::sync::Arc;
use std::time::{Duration, Instant};

use socket2::Type;

use super::hooks::{self, SocketHook};
use super::provider::{default_provider, Descriptor, Provider};
use super::sys::{self, SocketRef};
use super::{Error, Result, ResolveIter, SockAddr, SocketConfig};

/// A connected stream socket.
///
/// Dropping a `Connection` that still owns its descriptor closes it.
pub struct Connection {
    provider: Arc<dyn Provider>,
    fd: Option<Descriptor>,
    local_addr: Option<SockAddr>,
    peer_addr: SockAddr,
}

impl Connection {
    pub(crate) fn from_parts(
        provider: Arc<dyn Provider>,
        fd: Descriptor,
        local_addr: Option<SockAddr>,
        peer_addr: SockAddr,
    ) -> Self {
        Connection {
            provider,
            fd: Some(fd),
            local_addr,
            peer_addr,
        }
    }

    fn fd(&self) -> Result<Descriptor> {
        self.fd.ok_or(Error::Closed)
    }

    /// Read into `buf`. `Ok(0)` means end of stream, or an empty `buf`.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let fd = self.fd()?;
        sys::read(self.provider.as_ref(), fd, buf)
    }

    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let fd = self.fd()?;
        sys::write(self.provider.as_ref(), fd, buf)
    }

    /// Gather-write `bufs` in one call.
    pub fn write_vectored(&mut self, bufs: &[IoSlice<'_>]) -> Result<usize> {
        let fd = self.fd()?;
        sys::write_vectored(self.provider.as_ref(), fd, bufs)
    }

    /// Read with timeout, returns number of bytes read or error
    ///
    /// Returns:
    /// - Ok(n) where n > 0: Successfully read n bytes
    /// - Ok(0): EOF reached
    /// - Err(Error::Timeout): nothing arrived before `timeout`
    /// - Err(other): Other I/O error
    pub fn read_timeout(&mut self, buf: &mut [u8], timeout: Option<Duration>) -> Result<usize> {
        if timeout.is_some() && !self.wait_readable(timeout)? {
            return Err(Error::Timeout);
        }

        self.read(buf).map_err(|e| match e.raw_os_error() {
            Some(libc::EAGAIN) | Some(libc::ETIMEDOUT) => Error::Timeout,
            _ => e,
        })
    }

    /// Wait until data can be read. Returns false on timeout.
    pub fn wait_readable(&self, timeout: Option<Duration>) -> Result<bool> {
        self.socket()?.wait(libc::POLLIN, timeout)
    }

    /// Wait until a write would not block. Returns false on timeout.
    pub fn wait_writable(&self, timeout: Option<Duration>) -> Result<bool> {
        self.socket()?.wait(libc::POLLOUT, timeout)
    }

    /// The local address the connector bound, if it was told to bind one.
    pub fn local_addr(&self) -> Option<SockAddr> {
        self.local_addr
    }

    /// Ask the provider for the local address (`getsockname`).
    pub fn query_local_addr(&self) -> Result<SockAddr> {
        self.socket()?.local_addr()
    }

    pub fn peer_addr(&self) -> SockAddr {
        self.peer_addr
    }

    /// Accepted and ignored: deadlines are not enforced.
    pub fn set_deadline(&self, _deadline: Option<Instant>) -> Result<()> {
        Ok(())
    }

    /// Accepted and ignored.
    pub fn set_read_deadline(&self, _deadline: Option<Instant>) -> Result<()> {
        Ok(())
    }

    /// Accepted and ignored.
    pub fn set_write_deadline(&self, _deadline: Option<Instant>) -> Result<()> {
        Ok(())
    }

    /// Report a pending asynchronous error (`SO_ERROR`).
    pub fn take_error(&self) -> Result<()> {
        self.socket()?.take_error()
    }

    /// Borrow the descriptor for option access.
    pub fn socket(&self) -> Result<SocketRef<'_>> {
        Ok(SocketRef::new(self.provider.as_ref(), self.fd()?))
    }

    /// The owned descriptor, or `None` once closed.
    pub fn descriptor(&self) -> Option<Descriptor> {
        self.fd
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    /// Release the descriptor. A second call fails with [`Error::Closed`]
    /// and never reaches the provider.
    pub fn close(&mut self) -> Result<()> {
        let fd = self.fd.take().ok_or(Error::Closed)?;
        tracing::debug!(%fd, peer = %self.peer_addr, "closing connection");
        sys::close(self.provider.as_ref(), fd)
    }

    /// Give up ownership of the descriptor without closing it.
    pub fn into_raw(mut self) -> Option<Descriptor> {
        self.fd.take()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(fd) = self.fd.take() {
            hooks::close_quietly(self.provider.as_ref(), fd);
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("provider", &self.provider.name())
            .field("fd", &self.fd)
            .field("local_addr", &self.local_addr)
            .field("peer_addr", &self.peer_addr)
            .finish()
    }
}

impl io::Read for Connection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Connection::read(self, buf).map_err(io::Error::from)
    }
}

impl io::Write for Connection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Connection::write(self, buf).map_err(io::Error::from)
    }

    fn write_vectored(&mut self, bufs: &[IoSlice<'_>]) -> io::Result<usize> {
        Connection::write_vectored(self, bufs).map_err(io::Error::from)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Connection builder
pub struct Connector {
    provider: Arc<dyn Provider>,
    hooks: Vec<SocketHook>,
    local_addr: Option<SockAddr>,
}

impl Default for Connector {
    fn default() -> Self {
        Self::new()
    }
}

impl Connector {
    /// Create a connector over the default provider with no hooks
    pub fn new() -> Self {
        Self::with_provider(default_provider())
    }

    pub fn with_provider(provider: Arc<dyn Provider>) -> Self {
        Connector {
            provider,
            hooks: Vec::new(),
            local_addr: None,
        }
    }

    /// Add a hook that runs after the descriptor is allocated and before
    /// connect. Hooks run in the order they were added.
    pub fn hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(SocketRef<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.hooks.push(Box::new(hook));
        self
    }

    /// Bind to `addr` before connecting. The connection reports it as its
    /// local address, with the assigned port filled in when `addr` asks for
    /// port 0.
    pub fn local_addr(mut self, addr: SockAddr) -> Self {
        self.local_addr = Some(addr);
        self.hook(hooks::local_addr(addr))
    }

    /// Set TCP_NODELAY before connecting
    pub fn nodelay(self, on: bool) -> Self {
        self.hook(hooks::nodelay(on))
    }

    /// Apply `config` before connecting
    pub fn config(self, config: SocketConfig) -> Self {
        if config.is_empty() {
            return self;
        }
        self.hook(hooks::config(config))
    }

    /// Connect to an address
    pub fn connect(&self, addr: &SockAddr) -> Result<Connection> {
        let provider = self.provider.as_ref();
        let fd = sys::socket(provider, addr.domain(), Type::STREAM, None)?;
        hooks::apply_or_close(provider, fd, &self.hooks)?;

        if let Err(e) = sys::connect(provider, fd, addr) {
            tracing::debug!(%fd, peer = %addr, error = %e, "connect failed");
            hooks::close_quietly(provider, fd);
            return Err(e);
        }

        let local_addr = match self.local_addr {
            // Learn the port the provider picked.
            Some(local) if local.port() == 0 => match sys::local_addr(provider, fd) {
                Ok(bound) => Some(bound),
                Err(e) => {
                    hooks::close_quietly(provider, fd);
                    return Err(e);
                }
            },
            other => other,
        };

        tracing::debug!(%fd, peer = %addr, provider = provider.name(), "connected");
        Ok(Connection::from_parts(
            Arc::clone(&self.provider),
            fd,
            local_addr,
            *addr,
        ))
    }

    /// Connect to an address string (with name resolution)
    ///
    /// Every resolved address is tried in order; if all fail the first
    /// error is returned.
    pub fn connect_addr(&self, addr: &str, default_port: Option<&str>) -> Result<Connection> {
        let mut iter = ResolveIter::resolve(addr, default_port)?;

        let first_addr = iter
            .next()
            .ok_or_else(|| Error::ResolutionFailed("No addresses resolved".to_string()))?;

        match self.connect(&first_addr) {
            Ok(conn) => Ok(conn),
            Err(first_err) => {
                for addr in iter {
                    if let Ok(conn) = self.connect(&addr) {
                        return Ok(conn);
                    }
                }
                Err(first_err)
            }
        }
    }
}

impl fmt::Debug for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connector")
            .field("provider", &self.provider.name())
            .field("hooks", &self.hooks.len())
            .field("local_addr", &self.local_addr)
            .finish()
    }
}

/// Resolve `addr` and connect with default settings.
///
/// ```no_run
/// use std::io::Write;
///
/// let mut conn = rsocket::net::dial("10.0.0.2:7471")?;
/// conn.write_all(b"ping")?;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn dial(addr: &str) -> Result<Connection> {
    Connector::new().connect_addr(addr, None)
}

/// Check if an error means the peer or the path to it is gone
///
/// These are expected in normal stream operation and callers usually
/// treat them like end of stream.
pub fn is_disconnect(err: &Error) -> bool {
    if let Error::Io(e) = err {
        if matches!(
            e.kind(),
            io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::BrokenPipe
                | io::ErrorKind::NotConnected
        ) {
            return true;
        }
    }
    matches!(
        err.raw_os_error(),
        Some(libc::ECONNRESET)
            | Some(libc::ENOTCONN)
            | Some(libc::EPIPE)
            | Some(libc::ETIMEDOUT)
            | Some(libc::ENETDOWN)
            | Some(libc::ENETUNREACH)
            | Some(libc::ENETRESET)
            | Some(libc::ECONNABORTED)
            | Some(libc::EHOSTUNREACH)
            | Some(libc::EHOSTDOWN)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::KernelProvider;

    #[test]
    fn test_is_disconnect() {
        let reset = Error::NativeCallFailed {
            call: "read",
            code: libc::ECONNRESET,
        };
        assert!(is_disconnect(&reset));

        let pipe = Error::Io(io::Error::new(io::ErrorKind::BrokenPipe, "gone"));
        assert!(is_disconnect(&pipe));

        let refused = Error::NativeCallFailed {
            call: "connect",
            code: libc::ECONNREFUSED,
        };
        assert!(!is_disconnect(&refused));
        assert!(!is_disconnect(&Error::Closed));
    }

    #[test]
    fn test_connect_refused_on_loopback() {
        // Grab a free port, then release it so nothing is listening there.
        let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = probe.local_addr().unwrap().port();
        drop(probe);

        let err = Connector::with_provider(Arc::new(KernelProvider))
            .connect(&SockAddr::new_v4([127, 0, 0, 1].into(), port))
            .unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::ECONNREFUSED));
    }

    #[test]
    fn test_connector_debug() {
        let connector = Connector::new().nodelay(true).config(SocketConfig::new());
        let text = format!("{:?}", connector);
        assert!(text.contains("hooks: 1"));
    }
}
