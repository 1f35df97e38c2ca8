//! Passive (listening) sockets

use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use socket2::Type;

use super::conn::Connection;
use super::hooks::{self, SocketHook};
use super::provider::{default_provider, Descriptor, Provider};
use super::sys::{self, SocketRef};
use super::{Error, Result, ResolveIter, SockAddr, SocketConfig};

/// Backlog passed to `listen` unless the builder overrides it.
pub const DEFAULT_BACKLOG: i32 = 128;

/// Listener builder
pub struct ListenerBuilder {
    provider: Arc<dyn Provider>,
    hooks: Vec<SocketHook>,
    backlog: i32,
}

impl Default for ListenerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ListenerBuilder {
    /// Create a new listener builder with default settings
    pub fn new() -> Self {
        Self::with_provider(default_provider())
    }

    pub fn with_provider(provider: Arc<dyn Provider>) -> Self {
        ListenerBuilder {
            provider,
            hooks: Vec::new(),
            backlog: DEFAULT_BACKLOG,
        }
    }

    /// Set listen backlog (default: 128)
    pub fn backlog(mut self, backlog: i32) -> Self {
        self.backlog = backlog;
        self
    }

    /// Add a hook that runs after the descriptor is allocated and before
    /// bind. Hooks run in the order they were added.
    pub fn hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(SocketRef<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.hooks.push(Box::new(hook));
        self
    }

    /// Set SO_REUSEADDR before bind
    pub fn reuse_addr(self, on: bool) -> Self {
        self.hook(hooks::reuse_addr(on))
    }

    /// Apply `config` before bind
    pub fn config(self, config: SocketConfig) -> Self {
        if config.is_empty() {
            return self;
        }
        self.hook(hooks::config(config))
    }

    /// Bind to an address and start listening
    pub fn bind(&self, addr: &SockAddr) -> Result<Listener> {
        let provider = self.provider.as_ref();
        let fd = sys::socket(provider, addr.domain(), Type::STREAM, None)?;
        hooks::apply_or_close(provider, fd, &self.hooks)?;

        let local_addr = match self.bind_and_listen(fd, addr) {
            Ok(local) => local,
            Err(e) => {
                tracing::debug!(%fd, addr = %addr, error = %e, "listener setup failed");
                hooks::close_quietly(provider, fd);
                return Err(e);
            }
        };

        tracing::info!(
            %fd,
            addr = %local_addr,
            backlog = self.backlog,
            provider = provider.name(),
            "listener created"
        );
        Ok(Listener {
            provider: Arc::clone(&self.provider),
            fd: Some(fd),
            local_addr,
        })
    }

    fn bind_and_listen(&self, fd: Descriptor, addr: &SockAddr) -> Result<SockAddr> {
        let provider = self.provider.as_ref();
        sys::bind(provider, fd, addr)?;
        sys::listen(provider, fd, self.backlog)?;
        if addr.port() == 0 {
            // Learn the port the provider picked.
            return sys::local_addr(provider, fd);
        }
        Ok(*addr)
    }

    /// Bind to `ip:port`
    pub fn bind_ip(&self, ip: IpAddr, port: u16) -> Result<Listener> {
        self.bind(&SockAddr::from_ip(ip, port))
    }

    /// Bind to an address string (with name resolution)
    pub fn bind_addr(&self, addr: &str, default_port: Option<&str>) -> Result<Listener> {
        let resolved = ResolveIter::resolve_first(addr, default_port)?;
        self.bind(&resolved)
    }
}

impl fmt::Debug for ListenerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerBuilder")
            .field("provider", &self.provider.name())
            .field("hooks", &self.hooks.len())
            .field("backlog", &self.backlog)
            .finish()
    }
}

/// A bound, listening stream socket.
///
/// Dropping a `Listener` that still owns its descriptor closes it.
pub struct Listener {
    provider: Arc<dyn Provider>,
    fd: Option<Descriptor>,
    local_addr: SockAddr,
}

impl Listener {
    /// Bind with default settings.
    pub fn bind(addr: &SockAddr) -> Result<Listener> {
        ListenerBuilder::new().bind(addr)
    }

    fn fd(&self) -> Result<Descriptor> {
        self.fd.ok_or(Error::Closed)
    }

    /// Block until a peer connects.
    ///
    /// The connection's local address is the listener's; its peer address
    /// comes from the accept.
    pub fn accept(&self) -> Result<Connection> {
        let fd = self.fd()?;
        let (conn_fd, peer) = sys::accept(self.provider.as_ref(), fd)?;
        tracing::debug!(listener = %fd, fd = %conn_fd, peer = %peer, "accepted connection");
        Ok(Connection::from_parts(
            Arc::clone(&self.provider),
            conn_fd,
            Some(self.local_addr),
            peer,
        ))
    }

    /// Iterate over accepted connections. The iterator never ends on its
    /// own; each item is the result of one `accept`.
    pub fn incoming(&self) -> Incoming<'_> {
        Incoming { listener: self }
    }

    pub fn local_addr(&self) -> SockAddr {
        self.local_addr
    }

    /// The owned descriptor, or `None` once closed.
    pub fn descriptor(&self) -> Option<Descriptor> {
        self.fd
    }

    /// Borrow the descriptor for option access.
    pub fn socket(&self) -> Result<SocketRef<'_>> {
        Ok(SocketRef::new(self.provider.as_ref(), self.fd()?))
    }

    /// Stop listening. A second call fails with [`Error::Closed`].
    pub fn close(&mut self) -> Result<()> {
        let fd = self.fd.take().ok_or(Error::Closed)?;
        tracing::debug!(%fd, addr = %self.local_addr, "closing listener");
        sys::close(self.provider.as_ref(), fd)
    }

    /// Give up ownership of the descriptor without closing it.
    pub fn into_raw(mut self) -> Option<Descriptor> {
        self.fd.take()
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        if let Some(fd) = self.fd.take() {
            hooks::close_quietly(self.provider.as_ref(), fd);
        }
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("provider", &self.provider.name())
            .field("fd", &self.fd)
            .field("local_addr", &self.local_addr)
            .finish()
    }
}

/// Iterator returned by [`Listener::incoming`].
#[derive(Debug)]
pub struct Incoming<'a> {
    listener: &'a Listener,
}

impl Iterator for Incoming<'_> {
    type Item = Result<Connection>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.listener.accept())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::KernelProvider;

    fn kernel_builder() -> ListenerBuilder {
        ListenerBuilder::with_provider(Arc::new(KernelProvider))
    }

    #[test]
    fn test_listener_bind_ephemeral() {
        let listener = kernel_builder().bind_addr("127.0.0.1:0", None).unwrap();

        let addr = listener.local_addr();
        assert!(addr.is_ipv4());
        assert!(addr.port() > 0);
    }

    #[test]
    fn test_listener_reuse_addr_hook() {
        let listener = kernel_builder()
            .reuse_addr(true)
            .bind_ip(IpAddr::from([127, 0, 0, 1]), 0)
            .unwrap();
        assert!(listener.socket().unwrap().reuse_addr().unwrap());
    }

    #[test]
    fn test_listener_close_twice() {
        let mut listener = kernel_builder().bind_addr("127.0.0.1:0", None).unwrap();
        listener.close().unwrap();
        assert!(listener.close().unwrap_err().is_closed());
        assert!(listener.accept().unwrap_err().is_closed());
        assert!(listener.descriptor().is_none());
    }

    #[test]
    fn test_builder_defaults() {
        let builder = kernel_builder();
        assert_eq!(builder.backlog, DEFAULT_BACKLOG);
        assert_eq!(builder.backlog(16).backlog, 16);
    }
}
