//! Datagram sockets
//!
//! A bound `SOCK_DGRAM` descriptor with addressed send/receive. After
//! [`DatagramSocket::connect`] the unaddressed `send`/`recv` pair can be
//! used as well.

use std::fmt;
use std::sync::Arc;

use socket2::Type;

use super::hooks::{self, SocketHook};
use super::provider::{default_provider, Descriptor, Provider};
use super::sys::{self, SocketRef};
use super::{Error, Result, SockAddr};

pub struct DatagramSocket {
    provider: Arc<dyn Provider>,
    fd: Option<Descriptor>,
    local_addr: SockAddr,
    peer_addr: Option<SockAddr>,
}

impl DatagramSocket {
    /// Bind on the default provider.
    pub fn bind(addr: &SockAddr) -> Result<DatagramSocket> {
        Self::bind_with(default_provider(), addr, &[])
    }

    /// Allocate, run `hooks`, then bind. Any failure releases the descriptor.
    pub fn bind_with(
        provider: Arc<dyn Provider>,
        addr: &SockAddr,
        hooks: &[SocketHook],
    ) -> Result<DatagramSocket> {
        let p = provider.as_ref();
        let fd = sys::socket(p, addr.domain(), Type::DGRAM, None)?;
        hooks::apply_or_close(p, fd, hooks)?;

        let bound = sys::bind(p, fd, addr).and_then(|()| {
            if addr.port() == 0 {
                sys::local_addr(p, fd)
            } else {
                Ok(*addr)
            }
        });
        let local_addr = match bound {
            Ok(local) => local,
            Err(e) => {
                hooks::close_quietly(p, fd);
                return Err(e);
            }
        };

        tracing::debug!(%fd, addr = %local_addr, provider = p.name(), "datagram socket bound");
        Ok(DatagramSocket {
            provider,
            fd: Some(fd),
            local_addr,
            peer_addr: None,
        })
    }

    fn fd(&self) -> Result<Descriptor> {
        self.fd.ok_or(Error::Closed)
    }

    pub fn send_to(&mut self, buf: &[u8], target: &SockAddr) -> Result<usize> {
        let fd = self.fd()?;
        sys::send_to(self.provider.as_ref(), fd, buf, 0, target)
    }

    /// Receive one datagram and its sender, when the provider reports one.
    pub fn recv_from(&mut self, buf: &mut [u8]) -> Result<(usize, Option<SockAddr>)> {
        let fd = self.fd()?;
        sys::recv_from(self.provider.as_ref(), fd, buf, 0)
    }

    /// Fix the default destination and filter incoming datagrams to `peer`.
    pub fn connect(&mut self, peer: &SockAddr) -> Result<()> {
        let fd = self.fd()?;
        sys::connect(self.provider.as_ref(), fd, peer)?;
        self.peer_addr = Some(*peer);
        Ok(())
    }

    pub fn send(&mut self, buf: &[u8]) -> Result<usize> {
        let fd = self.fd()?;
        sys::write(self.provider.as_ref(), fd, buf)
    }

    pub fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
        let fd = self.fd()?;
        sys::read(self.provider.as_ref(), fd, buf)
    }

    pub fn local_addr(&self) -> SockAddr {
        self.local_addr
    }

    pub fn peer_addr(&self) -> Option<SockAddr> {
        self.peer_addr
    }

    pub fn socket(&self) -> Result<SocketRef<'_>> {
        Ok(SocketRef::new(self.provider.as_ref(), self.fd()?))
    }

    pub fn descriptor(&self) -> Option<Descriptor> {
        self.fd
    }

    /// Release the descriptor. A second call fails with [`Error::Closed`].
    pub fn close(&mut self) -> Result<()> {
        let fd = self.fd.take().ok_or(Error::Closed)?;
        tracing::debug!(%fd, addr = %self.local_addr, "closing datagram socket");
        sys::close(self.provider.as_ref(), fd)
    }

    pub fn into_raw(mut self) -> Option<Descriptor> {
        self.fd.take()
    }
}

impl Drop for DatagramSocket {
    fn drop(&mut self) {
        if let Some(fd) = self.fd.take() {
            hooks::close_quietly(self.provider.as_ref(), fd);
        }
    }
}

impl fmt::Debug for DatagramSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatagramSocket")
            .field("provider", &self.provider.name())
            .field("fd", &self.fd)
            .field("local_addr", &self.local_addr)
            .field("peer_addr", &self.peer_addr)
            .finish()
    }
}
