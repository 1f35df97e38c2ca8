//! Typed wrappers over the provider verbs
//!
//! One function per verb. Each reads the error from the verb's return value
//! (`-errno`) and turns it into [`Error::NativeCallFailed`]. Zero-length
//! transfers complete locally with `Ok(0)` and never reach the provider.

use std::fmt;
use std::io::IoSlice;
use std::mem;
use std::time::Duration;

use libc::c_int;
use socket2::{Domain, Protocol, Type};

use super::addr::{self, RawAddr, SockAddr};
use super::provider::{Descriptor, Provider};
use super::{Error, Result};

fn cvt(call: &'static str, rc: c_int) -> Result<c_int> {
    if rc < 0 {
        Err(Error::NativeCallFailed { call, code: -rc })
    } else {
        Ok(rc)
    }
}

fn cvt_size(call: &'static str, rc: isize) -> Result<usize> {
    if rc < 0 {
        Err(Error::NativeCallFailed {
            call,
            code: (-rc) as i32,
        })
    } else {
        Ok(rc as usize)
    }
}

/// Poll timeout in milliseconds; `None` blocks forever.
pub(crate) fn timeout_ms(timeout: Option<Duration>) -> c_int {
    match timeout {
        None => -1,
        // Round up: a nonzero wait must not become a zero timeout.
        Some(t) => ((t.as_nanos() + 999_999) / 1_000_000).min(c_int::MAX as u128) as c_int,
    }
}

/// Create a socket. Only IPv4 and IPv6 domains are accepted.
pub fn socket(
    provider: &dyn Provider,
    domain: Domain,
    ty: Type,
    protocol: Option<Protocol>,
) -> Result<Descriptor> {
    if domain != Domain::IPV4 && domain != Domain::IPV6 {
        return Err(Error::UnsupportedFamily(format!("{:?}", domain)));
    }
    let protocol = protocol.map_or(0, c_int::from);
    let fd = cvt(
        "socket",
        provider.socket(c_int::from(domain), c_int::from(ty), protocol),
    )?;
    Ok(Descriptor::from_raw(fd))
}

pub fn bind(provider: &dyn Provider, fd: Descriptor, addr: &SockAddr) -> Result<()> {
    let raw = addr::encode(addr);
    cvt("bind", provider.bind(fd.raw(), &raw)).map(drop)
}

pub fn listen(provider: &dyn Provider, fd: Descriptor, backlog: i32) -> Result<()> {
    cvt("listen", provider.listen(fd.raw(), backlog)).map(drop)
}

/// Accept one pending connection, returning its descriptor and peer address.
pub fn accept(provider: &dyn Provider, fd: Descriptor) -> Result<(Descriptor, SockAddr)> {
    let mut raw = RawAddr::new();
    let nfd = cvt("accept", provider.accept(fd.raw(), &mut raw))?;
    let nfd = Descriptor::from_raw(nfd);
    match addr::decode(&raw) {
        Ok(peer) => Ok((nfd, peer)),
        Err(e) => {
            // The peer descriptor has no owner yet, so release it here.
            super::hooks::close_quietly(provider, nfd);
            Err(e)
        }
    }
}

pub fn connect(provider: &dyn Provider, fd: Descriptor, addr: &SockAddr) -> Result<()> {
    let raw = addr::encode(addr);
    cvt("connect", provider.connect(fd.raw(), &raw)).map(drop)
}

pub fn read(provider: &dyn Provider, fd: Descriptor, buf: &mut [u8]) -> Result<usize> {
    if buf.is_empty() {
        return Ok(0);
    }
    cvt_size("read", provider.read(fd.raw(), buf))
}

pub fn write(provider: &dyn Provider, fd: Descriptor, buf: &[u8]) -> Result<usize> {
    if buf.is_empty() {
        return Ok(0);
    }
    cvt_size("write", provider.write(fd.raw(), buf))
}

pub fn write_vectored(
    provider: &dyn Provider,
    fd: Descriptor,
    bufs: &[IoSlice<'_>],
) -> Result<usize> {
    if bufs.iter().all(|b| b.is_empty()) {
        return Ok(0);
    }
    cvt_size("writev", provider.writev(fd.raw(), bufs))
}

pub fn send_to(
    provider: &dyn Provider,
    fd: Descriptor,
    buf: &[u8],
    flags: i32,
    addr: &SockAddr,
) -> Result<usize> {
    if buf.is_empty() {
        return Ok(0);
    }
    let raw = addr::encode(addr);
    cvt_size("sendto", provider.send_to(fd.raw(), buf, flags, &raw))
}

/// Receive one datagram. The sender is `None` when the provider reports no
/// source address (connected sockets) or the buffer is empty.
pub fn recv_from(
    provider: &dyn Provider,
    fd: Descriptor,
    buf: &mut [u8],
    flags: i32,
) -> Result<(usize, Option<SockAddr>)> {
    if buf.is_empty() {
        return Ok((0, None));
    }
    let mut raw = RawAddr::new();
    let n = cvt_size("recvfrom", provider.recv_from(fd.raw(), buf, flags, &mut raw))?;
    if raw.is_empty() {
        return Ok((n, None));
    }
    Ok((n, Some(addr::decode(&raw)?)))
}

pub fn close(provider: &dyn Provider, fd: Descriptor) -> Result<()> {
    cvt("close", provider.close(fd.raw())).map(drop)
}

/// Address of the connected peer (`getpeername`).
pub fn peer_addr(provider: &dyn Provider, fd: Descriptor) -> Result<SockAddr> {
    let mut raw = RawAddr::new();
    cvt("getpeername", provider.getpeername(fd.raw(), &mut raw))?;
    addr::decode(&raw)
}

/// Locally bound address (`getsockname`).
pub fn local_addr(provider: &dyn Provider, fd: Descriptor) -> Result<SockAddr> {
    let mut raw = RawAddr::new();
    cvt("getsockname", provider.getsockname(fd.raw(), &mut raw))?;
    addr::decode(&raw)
}

/// Wait for readiness on a set of descriptors. Returns the ready count.
pub fn poll(
    provider: &dyn Provider,
    fds: &mut [libc::pollfd],
    timeout: Option<Duration>,
) -> Result<usize> {
    cvt("poll", provider.poll(fds, timeout_ms(timeout))).map(|n| n as usize)
}

/// `select(2)` over descriptor sets. `nfds` is derived from the sets.
pub fn select(
    provider: &dyn Provider,
    read: Option<&mut FdSet>,
    write: Option<&mut FdSet>,
    except: Option<&mut FdSet>,
    timeout: Option<Duration>,
) -> Result<usize> {
    let nfds = [read.as_deref(), write.as_deref(), except.as_deref()]
        .iter()
        .flatten()
        .map(|s| s.nfds)
        .max()
        .unwrap_or(0);
    let mut tv = timeout.map(|t| libc::timeval {
        tv_sec: t.as_secs().min(libc::time_t::MAX as u64) as libc::time_t,
        tv_usec: t.subsec_micros() as libc::suseconds_t,
    });
    let rc = provider.select(
        nfds,
        read.map(|s| &mut s.set),
        write.map(|s| &mut s.set),
        except.map(|s| &mut s.set),
        tv.as_mut(),
    );
    cvt("select", rc).map(|n| n as usize)
}

/// A descriptor set for [`select`].
#[derive(Clone, Copy)]
pub struct FdSet {
    set: libc::fd_set,
    nfds: c_int,
}

impl FdSet {
    pub fn new() -> Self {
        // SAFETY: fd_set is plain old data; FD_ZERO then puts it in the
        // canonical empty state.
        let mut set: libc::fd_set = unsafe { mem::zeroed() };
        unsafe { libc::FD_ZERO(&mut set) };
        FdSet { set, nfds: 0 }
    }

    /// Add a descriptor. Descriptors at or beyond `FD_SETSIZE` are rejected.
    pub fn insert(&mut self, fd: Descriptor) -> Result<()> {
        let raw = Self::check(fd)?;
        // SAFETY: raw is within FD_SETSIZE.
        unsafe { libc::FD_SET(raw, &mut self.set) };
        self.nfds = self.nfds.max(raw + 1);
        Ok(())
    }

    pub fn remove(&mut self, fd: Descriptor) {
        if let Ok(raw) = Self::check(fd) {
            // SAFETY: raw is within FD_SETSIZE.
            unsafe { libc::FD_CLR(raw, &mut self.set) };
        }
    }

    pub fn contains(&self, fd: Descriptor) -> bool {
        match Self::check(fd) {
            // SAFETY: raw is within FD_SETSIZE.
            Ok(raw) => unsafe { libc::FD_ISSET(raw, &self.set) },
            Err(_) => false,
        }
    }

    pub fn clear(&mut self) {
        // SAFETY: set is a valid fd_set.
        unsafe { libc::FD_ZERO(&mut self.set) };
        self.nfds = 0;
    }

    fn check(fd: Descriptor) -> Result<c_int> {
        let raw = fd.raw();
        if raw < 0 || raw as usize >= libc::FD_SETSIZE as usize {
            return Err(Error::InvalidArgument(format!(
                "descriptor {} outside FD_SETSIZE",
                raw
            )));
        }
        Ok(raw)
    }
}

impl Default for FdSet {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FdSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let members: Vec<c_int> = (0..self.nfds)
            .filter(|&fd| self.contains(Descriptor::from_raw(fd)))
            .collect();
        f.debug_set().entries(members).finish()
    }
}

/// A borrowed view of one open descriptor and the provider that owns it.
///
/// Hooks receive a `SocketRef`; listeners and connections hand one out
/// through `socket()`. Dropping it does nothing: it never closes.
#[derive(Clone, Copy)]
pub struct SocketRef<'a> {
    provider: &'a dyn Provider,
    fd: Descriptor,
}

impl<'a> SocketRef<'a> {
    pub fn new(provider: &'a dyn Provider, fd: Descriptor) -> Self {
        SocketRef { provider, fd }
    }

    pub fn provider(&self) -> &'a dyn Provider {
        self.provider
    }

    pub fn descriptor(&self) -> Descriptor {
        self.fd
    }

    pub fn bind(&self, addr: &SockAddr) -> Result<()> {
        bind(self.provider, self.fd, addr)
    }

    pub fn connect(&self, addr: &SockAddr) -> Result<()> {
        connect(self.provider, self.fd, addr)
    }

    pub fn local_addr(&self) -> Result<SockAddr> {
        local_addr(self.provider, self.fd)
    }

    pub fn peer_addr(&self) -> Result<SockAddr> {
        peer_addr(self.provider, self.fd)
    }

    /// Wait until the descriptor reports any of `events` (`POLLIN`, ...).
    /// Returns false on timeout.
    pub fn wait(&self, events: i16, timeout: Option<Duration>) -> Result<bool> {
        let mut pfd = [libc::pollfd {
            fd: self.fd.raw(),
            events,
            revents: 0,
        }];
        let ready = poll(self.provider, &mut pfd, timeout)?;
        Ok(ready > 0 && pfd[0].revents != 0)
    }
}

impl fmt::Debug for SocketRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketRef")
            .field("provider", &self.provider.name())
            .field("fd", &self.fd)
            .finish()
    }
}
