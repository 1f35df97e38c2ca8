//! The native socket provider boundary
//!
//! A [`Provider`] exposes the provider verbs with their raw argument shapes.
//! Every method reports failure by returning a negative value whose
//! magnitude is the errno; nothing is read from a thread-local side channel.
//! The typed wrappers in [`crate::net::sys`] are the only intended callers.

mod kernel;
#[cfg(feature = "rdma")]
mod rsocket;

use std::fmt;
use std::io::{self, IoSlice};
use std::os::fd::RawFd;
use std::sync::Arc;

use libc::{c_int, socklen_t};

use super::addr::RawAddr;

pub use kernel::KernelProvider;
#[cfg(feature = "rdma")]
pub use rsocket::RsocketProvider;

/// Handle of one open socket inside a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Descriptor(RawFd);

impl Descriptor {
    pub const fn from_raw(fd: RawFd) -> Self {
        Descriptor(fd)
    }

    pub const fn raw(self) -> RawFd {
        self.0
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Raw socket verbs of an rsocket-style provider.
pub trait Provider: Send + Sync {
    /// Short name used in log lines.
    fn name(&self) -> &'static str;

    fn socket(&self, domain: c_int, ty: c_int, protocol: c_int) -> c_int;

    fn bind(&self, fd: c_int, addr: &RawAddr) -> c_int;

    fn listen(&self, fd: c_int, backlog: c_int) -> c_int;

    /// On success `addr` holds the peer address and its length.
    fn accept(&self, fd: c_int, addr: &mut RawAddr) -> c_int;

    fn connect(&self, fd: c_int, addr: &RawAddr) -> c_int;

    fn read(&self, fd: c_int, buf: &mut [u8]) -> isize;

    fn write(&self, fd: c_int, buf: &[u8]) -> isize;

    fn writev(&self, fd: c_int, bufs: &[IoSlice<'_>]) -> isize;

    fn send_to(&self, fd: c_int, buf: &[u8], flags: c_int, addr: &RawAddr) -> isize;

    fn recv_from(&self, fd: c_int, buf: &mut [u8], flags: c_int, addr: &mut RawAddr) -> isize;

    fn close(&self, fd: c_int) -> c_int;

    fn setsockopt(&self, fd: c_int, level: c_int, name: c_int, value: &[u8]) -> c_int;

    /// `len` holds the buffer size on entry and the option size on return.
    fn getsockopt(
        &self,
        fd: c_int,
        level: c_int,
        name: c_int,
        value: &mut [u8],
        len: &mut socklen_t,
    ) -> c_int;

    fn getpeername(&self, fd: c_int, addr: &mut RawAddr) -> c_int;

    fn getsockname(&self, fd: c_int, addr: &mut RawAddr) -> c_int;

    fn poll(&self, fds: &mut [libc::pollfd], timeout_ms: c_int) -> c_int;

    fn select(
        &self,
        nfds: c_int,
        read: Option<&mut libc::fd_set>,
        write: Option<&mut libc::fd_set>,
        except: Option<&mut libc::fd_set>,
        timeout: Option<&mut libc::timeval>,
    ) -> c_int;
}

/// The provider selected at build time: rsocket with the `rdma` feature,
/// host kernel sockets otherwise.
pub fn default_provider() -> Arc<dyn Provider> {
    #[cfg(feature = "rdma")]
    {
        Arc::new(RsocketProvider)
    }

    #[cfg(not(feature = "rdma"))]
    {
        Arc::new(KernelProvider)
    }
}

// Native calls that fail with `-1` and set errno are folded into `-errno`.
fn neg_errno() -> c_int {
    -io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO)
}

fn cvt(rc: c_int) -> c_int {
    if rc < 0 {
        neg_errno()
    } else {
        rc
    }
}

fn cvt_size(rc: isize) -> isize {
    if rc < 0 {
        neg_errno() as isize
    } else {
        rc
    }
}
