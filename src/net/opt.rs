//! Socket options
//!
//! Generic byte-buffer and `int` accessors over `setsockopt`/`getsockopt`,
//! plus helpers that pin down `(level, name)` for the options this crate
//! cares about, including the rsocket-specific `SOL_RDMA` knobs.

use std::mem;

use libc::c_int;

use super::provider::{Descriptor, Provider};
use super::sys::SocketRef;
use super::{Error, Result};

/// Option level of the rsocket-specific options (`<rdma/rsocket.h>`).
pub const SOL_RDMA: c_int = 0x10000;
/// Send queue depth.
pub const RDMA_SQSIZE: c_int = 0;
/// Receive queue depth.
pub const RDMA_RQSIZE: c_int = 1;
/// Inline data threshold in bytes.
pub const RDMA_INLINE: c_int = 2;
pub const RDMA_IOMAPSIZE: c_int = 3;
pub const RDMA_ROUTE: c_int = 4;

/// A `(level, name)` option address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SockOpt {
    pub level: c_int,
    pub name: c_int,
}

impl SockOpt {
    pub const REUSE_ADDR: SockOpt = SockOpt::new(libc::SOL_SOCKET, libc::SO_REUSEADDR);
    pub const ERROR: SockOpt = SockOpt::new(libc::SOL_SOCKET, libc::SO_ERROR);
    pub const SEND_BUFFER: SockOpt = SockOpt::new(libc::SOL_SOCKET, libc::SO_SNDBUF);
    pub const RECV_BUFFER: SockOpt = SockOpt::new(libc::SOL_SOCKET, libc::SO_RCVBUF);
    pub const TCP_NODELAY: SockOpt = SockOpt::new(libc::IPPROTO_TCP, libc::TCP_NODELAY);
    pub const RDMA_SQSIZE: SockOpt = SockOpt::new(SOL_RDMA, RDMA_SQSIZE);
    pub const RDMA_RQSIZE: SockOpt = SockOpt::new(SOL_RDMA, RDMA_RQSIZE);
    pub const RDMA_INLINE: SockOpt = SockOpt::new(SOL_RDMA, RDMA_INLINE);

    pub const fn new(level: c_int, name: c_int) -> Self {
        SockOpt { level, name }
    }
}

fn cvt(call: &'static str, rc: c_int) -> Result<()> {
    if rc < 0 {
        Err(Error::NativeCallFailed { call, code: -rc })
    } else {
        Ok(())
    }
}

fn to_c_int(what: &str, value: usize) -> Result<c_int> {
    c_int::try_from(value)
        .map_err(|_| Error::InvalidArgument(format!("{} of {} does not fit a C int", what, value)))
}

/// Set an option from raw bytes.
pub fn set_option(
    provider: &dyn Provider,
    fd: Descriptor,
    level: c_int,
    name: c_int,
    value: &[u8],
) -> Result<()> {
    cvt("setsockopt", provider.setsockopt(fd.raw(), level, name, value))
}

/// Read an option into `value`, returning how many bytes were written.
pub fn get_option(
    provider: &dyn Provider,
    fd: Descriptor,
    level: c_int,
    name: c_int,
    value: &mut [u8],
) -> Result<usize> {
    let mut len = value.len() as libc::socklen_t;
    cvt(
        "getsockopt",
        provider.getsockopt(fd.raw(), level, name, value, &mut len),
    )?;
    Ok(len as usize)
}

pub fn set_option_int(
    provider: &dyn Provider,
    fd: Descriptor,
    level: c_int,
    name: c_int,
    value: i32,
) -> Result<()> {
    set_option(provider, fd, level, name, &value.to_ne_bytes())
}

pub fn get_option_int(
    provider: &dyn Provider,
    fd: Descriptor,
    level: c_int,
    name: c_int,
) -> Result<i32> {
    let mut buf = [0u8; mem::size_of::<c_int>()];
    let len = get_option(provider, fd, level, name, &mut buf)?;
    if len != buf.len() {
        return Err(Error::InvalidArgument(format!(
            "option ({}, {}) returned {} bytes, expected an int",
            level, name, len
        )));
    }
    Ok(i32::from_ne_bytes(buf))
}

/// Read the pending asynchronous error (`SO_ERROR`).
///
/// A nonzero code comes back as [`Error::NativeCallFailed`]; zero is `Ok`.
pub fn check_socket_error(provider: &dyn Provider, fd: Descriptor) -> Result<()> {
    let opt = SockOpt::ERROR;
    match get_option_int(provider, fd, opt.level, opt.name)? {
        0 => Ok(()),
        code => Err(Error::NativeCallFailed {
            call: "SO_ERROR",
            code,
        }),
    }
}

impl SocketRef<'_> {
    pub fn set_option_int(&self, opt: SockOpt, value: i32) -> Result<()> {
        set_option_int(self.provider(), self.descriptor(), opt.level, opt.name, value)
    }

    pub fn option_int(&self, opt: SockOpt) -> Result<i32> {
        get_option_int(self.provider(), self.descriptor(), opt.level, opt.name)
    }

    fn set_flag(&self, opt: SockOpt, on: bool) -> Result<()> {
        self.set_option_int(opt, on as i32)
    }

    fn flag(&self, opt: SockOpt) -> Result<bool> {
        Ok(self.option_int(opt)? != 0)
    }

    /// Set SO_REUSEADDR
    pub fn set_reuse_addr(&self, on: bool) -> Result<()> {
        self.set_flag(SockOpt::REUSE_ADDR, on)
    }

    pub fn reuse_addr(&self) -> Result<bool> {
        self.flag(SockOpt::REUSE_ADDR)
    }

    /// Set TCP_NODELAY
    pub fn set_nodelay(&self, on: bool) -> Result<()> {
        self.set_flag(SockOpt::TCP_NODELAY, on)
    }

    pub fn nodelay(&self) -> Result<bool> {
        self.flag(SockOpt::TCP_NODELAY)
    }

    /// Set SO_SNDBUF
    pub fn set_send_buffer(&self, bytes: usize) -> Result<()> {
        self.set_option_int(SockOpt::SEND_BUFFER, to_c_int("send buffer", bytes)?)
    }

    pub fn send_buffer(&self) -> Result<i32> {
        self.option_int(SockOpt::SEND_BUFFER)
    }

    /// Set SO_RCVBUF
    pub fn set_recv_buffer(&self, bytes: usize) -> Result<()> {
        self.set_option_int(SockOpt::RECV_BUFFER, to_c_int("receive buffer", bytes)?)
    }

    pub fn recv_buffer(&self) -> Result<i32> {
        self.option_int(SockOpt::RECV_BUFFER)
    }

    /// RDMA send queue depth, in work requests
    pub fn set_rdma_sq_size(&self, entries: u32) -> Result<()> {
        self.set_option_int(SockOpt::RDMA_SQSIZE, to_c_int("send queue size", entries as usize)?)
    }

    /// RDMA receive queue depth, in work requests
    pub fn set_rdma_rq_size(&self, entries: u32) -> Result<()> {
        self.set_option_int(
            SockOpt::RDMA_RQSIZE,
            to_c_int("receive queue size", entries as usize)?,
        )
    }

    /// Payloads up to this many bytes ride inside the work request
    pub fn set_rdma_inline(&self, bytes: u32) -> Result<()> {
        self.set_option_int(SockOpt::RDMA_INLINE, to_c_int("inline size", bytes as usize)?)
    }

    /// See [`check_socket_error`].
    pub fn take_error(&self) -> Result<()> {
        check_socket_error(self.provider(), self.descriptor())
    }
}
