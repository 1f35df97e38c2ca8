//! Host kernel sockets behind the provider interface
//!
//! rsocket mirrors the BSD socket calls one for one, so the kernel makes a
//! drop-in provider on machines without an RDMA fabric. Failures are folded
//! from `-1 + errno` into the `-errno` return the rest of the crate expects.

use std::io::IoSlice;
use std::ptr;

use libc::{c_int, socklen_t};

use super::{cvt, cvt_size, Provider};
use crate::net::addr::RawAddr;

/// Provider backed by the host kernel's TCP/UDP stack.
#[derive(Debug, Default, Clone, Copy)]
pub struct KernelProvider;

impl Provider for KernelProvider {
    fn name(&self) -> &'static str {
        "kernel"
    }

    fn socket(&self, domain: c_int, ty: c_int, protocol: c_int) -> c_int {
        // SAFETY: plain syscall, no pointers.
        cvt(unsafe { libc::socket(domain, ty | libc::SOCK_CLOEXEC, protocol) })
    }

    fn bind(&self, fd: c_int, addr: &RawAddr) -> c_int {
        // SAFETY: addr points at len() initialized bytes.
        cvt(unsafe { libc::bind(fd, addr.as_ptr(), addr.len()) })
    }

    fn listen(&self, fd: c_int, backlog: c_int) -> c_int {
        // SAFETY: plain syscall, no pointers.
        cvt(unsafe { libc::listen(fd, backlog) })
    }

    fn accept(&self, fd: c_int, addr: &mut RawAddr) -> c_int {
        let (ptr, len) = addr.out_ptrs();
        // SAFETY: the storage is sockaddr_storage sized and len says so.
        cvt(unsafe { libc::accept4(fd, ptr, len, libc::SOCK_CLOEXEC) })
    }

    fn connect(&self, fd: c_int, addr: &RawAddr) -> c_int {
        // SAFETY: addr points at len() initialized bytes.
        cvt(unsafe { libc::connect(fd, addr.as_ptr(), addr.len()) })
    }

    fn read(&self, fd: c_int, buf: &mut [u8]) -> isize {
        // SAFETY: buf is valid for buf.len() bytes of writes.
        cvt_size(unsafe { libc::read(fd, buf.as_mut_ptr().cast(), buf.len()) })
    }

    fn write(&self, fd: c_int, buf: &[u8]) -> isize {
        // SAFETY: buf is valid for buf.len() bytes of reads.
        cvt_size(unsafe { libc::write(fd, buf.as_ptr().cast(), buf.len()) })
    }

    fn writev(&self, fd: c_int, bufs: &[IoSlice<'_>]) -> isize {
        let count = bufs.len().min(c_int::MAX as usize) as c_int;
        // SAFETY: IoSlice is ABI compatible with iovec on unix.
        cvt_size(unsafe { libc::writev(fd, bufs.as_ptr().cast::<libc::iovec>(), count) })
    }

    fn send_to(&self, fd: c_int, buf: &[u8], flags: c_int, addr: &RawAddr) -> isize {
        // SAFETY: buffer and address are valid for their stated lengths.
        cvt_size(unsafe {
            libc::sendto(
                fd,
                buf.as_ptr().cast(),
                buf.len(),
                flags,
                addr.as_ptr(),
                addr.len(),
            )
        })
    }

    fn recv_from(&self, fd: c_int, buf: &mut [u8], flags: c_int, addr: &mut RawAddr) -> isize {
        let (ptr, len) = addr.out_ptrs();
        // SAFETY: buffer and address storage are valid for writes.
        cvt_size(unsafe {
            libc::recvfrom(fd, buf.as_mut_ptr().cast(), buf.len(), flags, ptr, len)
        })
    }

    fn close(&self, fd: c_int) -> c_int {
        // SAFETY: plain syscall, no pointers.
        cvt(unsafe { libc::close(fd) })
    }

    fn setsockopt(&self, fd: c_int, level: c_int, name: c_int, value: &[u8]) -> c_int {
        // SAFETY: value is valid for value.len() bytes.
        cvt(unsafe {
            libc::setsockopt(
                fd,
                level,
                name,
                value.as_ptr().cast(),
                value.len() as socklen_t,
            )
        })
    }

    fn getsockopt(
        &self,
        fd: c_int,
        level: c_int,
        name: c_int,
        value: &mut [u8],
        len: &mut socklen_t,
    ) -> c_int {
        *len = (*len).min(value.len() as socklen_t);
        // SAFETY: value is valid for *len bytes of writes.
        cvt(unsafe { libc::getsockopt(fd, level, name, value.as_mut_ptr().cast(), len) })
    }

    fn getpeername(&self, fd: c_int, addr: &mut RawAddr) -> c_int {
        let (ptr, len) = addr.out_ptrs();
        // SAFETY: the storage is sockaddr_storage sized and len says so.
        cvt(unsafe { libc::getpeername(fd, ptr, len) })
    }

    fn getsockname(&self, fd: c_int, addr: &mut RawAddr) -> c_int {
        let (ptr, len) = addr.out_ptrs();
        // SAFETY: the storage is sockaddr_storage sized and len says so.
        cvt(unsafe { libc::getsockname(fd, ptr, len) })
    }

    fn poll(&self, fds: &mut [libc::pollfd], timeout_ms: c_int) -> c_int {
        // SAFETY: fds is valid for fds.len() entries.
        cvt(unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms) })
    }

    fn select(
        &self,
        nfds: c_int,
        read: Option<&mut libc::fd_set>,
        write: Option<&mut libc::fd_set>,
        except: Option<&mut libc::fd_set>,
        timeout: Option<&mut libc::timeval>,
    ) -> c_int {
        let read = read.map_or(ptr::null_mut(), |s| s as *mut libc::fd_set);
        let write = write.map_or(ptr::null_mut(), |s| s as *mut libc::fd_set);
        let except = except.map_or(ptr::null_mut(), |s| s as *mut libc::fd_set);
        let timeout = timeout.map_or(ptr::null_mut(), |t| t as *mut libc::timeval);
        // SAFETY: every pointer is either null or a live exclusive borrow.
        cvt(unsafe { libc::select(nfds, read, write, except, timeout) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_bad_fd_returns_negative_errno() {
        assert_eq!(KernelProvider.close(-1), -libc::EBADF);
    }

    #[test]
    fn test_read_bad_fd_returns_negative_errno() {
        let mut buf = [0u8; 4];
        assert_eq!(KernelProvider.read(-1, &mut buf), -(libc::EBADF as isize));
    }
}
