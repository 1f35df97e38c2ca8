//! librdmacm rsocket provider
//!
//! Thin bindings to `<rdma/rsocket.h>`. librdmacm reports failure as `-1`
//! with errno set, which is folded into `-errno` before it leaves here.

use std::io::IoSlice;
use std::ptr;

use libc::{c_int, c_void, size_t, sockaddr, socklen_t, ssize_t};

use super::{cvt, cvt_size, Provider};
use crate::net::addr::RawAddr;

#[link(name = "rdmacm")]
extern "C" {
    fn rsocket(domain: c_int, ty: c_int, protocol: c_int) -> c_int;
    fn rbind(socket: c_int, addr: *const sockaddr, addrlen: socklen_t) -> c_int;
    fn rlisten(socket: c_int, backlog: c_int) -> c_int;
    fn raccept(socket: c_int, addr: *mut sockaddr, addrlen: *mut socklen_t) -> c_int;
    fn rconnect(socket: c_int, addr: *const sockaddr, addrlen: socklen_t) -> c_int;
    fn rread(socket: c_int, buf: *mut c_void, count: size_t) -> ssize_t;
    fn rwrite(socket: c_int, buf: *const c_void, count: size_t) -> ssize_t;
    fn rwritev(socket: c_int, iov: *const libc::iovec, iovcnt: c_int) -> ssize_t;
    fn rsendto(
        socket: c_int,
        buf: *const c_void,
        len: size_t,
        flags: c_int,
        dest_addr: *const sockaddr,
        addrlen: socklen_t,
    ) -> ssize_t;
    fn rrecvfrom(
        socket: c_int,
        buf: *mut c_void,
        len: size_t,
        flags: c_int,
        src_addr: *mut sockaddr,
        addrlen: *mut socklen_t,
    ) -> ssize_t;
    fn rclose(socket: c_int) -> c_int;
    fn rsetsockopt(
        socket: c_int,
        level: c_int,
        optname: c_int,
        optval: *const c_void,
        optlen: socklen_t,
    ) -> c_int;
    fn rgetsockopt(
        socket: c_int,
        level: c_int,
        optname: c_int,
        optval: *mut c_void,
        optlen: *mut socklen_t,
    ) -> c_int;
    fn rgetpeername(socket: c_int, addr: *mut sockaddr, addrlen: *mut socklen_t) -> c_int;
    fn rgetsockname(socket: c_int, addr: *mut sockaddr, addrlen: *mut socklen_t) -> c_int;
    fn rpoll(fds: *mut libc::pollfd, nfds: libc::nfds_t, timeout: c_int) -> c_int;
    fn rselect(
        nfds: c_int,
        readfds: *mut libc::fd_set,
        writefds: *mut libc::fd_set,
        exceptfds: *mut libc::fd_set,
        timeout: *mut libc::timeval,
    ) -> c_int;
}

/// Provider that drives the RDMA fabric through librdmacm's rsocket API.
#[derive(Debug, Default, Clone, Copy)]
pub struct RsocketProvider;

impl Provider for RsocketProvider {
    fn name(&self) -> &'static str {
        "rsocket"
    }

    fn socket(&self, domain: c_int, ty: c_int, protocol: c_int) -> c_int {
        // SAFETY: no pointers cross the boundary.
        cvt(unsafe { rsocket(domain, ty, protocol) })
    }

    fn bind(&self, fd: c_int, addr: &RawAddr) -> c_int {
        // SAFETY: addr points at len() initialized bytes.
        cvt(unsafe { rbind(fd, addr.as_ptr(), addr.len()) })
    }

    fn listen(&self, fd: c_int, backlog: c_int) -> c_int {
        // SAFETY: no pointers cross the boundary.
        cvt(unsafe { rlisten(fd, backlog) })
    }

    fn accept(&self, fd: c_int, addr: &mut RawAddr) -> c_int {
        let (ptr, len) = addr.out_ptrs();
        // SAFETY: the storage is sockaddr_storage sized and len says so.
        cvt(unsafe { raccept(fd, ptr, len) })
    }

    fn connect(&self, fd: c_int, addr: &RawAddr) -> c_int {
        // SAFETY: addr points at len() initialized bytes.
        cvt(unsafe { rconnect(fd, addr.as_ptr(), addr.len()) })
    }

    fn read(&self, fd: c_int, buf: &mut [u8]) -> isize {
        // SAFETY: buf is valid for buf.len() bytes of writes.
        cvt_size(unsafe { rread(fd, buf.as_mut_ptr().cast(), buf.len()) })
    }

    fn write(&self, fd: c_int, buf: &[u8]) -> isize {
        // SAFETY: buf is valid for buf.len() bytes of reads.
        cvt_size(unsafe { rwrite(fd, buf.as_ptr().cast(), buf.len()) })
    }

    fn writev(&self, fd: c_int, bufs: &[IoSlice<'_>]) -> isize {
        let count = bufs.len().min(c_int::MAX as usize) as c_int;
        // SAFETY: IoSlice is ABI compatible with iovec on unix.
        cvt_size(unsafe { rwritev(fd, bufs.as_ptr().cast::<libc::iovec>(), count) })
    }

    fn send_to(&self, fd: c_int, buf: &[u8], flags: c_int, addr: &RawAddr) -> isize {
        // SAFETY: buffer and address are valid for their stated lengths.
        cvt_size(unsafe {
            rsendto(
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
        cvt_size(unsafe { rrecvfrom(fd, buf.as_mut_ptr().cast(), buf.len(), flags, ptr, len) })
    }

    fn close(&self, fd: c_int) -> c_int {
        // SAFETY: no pointers cross the boundary.
        cvt(unsafe { rclose(fd) })
    }

    fn setsockopt(&self, fd: c_int, level: c_int, name: c_int, value: &[u8]) -> c_int {
        // SAFETY: value is valid for value.len() bytes.
        cvt(unsafe {
            rsetsockopt(
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
        cvt(unsafe { rgetsockopt(fd, level, name, value.as_mut_ptr().cast(), len) })
    }

    fn getpeername(&self, fd: c_int, addr: &mut RawAddr) -> c_int {
        let (ptr, len) = addr.out_ptrs();
        // SAFETY: the storage is sockaddr_storage sized and len says so.
        cvt(unsafe { rgetpeername(fd, ptr, len) })
    }

    fn getsockname(&self, fd: c_int, addr: &mut RawAddr) -> c_int {
        let (ptr, len) = addr.out_ptrs();
        // SAFETY: the storage is sockaddr_storage sized and len says so.
        cvt(unsafe { rgetsockname(fd, ptr, len) })
    }

    fn poll(&self, fds: &mut [libc::pollfd], timeout_ms: c_int) -> c_int {
        // SAFETY: fds is valid for fds.len() entries.
        cvt(unsafe { rpoll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms) })
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
        cvt(unsafe { rselect(nfds, read, write, except, timeout) })
    }
}
