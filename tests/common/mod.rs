//! In-memory provider shared by the integration tests
//!
//! Records every verb, counts opened/closed descriptors, stores options and
//! can be told to fail any verb with a chosen errno.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::io::IoSlice;
use std::sync::{Arc, Mutex, MutexGuard};

use libc::{c_int, socklen_t};
use rsocket::net::addr::{self, RawAddr};
use rsocket::net::{Provider, SockAddr};

/// Port handed out when a caller binds port 0.
pub const EPHEMERAL_PORT: u16 = 40000;

#[derive(Default)]
struct State {
    next_fd: c_int,
    open: HashSet<c_int>,
    opened: usize,
    closed: usize,
    calls: Vec<&'static str>,
    failures: HashMap<&'static str, c_int>,
    options: HashMap<(c_int, c_int, c_int), Vec<u8>>,
    so_error: c_int,
    bound: HashMap<c_int, SockAddr>,
    connected: HashMap<c_int, SockAddr>,
    accept_peer: Option<SockAddr>,
    accept_raw: Option<RawAddr>,
    inbox: HashMap<c_int, VecDeque<u8>>,
    written: HashMap<c_int, Vec<u8>>,
}

pub struct FakeProvider {
    state: Mutex<State>,
}

impl FakeProvider {
    pub fn new() -> Arc<FakeProvider> {
        Arc::new(FakeProvider {
            state: Mutex::new(State {
                next_fd: 100,
                ..State::default()
            }),
        })
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("fake provider state poisoned")
    }

    /// Make every later call to `verb` return `-errno`.
    pub fn fail(&self, verb: &'static str, errno: c_int) {
        self.state().failures.insert(verb, errno);
    }

    pub fn set_so_error(&self, errno: c_int) {
        self.state().so_error = errno;
    }

    pub fn set_accept_peer(&self, peer: SockAddr) {
        self.state().accept_peer = Some(peer);
    }

    /// Hand `raw` back from `accept` verbatim instead of an encoded peer.
    pub fn set_accept_raw(&self, raw: RawAddr) {
        self.state().accept_raw = Some(raw);
    }

    /// Queue bytes for `read`/`recv_from` on `fd`.
    pub fn push_read(&self, fd: c_int, bytes: &[u8]) {
        self.state()
            .inbox
            .entry(fd)
            .or_default()
            .extend(bytes.iter().copied());
    }

    pub fn written(&self, fd: c_int) -> Vec<u8> {
        self.state().written.get(&fd).cloned().unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.state().calls.clone()
    }

    pub fn count(&self, verb: &str) -> usize {
        self.state().calls.iter().filter(|c| **c == verb).count()
    }

    pub fn opened(&self) -> usize {
        self.state().opened
    }

    pub fn closed(&self) -> usize {
        self.state().closed
    }

    pub fn open_descriptors(&self) -> usize {
        self.state().open.len()
    }

    pub fn option(&self, fd: c_int, level: c_int, name: c_int) -> Option<Vec<u8>> {
        self.state().options.get(&(fd, level, name)).cloned()
    }

    pub fn connected_to(&self, fd: c_int) -> Option<SockAddr> {
        self.state().connected.get(&fd).copied()
    }

    /// Record the call and report the configured failure, if any.
    fn enter(&self, verb: &'static str) -> Result<MutexGuard<'_, State>, c_int> {
        let mut state = self.state();
        state.calls.push(verb);
        match state.failures.get(verb) {
            Some(errno) => Err(-errno),
            None => Ok(state),
        }
    }

    fn alloc(state: &mut State) -> c_int {
        let fd = state.next_fd;
        state.next_fd += 1;
        state.open.insert(fd);
        state.opened += 1;
        fd
    }

    fn read_into(state: &mut State, fd: c_int, buf: &mut [u8]) -> isize {
        let inbox = state.inbox.entry(fd).or_default();
        let n = buf.len().min(inbox.len());
        for (slot, byte) in buf.iter_mut().zip(inbox.drain(..n)) {
            *slot = byte;
        }
        n as isize
    }
}

macro_rules! enter {
    ($self:ident, $verb:literal) => {
        match $self.enter($verb) {
            Ok(state) => state,
            Err(rc) => return rc as _,
        }
    };
}

impl Provider for FakeProvider {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn socket(&self, _domain: c_int, _ty: c_int, _protocol: c_int) -> c_int {
        let mut state = enter!(self, "socket");
        Self::alloc(&mut state)
    }

    fn bind(&self, fd: c_int, raw: &RawAddr) -> c_int {
        let mut state = enter!(self, "bind");
        let mut local = match addr::decode(raw) {
            Ok(a) => a,
            Err(_) => return -libc::EINVAL,
        };
        if local.port() == 0 {
            local.set_port(EPHEMERAL_PORT);
        }
        state.bound.insert(fd, local);
        0
    }

    fn listen(&self, _fd: c_int, _backlog: c_int) -> c_int {
        let _state = enter!(self, "listen");
        0
    }

    fn accept(&self, fd: c_int, raw: &mut RawAddr) -> c_int {
        let mut state = enter!(self, "accept");
        if !state.open.contains(&fd) {
            return -libc::EBADF;
        }
        *raw = match state.accept_raw {
            Some(r) => r,
            None => {
                let peer = state
                    .accept_peer
                    .unwrap_or_else(|| SockAddr::new_v4([10, 0, 0, 2].into(), 5555));
                addr::encode(&peer)
            }
        };
        Self::alloc(&mut state)
    }

    fn connect(&self, fd: c_int, raw: &RawAddr) -> c_int {
        let mut state = enter!(self, "connect");
        match addr::decode(raw) {
            Ok(peer) => {
                state.connected.insert(fd, peer);
                0
            }
            Err(_) => -libc::EINVAL,
        }
    }

    fn read(&self, fd: c_int, buf: &mut [u8]) -> isize {
        let mut state = enter!(self, "read");
        Self::read_into(&mut state, fd, buf)
    }

    fn write(&self, fd: c_int, buf: &[u8]) -> isize {
        let mut state = enter!(self, "write");
        state.written.entry(fd).or_default().extend_from_slice(buf);
        buf.len() as isize
    }

    fn writev(&self, fd: c_int, bufs: &[IoSlice<'_>]) -> isize {
        let mut state = enter!(self, "writev");
        let out = state.written.entry(fd).or_default();
        for buf in bufs {
            out.extend_from_slice(buf);
        }
        bufs.iter().map(|b| b.len()).sum::<usize>() as isize
    }

    fn send_to(&self, fd: c_int, buf: &[u8], _flags: c_int, _raw: &RawAddr) -> isize {
        let mut state = enter!(self, "sendto");
        state.written.entry(fd).or_default().extend_from_slice(buf);
        buf.len() as isize
    }

    fn recv_from(&self, fd: c_int, buf: &mut [u8], _flags: c_int, raw: &mut RawAddr) -> isize {
        let mut state = enter!(self, "recvfrom");
        *raw = addr::encode(&SockAddr::new_v4([10, 0, 0, 9].into(), 6000));
        Self::read_into(&mut state, fd, buf)
    }

    fn close(&self, fd: c_int) -> c_int {
        let mut state = enter!(self, "close");
        if !state.open.remove(&fd) {
            return -libc::EBADF;
        }
        state.closed += 1;
        0
    }

    fn setsockopt(&self, fd: c_int, level: c_int, name: c_int, value: &[u8]) -> c_int {
        let mut state = enter!(self, "setsockopt");
        state.options.insert((fd, level, name), value.to_vec());
        0
    }

    fn getsockopt(
        &self,
        fd: c_int,
        level: c_int,
        name: c_int,
        value: &mut [u8],
        len: &mut socklen_t,
    ) -> c_int {
        let state = enter!(self, "getsockopt");
        let stored = if (level, name) == (libc::SOL_SOCKET, libc::SO_ERROR) {
            state.so_error.to_ne_bytes().to_vec()
        } else {
            match state.options.get(&(fd, level, name)) {
                Some(v) => v.clone(),
                None => return -libc::ENOPROTOOPT,
            }
        };
        let n = stored.len().min(value.len()).min(*len as usize);
        value[..n].copy_from_slice(&stored[..n]);
        *len = n as socklen_t;
        0
    }

    fn getpeername(&self, fd: c_int, raw: &mut RawAddr) -> c_int {
        let state = enter!(self, "getpeername");
        match state.connected.get(&fd) {
            Some(peer) => {
                *raw = addr::encode(peer);
                0
            }
            None => -libc::ENOTCONN,
        }
    }

    fn getsockname(&self, fd: c_int, raw: &mut RawAddr) -> c_int {
        let state = enter!(self, "getsockname");
        let local = state
            .bound
            .get(&fd)
            .copied()
            .unwrap_or_else(|| SockAddr::unspecified_v4(0));
        *raw = addr::encode(&local);
        0
    }

    fn poll(&self, fds: &mut [libc::pollfd], _timeout_ms: c_int) -> c_int {
        let state = enter!(self, "poll");
        let mut ready = 0;
        for pfd in fds.iter_mut() {
            let readable = state
                .inbox
                .get(&pfd.fd)
                .map_or(false, |inbox| !inbox.is_empty());
            pfd.revents = 0;
            if readable {
                pfd.revents |= pfd.events & libc::POLLIN;
            }
            pfd.revents |= pfd.events & libc::POLLOUT;
            if pfd.revents != 0 {
                ready += 1;
            }
        }
        ready
    }

    fn select(
        &self,
        _nfds: c_int,
        _read: Option<&mut libc::fd_set>,
        _write: Option<&mut libc::fd_set>,
        _except: Option<&mut libc::fd_set>,
        _timeout: Option<&mut libc::timeval>,
    ) -> c_int {
        let _state = enter!(self, "select");
        0
    }
}
