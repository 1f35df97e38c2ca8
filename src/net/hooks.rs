//! Pre-bind and pre-connect socket hooks
//!
//! A hook runs against a freshly allocated descriptor before the listener
//! binds or the connector connects. Hooks run in insertion order; the first
//! failure stops the sequence, closes the descriptor and is reported as
//! [`Error::PartialSetupFailure`].

use super::addr::SockAddr;
use super::config::SocketConfig;
use super::provider::Provider;
use super::sys::{self, SocketRef};
use super::{Error, Result};
use crate::net::provider::Descriptor;

/// A boxed setup step.
pub type SocketHook = Box<dyn Fn(SocketRef<'_>) -> Result<()> + Send + Sync>;

/// Run every hook against `fd`, or release `fd` and report the failure.
pub(crate) fn apply_or_close(
    provider: &dyn Provider,
    fd: Descriptor,
    hooks: &[SocketHook],
) -> Result<()> {
    let sock = SocketRef::new(provider, fd);
    for (index, hook) in hooks.iter().enumerate() {
        if let Err(e) = hook(sock) {
            tracing::debug!(%fd, index, error = %e, "socket hook failed");
            close_quietly(provider, fd);
            return Err(Error::PartialSetupFailure(Box::new(e)));
        }
    }
    Ok(())
}

/// Close a descriptor on an error path, logging instead of failing.
pub(crate) fn close_quietly(provider: &dyn Provider, fd: Descriptor) {
    if let Err(e) = sys::close(provider, fd) {
        tracing::warn!(%fd, error = %e, "failed to release descriptor");
    }
}

/// Bind the socket to a local address before connecting.
pub fn local_addr(addr: SockAddr) -> impl Fn(SocketRef<'_>) -> Result<()> + Send + Sync + 'static {
    move |sock| sock.bind(&addr)
}

pub fn reuse_addr(on: bool) -> impl Fn(SocketRef<'_>) -> Result<()> + Send + Sync + 'static {
    move |sock| sock.set_reuse_addr(on)
}

pub fn nodelay(on: bool) -> impl Fn(SocketRef<'_>) -> Result<()> + Send + Sync + 'static {
    move |sock| sock.set_nodelay(on)
}

pub fn send_buffer(bytes: usize) -> impl Fn(SocketRef<'_>) -> Result<()> + Send + Sync + 'static {
    move |sock| sock.set_send_buffer(bytes)
}

pub fn recv_buffer(bytes: usize) -> impl Fn(SocketRef<'_>) -> Result<()> + Send + Sync + 'static {
    move |sock| sock.set_recv_buffer(bytes)
}

/// Apply every knob set in `config`.
pub fn config(config: SocketConfig) -> impl Fn(SocketRef<'_>) -> Result<()> + Send + Sync + 'static {
    move |sock| config.apply(sock)
}
