//! Socket tuning configuration
//!
//! `SocketConfig` collects the generic and rsocket-specific knobs in one
//! serde-loadable struct. Unset fields leave the provider default alone.

use serde::{Deserialize, Serialize};

use super::sys::SocketRef;
use super::Result;

/// Options applied to a socket before it binds or connects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SocketConfig {
    /// SO_REUSEADDR.
    pub reuse_addr: Option<bool>,

    /// TCP_NODELAY.
    pub nodelay: Option<bool>,

    /// SO_SNDBUF in bytes.
    pub send_buffer: Option<usize>,

    /// SO_RCVBUF in bytes.
    pub recv_buffer: Option<usize>,

    /// RDMA send queue depth (RDMA_SQSIZE).
    pub sq_size: Option<u32>,

    /// RDMA receive queue depth (RDMA_RQSIZE).
    pub rq_size: Option<u32>,

    /// RDMA inline data threshold in bytes (RDMA_INLINE).
    pub inline_size: Option<u32>,
}

impl SocketConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reuse_addr(mut self, on: bool) -> Self {
        self.reuse_addr = Some(on);
        self
    }

    pub fn nodelay(mut self, on: bool) -> Self {
        self.nodelay = Some(on);
        self
    }

    pub fn send_buffer(mut self, bytes: usize) -> Self {
        self.send_buffer = Some(bytes);
        self
    }

    pub fn recv_buffer(mut self, bytes: usize) -> Self {
        self.recv_buffer = Some(bytes);
        self
    }

    pub fn sq_size(mut self, entries: u32) -> Self {
        self.sq_size = Some(entries);
        self
    }

    pub fn rq_size(mut self, entries: u32) -> Self {
        self.rq_size = Some(entries);
        self
    }

    pub fn inline_size(mut self, bytes: u32) -> Self {
        self.inline_size = Some(bytes);
        self
    }

    /// True when no knob is set.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply every set knob, stopping at the first failure.
    pub fn apply(&self, sock: SocketRef<'_>) -> Result<()> {
        if let Some(on) = self.reuse_addr {
            sock.set_reuse_addr(on)?;
        }
        if let Some(on) = self.nodelay {
            sock.set_nodelay(on)?;
        }
        if let Some(bytes) = self.send_buffer {
            sock.set_send_buffer(bytes)?;
        }
        if let Some(bytes) = self.recv_buffer {
            sock.set_recv_buffer(bytes)?;
        }
        if let Some(entries) = self.sq_size {
            sock.set_rdma_sq_size(entries)?;
        }
        if let Some(entries) = self.rq_size {
            sock.set_rdma_rq_size(entries)?;
        }
        if let Some(bytes) = self.inline_size {
            sock.set_rdma_inline(bytes)?;
        }
        Ok(())
    }
}
