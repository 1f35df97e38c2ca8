//! Socket facade over an RDMA socket provider
//!
//! This module provides idiomatic Rust interfaces for the rsocket family of
//! calls: address marshalling, socket options, the raw per-verb wrappers and
//! the listener/connection types built on them.

pub mod addr;
pub mod config;
pub mod conn;
pub mod datagram;
pub mod hooks;
pub mod listener;
pub mod opt;
pub mod provider;
pub mod resolver;
pub mod sys;

use std::io;

pub use addr::{RawAddr, SockAddr};
pub use config::SocketConfig;
pub use conn::{dial, is_disconnect, Connection, Connector};
pub use datagram::DatagramSocket;
pub use hooks::SocketHook;
pub use listener::{Incoming, Listener, ListenerBuilder, DEFAULT_BACKLOG};
pub use opt::SockOpt;
pub use provider::{default_provider, Descriptor, KernelProvider, Provider};
pub use resolver::{AddressParser, ResolveIter};
pub use sys::{FdSet, SocketRef};

/// Result type for network operations
pub type Result<T> = std::result::Result<T, Error>;

/// Network operation errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid address format: {0}")]
    InvalidAddress(String),

    #[error("Address resolution failed: {0}")]
    ResolutionFailed(String),

    #[error("Unsupported address family: {0}")]
    UnsupportedFamily(String),

    /// The provider returned `-code` from `call`.
    #[error("{call} failed: {}", describe_errno(.code))]
    NativeCallFailed { call: &'static str, code: i32 },

    #[error("Socket is closed")]
    Closed,

    /// A pre-bind or pre-connect hook failed. The descriptor has already
    /// been released when this is returned.
    #[error("Socket setup failed: {0}")]
    PartialSetupFailure(#[source] Box<Error>),

    #[error("Operation timed out")]
    Timeout,
}

fn describe_errno(code: &i32) -> io::Error {
    io::Error::from_raw_os_error(*code)
}

impl Error {
    /// The POSIX error number behind this error, if there is one.
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Error::NativeCallFailed { code, .. } => Some(*code),
            Error::Io(e) => e.raw_os_error(),
            Error::PartialSetupFailure(cause) => cause.raw_os_error(),
            _ => None,
        }
    }

    /// Returns true for [`Error::Closed`].
    pub fn is_closed(&self) -> bool {
        matches!(self, Error::Closed)
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(e) => e,
            Error::NativeCallFailed { code, .. } => io::Error::from_raw_os_error(code),
            Error::Closed => io::Error::new(io::ErrorKind::NotConnected, err),
            Error::Timeout => io::Error::new(io::ErrorKind::TimedOut, err),
            Error::InvalidArgument(_) | Error::InvalidAddress(_) => {
                io::Error::new(io::ErrorKind::InvalidInput, err)
            }
            Error::UnsupportedFamily(_) => io::Error::new(io::ErrorKind::Unsupported, err),
            other => io::Error::new(io::ErrorKind::Other, other),
        }
    }
}
