//! Blocking socket API over RDMA sockets
//!
//! `rsocket` wraps the librdmacm rsocket calls (`rsocket`, `rbind`,
//! `rconnect`, ...) in listener, connection and datagram types that behave
//! like ordinary stream and datagram sockets. The calls go through a
//! [`net::Provider`]; with the `rdma` feature that is librdmacm, without it
//! the host kernel socket layer stands in.
//!
//! ```no_run
//! use std::io::Write;
//! use rsocket::net::{ListenerBuilder, SockAddr};
//!
//! let listener = ListenerBuilder::new().bind(&SockAddr::unspecified_v4(7471))?;
//! for conn in listener.incoming() {
//!     let mut conn = conn?;
//!     let mut buf = [0u8; 64];
//!     let n = conn.read(&mut buf)?;
//!     conn.write_all(&buf[..n])?;
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod net;

pub use net::{
    dial, Connection, Connector, DatagramSocket, Error, Listener, ListenerBuilder, Result, SockAddr,
};
