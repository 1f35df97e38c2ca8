//! Socket address handling
//!
//! `SockAddr` is the portable address callers work with: host-order port,
//! IPv4 or IPv6 only. `RawAddr` is the ABI `sockaddr` image handed to the
//! provider. [`encode`] and [`decode`] are the only places the two meet, and
//! the only places a port is byte-swapped.

use std::fmt;
use std::mem;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};

use super::{Error, Result};

/// A socket address that can represent IPv4 or IPv6 addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SockAddr {
    /// IPv4 socket address
    V4(SocketAddrV4),
    /// IPv6 socket address, including flow info and zone (scope) id
    V6(SocketAddrV6),
}

impl SockAddr {
    /// Create a new IPv4 socket address
    pub fn new_v4(ip: Ipv4Addr, port: u16) -> Self {
        SockAddr::V4(SocketAddrV4::new(ip, port))
    }

    /// Create a new IPv6 socket address with no zone id
    pub fn new_v6(ip: Ipv6Addr, port: u16) -> Self {
        SockAddr::V6(SocketAddrV6::new(ip, port, 0, 0))
    }

    /// Create an IPv6 socket address bound to a zone (interface index)
    pub fn new_v6_scoped(ip: Ipv6Addr, port: u16, zone_id: u32) -> Self {
        SockAddr::V6(SocketAddrV6::new(ip, port, 0, zone_id))
    }

    /// Create from an IP and port
    pub fn from_ip(ip: IpAddr, port: u16) -> Self {
        match ip {
            IpAddr::V4(v4) => SockAddr::new_v4(v4, port),
            IpAddr::V6(v6) => SockAddr::new_v6(v6, port),
        }
    }

    /// Convert to a standard library SocketAddr
    pub fn to_std(&self) -> SocketAddr {
        match self {
            SockAddr::V4(v4) => SocketAddr::V4(*v4),
            SockAddr::V6(v6) => SocketAddr::V6(*v6),
        }
    }

    /// Get the port number (host byte order)
    pub fn port(&self) -> u16 {
        match self {
            SockAddr::V4(v4) => v4.port(),
            SockAddr::V6(v6) => v6.port(),
        }
    }

    /// Replace the port number
    pub fn set_port(&mut self, port: u16) {
        match self {
            SockAddr::V4(v4) => v4.set_port(port),
            SockAddr::V6(v6) => v6.set_port(port),
        }
    }

    /// Get the IP address
    pub fn ip(&self) -> IpAddr {
        match self {
            SockAddr::V4(v4) => IpAddr::V4(*v4.ip()),
            SockAddr::V6(v6) => IpAddr::V6(*v6.ip()),
        }
    }

    /// Zone id of an IPv6 address; always 0 for IPv4
    pub fn zone_id(&self) -> u32 {
        match self {
            SockAddr::V4(_) => 0,
            SockAddr::V6(v6) => v6.scope_id(),
        }
    }

    pub fn is_ipv4(&self) -> bool {
        matches!(self, SockAddr::V4(_))
    }

    pub fn is_ipv6(&self) -> bool {
        matches!(self, SockAddr::V6(_))
    }

    /// Compare only the IP addresses, ignoring ports
    pub fn compare_ip(&self, other: &Self) -> bool {
        self.ip() == other.ip()
    }

    /// The socket domain needed to carry this address
    pub fn domain(&self) -> socket2::Domain {
        match self {
            SockAddr::V4(_) => socket2::Domain::IPV4,
            SockAddr::V6(_) => socket2::Domain::IPV6,
        }
    }

    /// Get address family as a string
    pub fn family(&self) -> &'static str {
        match self {
            SockAddr::V4(_) => "IPv4",
            SockAddr::V6(_) => "IPv6",
        }
    }

    /// Format address as string (without port)
    pub fn addr_string(&self) -> String {
        match self {
            SockAddr::V4(v4) => v4.ip().to_string(),
            SockAddr::V6(v6) => match v6.ip().to_ipv4_mapped() {
                Some(ipv4) => ipv4.to_string(),
                None => v6.ip().to_string(),
            },
        }
    }

    /// The wildcard IPv4 address `0.0.0.0:port`
    pub fn unspecified_v4(port: u16) -> Self {
        SockAddr::new_v4(Ipv4Addr::UNSPECIFIED, port)
    }

    /// The wildcard IPv6 address `[::]:port`
    pub fn unspecified_v6(port: u16) -> Self {
        SockAddr::new_v6(Ipv6Addr::UNSPECIFIED, port)
    }
}

impl fmt::Display for SockAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SockAddr::V4(v4) => write!(f, "{}", v4),
            SockAddr::V6(v6) => write!(f, "{}", v6),
        }
    }
}

impl From<SocketAddr> for SockAddr {
    fn from(addr: SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(v4) => SockAddr::V4(v4),
            SocketAddr::V6(v6) => SockAddr::V6(v6),
        }
    }
}

impl From<SocketAddrV4> for SockAddr {
    fn from(addr: SocketAddrV4) -> Self {
        SockAddr::V4(addr)
    }
}

impl From<SocketAddrV6> for SockAddr {
    fn from(addr: SocketAddrV6) -> Self {
        SockAddr::V6(addr)
    }
}

impl From<SockAddr> for SocketAddr {
    fn from(addr: SockAddr) -> Self {
        addr.to_std()
    }
}

impl From<SockAddr> for socket2::SockAddr {
    fn from(addr: SockAddr) -> Self {
        socket2::SockAddr::from(addr.to_std())
    }
}

impl TryFrom<&socket2::SockAddr> for SockAddr {
    type Error = Error;

    fn try_from(addr: &socket2::SockAddr) -> Result<Self> {
        addr.as_socket().map(SockAddr::from).ok_or_else(|| {
            Error::UnsupportedFamily(format!("family {} is not IPv4 or IPv6", addr.family()))
        })
    }
}

/// An ABI-level `sockaddr` image and its length.
///
/// Used as an input (`bind`, `connect`, `sendto`) and as an output buffer
/// (`accept`, `recvfrom`, `getsockname`). A fresh `RawAddr` has the full
/// storage length, which is what output calls expect.
#[derive(Clone, Copy)]
pub struct RawAddr {
    storage: libc::sockaddr_storage,
    len: libc::socklen_t,
}

impl RawAddr {
    const CAPACITY: usize = mem::size_of::<libc::sockaddr_storage>();

    /// An empty output buffer sized for any supported address
    pub fn new() -> Self {
        RawAddr {
            // SAFETY: sockaddr_storage is plain old data; all zeroes is valid.
            storage: unsafe { mem::zeroed() },
            len: Self::CAPACITY as libc::socklen_t,
        }
    }

    /// Build a raw address from its ABI bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > Self::CAPACITY {
            return Err(Error::InvalidArgument(format!(
                "raw address of {} bytes exceeds sockaddr_storage",
                bytes.len()
            )));
        }
        let mut raw = RawAddr::new();
        // SAFETY: bytes.len() <= CAPACITY and the regions cannot overlap.
        unsafe {
            std::ptr::copy_nonoverlapping(
                bytes.as_ptr(),
                raw.as_mut_ptr().cast::<u8>(),
                bytes.len(),
            );
        }
        raw.len = bytes.len() as libc::socklen_t;
        Ok(raw)
    }

    pub fn as_ptr(&self) -> *const libc::sockaddr {
        (&self.storage as *const libc::sockaddr_storage).cast()
    }

    pub fn as_mut_ptr(&mut self) -> *mut libc::sockaddr {
        (&mut self.storage as *mut libc::sockaddr_storage).cast()
    }

    /// Length in bytes of the encoded address
    pub fn len(&self) -> libc::socklen_t {
        self.len
    }

    /// Address and length pointers for calls that write an address back
    pub fn out_ptrs(&mut self) -> (*mut libc::sockaddr, *mut libc::socklen_t) {
        (
            (&mut self.storage as *mut libc::sockaddr_storage).cast(),
            &mut self.len,
        )
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Family tag (`AF_*`)
    pub fn family(&self) -> libc::sa_family_t {
        self.storage.ss_family
    }

    /// The encoded bytes, `len()` long
    pub fn as_bytes(&self) -> &[u8] {
        let len = (self.len as usize).min(Self::CAPACITY);
        // SAFETY: storage is CAPACITY bytes of initialized memory.
        unsafe { std::slice::from_raw_parts(self.as_ptr().cast::<u8>(), len) }
    }
}

impl Default for RawAddr {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RawAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawAddr")
            .field("family", &self.family())
            .field("len", &self.len)
            .field("bytes", &self.as_bytes())
            .finish()
    }
}

/// Encode a portable address into the raw layout the provider expects.
///
/// The port is written in network byte order; IPv6 zone id goes into
/// `sin6_scope_id` and flow info into `sin6_flowinfo`.
pub fn encode(addr: &SockAddr) -> RawAddr {
    let mut raw = RawAddr::new();
    match addr {
        SockAddr::V4(v4) => {
            // SAFETY: sockaddr_in is plain old data.
            let mut sin: libc::sockaddr_in = unsafe { mem::zeroed() };
            sin.sin_family = libc::AF_INET as libc::sa_family_t;
            sin.sin_port = v4.port().to_be();
            sin.sin_addr = libc::in_addr {
                s_addr: u32::from_ne_bytes(v4.ip().octets()),
            };
            // SAFETY: sockaddr_storage is large and aligned enough for sockaddr_in.
            unsafe { raw.as_mut_ptr().cast::<libc::sockaddr_in>().write(sin) };
            raw.len = mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
        }
        SockAddr::V6(v6) => {
            // SAFETY: sockaddr_in6 is plain old data.
            let mut sin6: libc::sockaddr_in6 = unsafe { mem::zeroed() };
            sin6.sin6_family = libc::AF_INET6 as libc::sa_family_t;
            sin6.sin6_port = v6.port().to_be();
            sin6.sin6_flowinfo = v6.flowinfo();
            sin6.sin6_addr = libc::in6_addr {
                s6_addr: v6.ip().octets(),
            };
            sin6.sin6_scope_id = v6.scope_id();
            // SAFETY: sockaddr_storage is large and aligned enough for sockaddr_in6.
            unsafe { raw.as_mut_ptr().cast::<libc::sockaddr_in6>().write(sin6) };
            raw.len = mem::size_of::<libc::sockaddr_in6>() as libc::socklen_t;
        }
    }
    raw
}

/// Decode a raw address returned by the provider.
pub fn decode(raw: &RawAddr) -> Result<SockAddr> {
    if raw.is_empty() {
        return Err(Error::InvalidArgument("absent socket address".to_string()));
    }

    match raw.family() as libc::c_int {
        libc::AF_INET => {
            check_len(raw, mem::size_of::<libc::sockaddr_in>(), "IPv4")?;
            // SAFETY: family and length checked above.
            let sin = unsafe { raw.as_ptr().cast::<libc::sockaddr_in>().read() };
            let ip = Ipv4Addr::from(sin.sin_addr.s_addr.to_ne_bytes());
            Ok(SockAddr::new_v4(ip, u16::from_be(sin.sin_port)))
        }
        libc::AF_INET6 => {
            check_len(raw, mem::size_of::<libc::sockaddr_in6>(), "IPv6")?;
            // SAFETY: family and length checked above.
            let sin6 = unsafe { raw.as_ptr().cast::<libc::sockaddr_in6>().read() };
            Ok(SockAddr::V6(SocketAddrV6::new(
                Ipv6Addr::from(sin6.sin6_addr.s6_addr),
                u16::from_be(sin6.sin6_port),
                sin6.sin6_flowinfo,
                sin6.sin6_scope_id,
            )))
        }
        other => Err(Error::UnsupportedFamily(format!("family {}", other))),
    }
}

fn check_len(raw: &RawAddr, need: usize, family: &str) -> Result<()> {
    if (raw.len() as usize) < need {
        return Err(Error::InvalidArgument(format!(
            "{} address truncated: {} of {} bytes",
            family,
            raw.len(),
            need
        )));
    }
    Ok(())
}
