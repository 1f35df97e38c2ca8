//! Address parsing and resolution for `dial`-style entry points
//!
//! Accepted forms:
//! - "10.0.0.1:8000", "10.0.0.1 8000", "10.0.0.1"
//! - "[fe80::1%2]:8000", "[::1] 8000", "::1"
//! - "node-a:8000" (resolved through the system resolver)
//!
//! A numeric `%zone` suffix on an IPv6 literal becomes the address zone id.

use std::net::{IpAddr, Ipv6Addr, SocketAddr, ToSocketAddrs};

use super::{Error, Result, SockAddr};

/// Parsed address components
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAddress {
    /// The host part (IP literal or hostname)
    pub host: Option<String>,
    pub port: PortSpec,
}

/// Port specification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortSpec {
    None,
    Number(u16),
    /// Service name looked up by the system resolver
    Service(String),
}

/// Splits address strings into host and port
pub struct AddressParser;

impl AddressParser {
    /// Parse an address string into host and port components
    ///
    /// # Examples
    /// ```
    /// use rsocket::net::resolver::{AddressParser, PortSpec};
    ///
    /// let parsed = AddressParser::parse("127.0.0.1:8000", None).unwrap();
    /// assert_eq!(parsed.host.as_deref(), Some("127.0.0.1"));
    /// assert_eq!(parsed.port, PortSpec::Number(8000));
    /// ```
    pub fn parse(addr: &str, default_port: Option<&str>) -> Result<ParsedAddress> {
        let (host, port) = Self::split(addr)?;
        let port = match port.or(default_port) {
            Some(p) => Self::parse_port(p)?,
            None => PortSpec::None,
        };
        Ok(ParsedAddress {
            host: host.map(String::from),
            port,
        })
    }

    fn split(addr: &str) -> Result<(Option<&str>, Option<&str>)> {
        let addr = addr.trim();
        if addr.is_empty() {
            return Err(Error::InvalidAddress("Empty address".to_string()));
        }

        if let Some(rest) = addr.strip_prefix('[') {
            let close = rest
                .find(']')
                .ok_or_else(|| Error::InvalidAddress("IPv6 address lacks ']'".to_string()))?;
            let host = &rest[..close];
            let tail = &rest[close + 1..];
            let port = match tail.chars().next() {
                None => None,
                Some(' ') | Some(':') => non_empty(tail[1..].trim()),
                Some(_) => {
                    return Err(Error::InvalidAddress(
                        "IPv6 address has wrong port separator".to_string(),
                    ))
                }
            };
            return Ok((Some(host), port));
        }

        if let Some((host, port)) = addr.split_once(' ') {
            return Ok((non_empty(host), non_empty(port.trim())));
        }

        match addr.split_once(':') {
            // Bare IPv6 literal, no port
            Some((_, rest)) if rest.contains(':') => Ok((Some(addr), None)),
            Some((host, port)) => Ok((non_empty(host), non_empty(port))),
            None => Ok((Some(addr), None)),
        }
    }

    fn parse_port(port: &str) -> Result<PortSpec> {
        if port.chars().all(|c| c.is_ascii_digit()) {
            return port
                .parse::<u16>()
                .map(PortSpec::Number)
                .map_err(|_| Error::InvalidAddress(format!("Port out of range: {}", port)));
        }
        Ok(PortSpec::Service(port.to_string()))
    }
}

fn non_empty(s: &str) -> Option<&str> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Parse `ip` or `ip%zone` without touching the resolver.
fn parse_literal(host: &str) -> Option<(IpAddr, u32)> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Some((ip, 0));
    }
    let (ip, zone) = host.split_once('%')?;
    let ip: Ipv6Addr = ip.parse().ok()?;
    let zone: u32 = zone.parse().ok()?;
    Some((IpAddr::V6(ip), zone))
}

/// Iterator over resolved socket addresses
#[derive(Debug)]
pub struct ResolveIter {
    addresses: std::vec::IntoIter<SockAddr>,
}

impl ResolveIter {
    /// Resolve an address string to socket addresses
    pub fn resolve(addr: &str, default_port: Option<&str>) -> Result<Self> {
        let parsed = AddressParser::parse(addr, default_port)?;
        let host = parsed.host.as_deref().unwrap_or("0.0.0.0");

        let addresses = match (&parsed.port, parse_literal(host)) {
            (PortSpec::None, Some((ip, zone))) => vec![with_zone(ip, 0, zone)],
            (PortSpec::Number(port), Some((ip, zone))) => vec![with_zone(ip, *port, zone)],
            (PortSpec::None, None) => lookup(&format!("{}:0", host))?,
            (PortSpec::Number(port), None) => lookup(&format!("{}:{}", host, port))?,
            (PortSpec::Service(service), _) => lookup(&format!("{}:{}", host, service))?,
        };

        Ok(ResolveIter {
            addresses: addresses.into_iter(),
        })
    }

    /// Resolve and return only the first address
    pub fn resolve_first(addr: &str, default_port: Option<&str>) -> Result<SockAddr> {
        Self::resolve(addr, default_port)?
            .next()
            .ok_or_else(|| Error::ResolutionFailed(format!("No addresses resolved for {}", addr)))
    }
}

fn with_zone(ip: IpAddr, port: u16, zone: u32) -> SockAddr {
    match ip {
        IpAddr::V6(v6) => SockAddr::new_v6_scoped(v6, port, zone),
        IpAddr::V4(v4) => SockAddr::new_v4(v4, port),
    }
}

fn lookup(target: &str) -> Result<Vec<SockAddr>> {
    let found: Vec<SockAddr> = target
        .to_socket_addrs()
        .map_err(|e| Error::ResolutionFailed(format!("{}: {}", target, e)))?
        .map(|addr: SocketAddr| SockAddr::from(addr))
        .collect();

    if found.is_empty() {
        return Err(Error::ResolutionFailed(format!(
            "No addresses found for {}",
            target
        )));
    }
    Ok(found)
}

impl Iterator for ResolveIter {
    type Item = SockAddr;

    fn next(&mut self) -> Option<Self::Item> {
        self.addresses.next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ipv4_with_colon() {
        let parsed = AddressParser::parse("127.0.0.1:8000", None).unwrap();
        assert_eq!(parsed.host.as_deref(), Some("127.0.0.1"));
        assert_eq!(parsed.port, PortSpec::Number(8000));
    }

    #[test]
    fn test_parse_ipv4_with_space() {
        let parsed = AddressParser::parse("127.0.0.1 8000", None).unwrap();
        assert_eq!(parsed.host.as_deref(), Some("127.0.0.1"));
        assert_eq!(parsed.port, PortSpec::Number(8000));
    }

    #[test]
    fn test_parse_ipv6_brackets() {
        let parsed = AddressParser::parse("[::1]:4791", None).unwrap();
        assert_eq!(parsed.host.as_deref(), Some("::1"));
        assert_eq!(parsed.port, PortSpec::Number(4791));
    }

    #[test]
    fn test_parse_ipv6_no_port() {
        let parsed = AddressParser::parse("fe80::1", None).unwrap();
        assert_eq!(parsed.host.as_deref(), Some("fe80::1"));
        assert_eq!(parsed.port, PortSpec::None);
    }

    #[test]
    fn test_parse_default_port_and_service() {
        let parsed = AddressParser::parse("node-a", Some("8000")).unwrap();
        assert_eq!(parsed.port, PortSpec::Number(8000));

        let parsed = AddressParser::parse("node-a:http", None).unwrap();
        assert_eq!(parsed.port, PortSpec::Service("http".to_string()));
    }

    #[test]
    fn test_parse_errors() {
        assert!(AddressParser::parse("", None).is_err());
        assert!(AddressParser::parse("[::1", None).is_err());
        assert!(AddressParser::parse("[::1]x80", None).is_err());
        assert!(AddressParser::parse("10.0.0.1:70000", None).is_err());
    }

    #[test]
    fn test_resolve_ipv4_literal() {
        let addrs: Vec<_> = ResolveIter::resolve("127.0.0.1:9090", None).unwrap().collect();
        assert_eq!(addrs, vec![SockAddr::new_v4([127, 0, 0, 1].into(), 9090)]);
    }

    #[test]
    fn test_resolve_zone_literal() {
        let addr = ResolveIter::resolve_first("[fe80::1%2]:4791", None).unwrap();
        assert!(addr.is_ipv6());
        assert_eq!(addr.port(), 4791);
        assert_eq!(addr.zone_id(), 2);
    }

    #[test]
    fn test_resolve_localhost() {
        let addr = ResolveIter::resolve_first("localhost:8080", None).unwrap();
        assert_eq!(addr.port(), 8080);
    }
}
