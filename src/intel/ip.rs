//! IPv4 helpers shared by the list classifiers.
//!
//! Everything here is pure and total: malformed input yields `None` or
//! `false`, never a panic.

use std::net::{IpAddr, Ipv4Addr};

use ipnet::Ipv4Net;

/// Parse a dotted-quad IPv4 address into its 32-bit integer form.
///
/// Returns `None` for the empty string, a wrong segment count, non-numeric
/// segments, or an octet above 255.
pub fn ip_to_int(ip: &str) -> Option<u32> {
    let ip = ip.trim();
    if ip.is_empty() {
        return None;
    }

    let mut value: u32 = 0;
    let mut segments = 0;
    for part in ip.split('.') {
        segments += 1;
        if segments > 4 || part.is_empty() || part.len() > 3 {
            return None;
        }
        if !part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let octet: u32 = part.parse().ok()?;
        if octet > 255 {
            return None;
        }
        value = (value << 8) | octet;
    }

    if segments != 4 {
        return None;
    }
    Some(value)
}

/// Parse a CIDR block. A bare address is treated as `/32`.
pub fn parse_cidr(cidr: &str) -> Option<Ipv4Net> {
    let cidr = cidr.trim();
    let (addr, prefix) = match cidr.split_once('/') {
        Some((addr, prefix)) => (addr, prefix.trim().parse::<u8>().ok()?),
        None => (cidr, 32),
    };
    let addr = Ipv4Addr::from(ip_to_int(addr)?);
    Ipv4Net::new(addr, prefix).ok()
}

/// Whether `ip` falls inside `cidr`. Non-IPv4 input or a malformed block
/// is never a match. The classifiers match against pre-parsed blocks with
/// [`net_contains`] instead.
#[cfg(test)]
pub fn is_in_cidr(ip: &str, cidr: &str) -> bool {
    match (ip_to_int(ip), parse_cidr(cidr)) {
        (Some(ip), Some(net)) => net_contains(&net, ip),
        _ => false,
    }
}

/// Whether `ip` matches any block in `cidrs`. Stops at the first match.
#[cfg(test)]
pub fn is_in_cidr_list<S: AsRef<str>>(ip: &str, cidrs: &[S]) -> bool {
    let Some(ip) = ip_to_int(ip) else {
        return false;
    };
    cidrs
        .iter()
        .filter_map(|c| parse_cidr(c.as_ref()))
        .any(|net| net_contains(&net, ip))
}

/// Mask comparison against an already parsed block.
pub fn net_contains(net: &Ipv4Net, ip: u32) -> bool {
    let mask = u32::from(net.netmask());
    (ip & mask) == (u32::from(net.network()) & mask)
}

/// RFC 1918 ranges plus loopback.
pub fn is_private_ip(ip: &str) -> bool {
    const PRIVATE: &[(u32, u8)] = &[
        (0x0A00_0000, 8),  // 10.0.0.0/8
        (0xAC10_0000, 12), // 172.16.0.0/12
        (0xC0A8_0000, 16), // 192.168.0.0/16
        (0x7F00_0000, 8),  // 127.0.0.0/8
    ];

    let Some(value) = ip_to_int(ip) else {
        return false;
    };
    PRIVATE.iter().any(|&(base, prefix)| {
        let mask = !0u32 << (32 - prefix);
        (value & mask) == base
    })
}

pub fn is_ipv6(ip: &str) -> bool {
    matches!(ip.trim().parse::<IpAddr>(), Ok(IpAddr::V6(_)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ip_to_int() {
        assert_eq!(ip_to_int("0.0.0.0"), Some(0));
        assert_eq!(ip_to_int("1.2.3.4"), Some(0x0102_0304));
        assert_eq!(ip_to_int("255.255.255.255"), Some(u32::MAX));
        assert_eq!(ip_to_int(" 10.0.0.1 "), Some(0x0A00_0001));
    }

    #[test]
    fn test_ip_to_int_malformed() {
        assert_eq!(ip_to_int(""), None);
        assert_eq!(ip_to_int("1.2.3"), None);
        assert_eq!(ip_to_int("1.2.3.4.5"), None);
        assert_eq!(ip_to_int("1.2.3.256"), None);
        assert_eq!(ip_to_int("a.b.c.d"), None);
        assert_eq!(ip_to_int("1..3.4"), None);
        assert_eq!(ip_to_int("-1.2.3.4"), None);
        assert_eq!(ip_to_int("2001:db8::1"), None);
    }

    #[test]
    fn test_is_in_cidr() {
        assert!(is_in_cidr("10.1.2.3", "10.0.0.0/8"));
        assert!(!is_in_cidr("11.1.2.3", "10.0.0.0/8"));
        assert!(is_in_cidr("192.168.1.200", "192.168.1.0/24"));
        assert!(is_in_cidr("8.8.8.8", "0.0.0.0/0"));
        assert!(is_in_cidr("172.31.255.255", "172.16.0.0/12"));
        assert!(!is_in_cidr("172.32.0.0", "172.16.0.0/12"));
    }

    #[test]
    fn test_slash_32_is_exact_match() {
        assert!(is_in_cidr("203.0.113.7", "203.0.113.7/32"));
        assert!(!is_in_cidr("203.0.113.8", "203.0.113.7/32"));
        assert!(!is_in_cidr("203.0.113.6", "203.0.113.7/32"));
    }

    #[test]
    fn test_is_in_cidr_malformed() {
        assert!(!is_in_cidr("10.0.0.1", "10.0.0.0/33"));
        assert!(!is_in_cidr("10.0.0.1", "10.0.0/8"));
        assert!(!is_in_cidr("10.0.0.1", "10.0.0.0/x"));
        assert!(!is_in_cidr("2001:db8::1", "10.0.0.0/8"));
        assert!(!is_in_cidr("not-an-ip", "10.0.0.0/8"));
    }

    #[test]
    fn test_is_in_cidr_list() {
        let cidrs = ["192.0.2.0/24", "garbage", "198.51.100.0/24"];
        assert!(is_in_cidr_list("198.51.100.14", &cidrs));
        assert!(is_in_cidr_list("192.0.2.1", &cidrs));
        assert!(!is_in_cidr_list("203.0.113.1", &cidrs));
        assert!(!is_in_cidr_list::<&str>("192.0.2.1", &[]));
    }

    #[test]
    fn test_is_private_ip() {
        assert!(is_private_ip("10.20.30.40"));
        assert!(is_private_ip("172.16.0.1"));
        assert!(is_private_ip("172.31.255.254"));
        assert!(is_private_ip("192.168.0.10"));
        assert!(is_private_ip("127.0.0.1"));
        assert!(!is_private_ip("172.32.0.1"));
        assert!(!is_private_ip("8.8.8.8"));
        assert!(!is_private_ip("::1"));
    }

    #[test]
    fn test_is_ipv6() {
        assert!(is_ipv6("2001:db8::1"));
        assert!(is_ipv6("::1"));
        assert!(!is_ipv6("1.2.3.4"));
        assert!(!is_ipv6(""));
    }
}
