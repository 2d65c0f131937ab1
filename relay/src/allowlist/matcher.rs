//! CIDR membership checks.

use std::net::IpAddr;

use super::types::NetworkRange;

/// Check whether `address` falls within any of `ranges`.
///
/// A missing or unparseable address is never in range. Surrounding
/// whitespace is ignored.
pub fn is_in_range(address: Option<&str>, ranges: &[NetworkRange]) -> bool {
    match address.and_then(parse_address) {
        Some(addr) => addr_in_range(addr, ranges),
        None => false,
    }
}

/// Check an already-parsed address against `ranges`, stopping at the first match.
pub fn addr_in_range(addr: IpAddr, ranges: &[NetworkRange]) -> bool {
    ranges.iter().any(|range| range.contains(addr))
}

fn parse_address(raw: &str) -> Option<IpAddr> {
    raw.trim().parse().ok()
}
