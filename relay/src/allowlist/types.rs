//! Allowlist data types.
//!
//! - [`NetworkRange`]: one parsed CIDR block
//! - [`AllowlistSnapshot`]: an immutable set of ranges plus where they came from
//! - [`AllowlistSource`]: where the next snapshot should be resolved from

use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;
use std::str::FromStr;

use ip_network::IpNetwork;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{RelayError, Result};

/// A CIDR-notated address block, IPv4 or IPv6.
///
/// A bare address without a prefix length is read as a single host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkRange(IpNetwork);

impl NetworkRange {
    /// True if `addr` lies inside this block.
    ///
    /// IPv4-mapped IPv6 addresses are compared as IPv4; otherwise the address
    /// families must agree.
    pub fn contains(&self, addr: IpAddr) -> bool {
        let addr = match addr {
            IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(addr),
            v4 => v4,
        };

        match (&self.0, addr) {
            (IpNetwork::V4(net), IpAddr::V4(ip)) => net.contains(ip),
            (IpNetwork::V6(net), IpAddr::V6(ip)) => net.contains(ip),
            _ => false,
        }
    }
}

impl FromStr for NetworkRange {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let invalid = |reason: String| RelayError::InvalidRange {
            range: s.to_string(),
            reason,
        };

        if trimmed.contains('/') {
            return IpNetwork::from_str(trimmed)
                .map(NetworkRange)
                .map_err(|e| invalid(e.to_string()));
        }

        let addr = IpAddr::from_str(trimmed).map_err(|e| invalid(e.to_string()))?;
        let prefix = match addr {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        IpNetwork::new(addr, prefix)
            .map(NetworkRange)
            .map_err(|e| invalid(e.to_string()))
    }
}

impl fmt::Display for NetworkRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a snapshot's ranges came from.
///
/// Serializes to the same names `as_str` gives, as reported by `/status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SnapshotOrigin {
    #[serde(rename = "remote")]
    Remote,
    #[serde(rename = "cached-file")]
    CachedFile,
    #[serde(rename = "override")]
    Override,
}

impl SnapshotOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotOrigin::Remote => "remote",
            SnapshotOrigin::CachedFile => "cached-file",
            SnapshotOrigin::Override => "override",
        }
    }
}

/// The set of trusted sender ranges at a point in time.
///
/// Never mutated after construction; a refresh builds a new snapshot and
/// swaps it in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowlistSnapshot {
    ranges: Vec<NetworkRange>,
    origin: SnapshotOrigin,
}

impl AllowlistSnapshot {
    pub fn new(ranges: Vec<NetworkRange>, origin: SnapshotOrigin) -> Self {
        Self { ranges, origin }
    }

    /// Parse every entry, failing on the first malformed one.
    ///
    /// Used for operator-supplied lists, where a typo should stop startup.
    pub fn parse_strict<S: AsRef<str>>(entries: &[S], origin: SnapshotOrigin) -> Result<Self> {
        let ranges = entries
            .iter()
            .map(|entry| entry.as_ref().parse())
            .collect::<Result<Vec<NetworkRange>>>()?;
        Ok(Self::new(ranges, origin))
    }

    /// Parse every entry, skipping malformed ones with a warning.
    ///
    /// Used for data we fetched or read back, where one bad entry should not
    /// discard the rest of the list.
    pub fn parse_lenient<S: AsRef<str>>(entries: &[S], origin: SnapshotOrigin) -> Self {
        let ranges = entries
            .iter()
            .filter_map(|entry| match entry.as_ref().parse::<NetworkRange>() {
                Ok(range) => Some(range),
                Err(e) => {
                    warn!(
                        origin = origin.as_str(),
                        error = %e,
                        "allowlist_range_skipped"
                    );
                    None
                }
            })
            .collect();
        Self::new(ranges, origin)
    }

    pub fn ranges(&self) -> &[NetworkRange] {
        &self.ranges
    }

    pub fn origin(&self) -> SnapshotOrigin {
        self.origin
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}

/// Where to resolve the next snapshot from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowlistSource {
    /// Query the directory service at this URL
    Remote(String),
    /// Read a previously persisted snapshot
    CachedFile(PathBuf),
    /// Use this list verbatim
    Override(Vec<String>),
}

/// On-disk and on-the-wire shape: `{"hooks": ["192.30.252.0/22", ...]}`.
///
/// Unknown keys are ignored, so a full saved `/meta` response also loads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HooksDocument {
    pub hooks: Vec<String>,
}

impl From<&AllowlistSnapshot> for HooksDocument {
    fn from(snapshot: &AllowlistSnapshot) -> Self {
        Self {
            hooks: snapshot.ranges.iter().map(ToString::to_string).collect(),
        }
    }
}
