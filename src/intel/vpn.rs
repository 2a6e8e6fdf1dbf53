use std::path::PathBuf;

use ipnet::Ipv4Net;
use tracing::debug;

use super::dataset::{data_lines, DatasetCache, DatasetError, ReferenceList};
use super::ip::{ip_to_int, is_ipv6, net_contains, parse_cidr};

/// Known VPN provider address blocks, one CIDR per line.
#[derive(Debug, Default)]
pub struct VpnRanges {
    blocks: Vec<Ipv4Net>,
}

impl VpnRanges {
    pub fn contains(&self, ip: u32) -> bool {
        self.blocks.iter().any(|net| net_contains(net, ip))
    }
}

impl ReferenceList for VpnRanges {
    fn parse(content: &str) -> Self {
        let mut blocks = Vec::new();
        for (line_no, line) in data_lines(content) {
            match parse_cidr(line) {
                Some(net) => blocks.push(net),
                None => debug!(line = line_no, value = line, "Skipping malformed VPN range"),
            }
        }
        Self { blocks }
    }

    fn len(&self) -> usize {
        self.blocks.len()
    }
}

/// VPN exit detection against a CIDR list.
pub struct VpnClassifier {
    ranges: DatasetCache<VpnRanges>,
}

impl VpnClassifier {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            ranges: DatasetCache::new("vpn", Some(path.into())),
        }
    }

    /// Classifier with no backing file; populate it with `load_from_str`.
    #[cfg(test)]
    pub fn detached() -> Self {
        Self {
            ranges: DatasetCache::new("vpn", None),
        }
    }

    pub fn is_vpn_ip(&self, ip: &str) -> bool {
        if is_ipv6(ip) {
            return false;
        }
        let ranges = self.ranges.get();
        if ranges.is_empty() {
            return false;
        }
        match ip_to_int(ip) {
            Some(value) => ranges.contains(value),
            None => false,
        }
    }

    #[cfg(test)]
    pub fn load_from_str(&self, content: &str) -> usize {
        self.ranges.load_from_str(content)
    }

    pub fn reload(&self) -> Result<usize, DatasetError> {
        self.ranges.reload()
    }

    pub fn reset(&self) {
        self.ranges.reset();
    }

    pub fn range_count(&self) -> usize {
        self.ranges.loaded_len()
    }

    pub fn is_loaded(&self) -> bool {
        self.ranges.is_loaded()
    }
}
