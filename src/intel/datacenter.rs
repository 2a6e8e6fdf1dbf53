//! Hosting/cloud provider detection.
//!
//! Provider range lists run into the thousands of entries and are consulted
//! on every analyzed request, so ranges are kept sorted by start address and
//! searched with a binary search.

use std::path::PathBuf;

use tracing::debug;

use super::dataset::{data_lines, DatasetCache, DatasetError, ReferenceList};
use super::ip::{ip_to_int, is_ipv6};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpRange {
    pub start: u32,
    pub end: u32,
    pub provider: String,
}

#[derive(Debug, Default)]
pub struct DatacenterRanges {
    ranges: Vec<IpRange>,
}

impl DatacenterRanges {
    pub fn from_ranges(mut ranges: Vec<IpRange>) -> Self {
        ranges.sort_by_key(|r| r.start);
        Self { ranges }
    }

    /// Provider owning `ip`, if any range contains it.
    pub fn lookup(&self, ip: u32) -> Option<&str> {
        let (mut low, mut high) = (0usize, self.ranges.len());
        while low < high {
            let mid = low + (high - low) / 2;
            let range = &self.ranges[mid];
            if ip < range.start {
                high = mid;
            } else if ip > range.end {
                low = mid + 1;
            } else {
                return Some(range.provider.as_str());
            }
        }
        None
    }
}

impl ReferenceList for DatacenterRanges {
    fn parse(content: &str) -> Self {
        let mut ranges = Vec::new();
        for (line_no, line) in data_lines(content) {
            match parse_range_line(line) {
                Some(range) => ranges.push(range),
                None => debug!(line = line_no, value = line, "Skipping malformed datacenter range"),
            }
        }
        Self::from_ranges(ranges)
    }

    fn len(&self) -> usize {
        self.ranges.len()
    }
}

/// `startIP,endIP,Provider Name`. The provider column is everything after
/// the second comma and may itself contain commas or be double-quoted.
fn parse_range_line(line: &str) -> Option<IpRange> {
    let mut parts = line.splitn(3, ',');
    let start = ip_to_int(parts.next()?)?;
    let end = ip_to_int(parts.next()?)?;
    if start > end {
        return None;
    }

    let raw = parts.next()?.trim();
    let provider = raw
        .strip_prefix('"')
        .and_then(|p| p.strip_suffix('"'))
        .map(|p| p.replace("\"\"", "\""))
        .unwrap_or_else(|| raw.to_string());
    if provider.is_empty() {
        return None;
    }

    Some(IpRange { start, end, provider })
}

pub struct DatacenterClassifier {
    ranges: DatasetCache<DatacenterRanges>,
}

impl DatacenterClassifier {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            ranges: DatasetCache::new("datacenter", Some(path.into())),
        }
    }

    #[cfg(test)]
    pub fn detached() -> Self {
        Self {
            ranges: DatasetCache::new("datacenter", None),
        }
    }

    /// Provider name for a datacenter address, `None` otherwise.
    pub fn is_datacenter_ip(&self, ip: &str) -> Option<String> {
        if is_ipv6(ip) {
            return None;
        }
        let value = ip_to_int(ip)?;
        self.ranges.get().lookup(value).map(str::to_string)
    }

    #[cfg(test)]
    pub fn load_from_str(&self, content: &str) -> usize {
        self.ranges.load_from_str(content)
    }

    #[cfg(test)]
    pub fn load_ranges(&self, ranges: Vec<IpRange>) -> usize {
        self.ranges.install(DatacenterRanges::from_ranges(ranges))
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
