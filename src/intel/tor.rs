use std::collections::HashSet;
use std::path::PathBuf;

use tracing::debug;

use super::dataset::{data_lines, DatasetCache, DatasetError, ReferenceList};
use super::ip::{ip_to_int, is_ipv6};

/// Tor exit relays are published as exact addresses and refreshed hourly,
/// so membership is a set lookup rather than a range scan.
#[derive(Debug, Default)]
pub struct TorExitList {
    exits: HashSet<u32>,
}

impl TorExitList {
    pub fn contains(&self, ip: u32) -> bool {
        self.exits.contains(&ip)
    }
}

impl ReferenceList for TorExitList {
    fn parse(content: &str) -> Self {
        let mut exits = HashSet::new();
        for (line_no, line) in data_lines(content) {
            match ip_to_int(line) {
                Some(ip) => {
                    exits.insert(ip);
                }
                None => debug!(line = line_no, value = line, "Skipping malformed Tor exit entry"),
            }
        }
        Self { exits }
    }

    fn len(&self) -> usize {
        self.exits.len()
    }
}

pub struct TorClassifier {
    exits: DatasetCache<TorExitList>,
}

impl TorClassifier {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            exits: DatasetCache::new("tor", Some(path.into())),
        }
    }

    #[cfg(test)]
    pub fn detached() -> Self {
        Self {
            exits: DatasetCache::new("tor", None),
        }
    }

    pub fn is_tor_exit_node(&self, ip: &str) -> bool {
        if is_ipv6(ip) {
            return false;
        }
        let exits = self.exits.get();
        if exits.is_empty() {
            return false;
        }
        ip_to_int(ip).is_some_and(|value| exits.contains(value))
    }

    /// Number of distinct exit addresses loaded; 0 before the first lookup.
    pub fn tor_list_size(&self) -> usize {
        self.exits.loaded_len()
    }

    pub fn is_loaded(&self) -> bool {
        self.exits.is_loaded()
    }

    #[cfg(test)]
    pub fn load_from_str(&self, content: &str) -> usize {
        self.exits.load_from_str(content)
    }

    pub fn reload(&self) -> Result<usize, DatasetError> {
        self.exits.reload()
    }

    pub fn reset(&self) {
        self.exits.reset();
    }
}
