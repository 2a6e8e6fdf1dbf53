//! Lazily loaded, resettable reference-dataset cache shared by the VPN, Tor
//! and datacenter classifiers.
//!
//! Readers take a lock-free snapshot through `ArcSwapOption`. The first
//! reader to find the cache empty takes `load_lock`, re-checks, and performs
//! the single file read; concurrent readers wait on the lock instead of
//! reading the file again.

use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("no dataset path configured for {0}")]
    NoSource(&'static str),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A parsed reference list. Parsing never fails as a whole: malformed lines
/// are skipped by the implementation.
pub trait ReferenceList: Default + Send + Sync + 'static {
    fn parse(content: &str) -> Self;
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub struct DatasetCache<T: ReferenceList> {
    name: &'static str,
    path: Option<PathBuf>,
    current: ArcSwapOption<T>,
    load_lock: Mutex<()>,
}

impl<T: ReferenceList> DatasetCache<T> {
    pub fn new(name: &'static str, path: Option<PathBuf>) -> Self {
        Self {
            name,
            path,
            current: ArcSwapOption::empty(),
            load_lock: Mutex::new(()),
        }
    }

    /// Current dataset, loading it from disk on first use. A missing or
    /// unreadable file yields an empty dataset that never matches.
    pub fn get(&self) -> Arc<T> {
        if let Some(data) = self.current.load_full() {
            return data;
        }

        let _guard = self.load_lock.lock();
        if let Some(data) = self.current.load_full() {
            return data;
        }

        let data = Arc::new(self.read_or_empty());
        self.current.store(Some(Arc::clone(&data)));
        data
    }

    /// Replace the dataset with one parsed from `content`.
    #[cfg(test)]
    pub fn load_from_str(&self, content: &str) -> usize {
        self.install(T::parse(content))
    }

    /// Replace the dataset with an already built value.
    pub fn install(&self, data: T) -> usize {
        let _guard = self.load_lock.lock();
        let len = data.len();
        self.current.store(Some(Arc::new(data)));
        len
    }

    /// Re-read the configured file. On failure the previous dataset stays in
    /// place and the error is returned.
    pub fn reload(&self) -> Result<usize, DatasetError> {
        let data = self.read()?;
        Ok(self.install(data))
    }

    /// Drop the cached dataset so the next lookup reloads it.
    pub fn reset(&self) {
        let _guard = self.load_lock.lock();
        self.current.store(None);
    }

    pub fn is_loaded(&self) -> bool {
        self.current.load().is_some()
    }

    /// Size of the loaded dataset, or 0 when nothing is loaded yet.
    pub fn loaded_len(&self) -> usize {
        self.current.load_full().map(|d| d.len()).unwrap_or(0)
    }

    fn read(&self) -> Result<T, DatasetError> {
        let path = self.path.as_ref().ok_or(DatasetError::NoSource(self.name))?;
        let content = std::fs::read_to_string(path).map_err(|source| DatasetError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(T::parse(&content))
    }

    fn read_or_empty(&self) -> T {
        match self.read() {
            Ok(data) => {
                info!(dataset = self.name, entries = data.len(), "Reference dataset loaded");
                data
            }
            Err(e) => {
                warn!(dataset = self.name, error = %e, "Reference dataset unavailable, lookups will not match");
                T::default()
            }
        }
    }
}

/// Non-blank, non-comment lines of a dataset file with their 1-based line
/// numbers, trimmed.
pub fn data_lines(content: &str) -> impl Iterator<Item = (usize, &str)> {
    content
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::time::Duration;

    #[derive(Default)]
    struct Lines(Vec<String>);

    impl ReferenceList for Lines {
        fn parse(content: &str) -> Self {
            Lines(data_lines(content).map(|(_, l)| l.to_string()).collect())
        }

        fn len(&self) -> usize {
            self.0.len()
        }
    }

    fn temp_file(name: &str, content: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "riskgate-dataset-{}-{}",
            std::process::id(),
            name
        ));
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_data_lines_skips_comments_and_blanks() {
        let lines: Vec<_> = data_lines("# header\n\n  a  \n#b\nc\n").collect();
        assert_eq!(lines, vec![(3, "a"), (5, "c")]);
    }

    #[test]
    fn test_lazy_load_happens_once() {
        let path = temp_file("lazy", "one\ntwo\n");
        let cache: DatasetCache<Lines> = DatasetCache::new("test", Some(path.clone()));
        assert!(!cache.is_loaded());
        assert_eq!(cache.get().len(), 2);

        // Later file changes are not picked up until reset.
        std::fs::write(&path, "one\n").unwrap();
        assert_eq!(cache.get().len(), 2);

        cache.reset();
        assert!(!cache.is_loaded());
        assert_eq!(cache.get().len(), 1);
        let _ = std::fs::remove_file(path);
    }

    static PARSES: AtomicUsize = AtomicUsize::new(0);

    /// Counts every parse so concurrent first access can be checked.
    #[derive(Default)]
    struct Counted(usize);

    impl ReferenceList for Counted {
        fn parse(content: &str) -> Self {
            PARSES.fetch_add(1, Ordering::SeqCst);
            // Widen the window in which other readers find the cache empty.
            std::thread::sleep(Duration::from_millis(20));
            Counted(data_lines(content).count())
        }

        fn len(&self) -> usize {
            self.0
        }
    }

    #[test]
    fn test_concurrent_first_access_reads_once() {
        let path = temp_file("concurrent", "a\nb\nc\n");
        let cache: DatasetCache<Counted> = DatasetCache::new("test", Some(path.clone()));
        let barrier = Barrier::new(16);

        let sizes: Vec<usize> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..16)
                .map(|_| {
                    scope.spawn(|| {
                        barrier.wait();
                        cache.get().len()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(sizes.iter().all(|&n| n == 3));
        assert_eq!(PARSES.load(Ordering::SeqCst), 1);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_missing_file_degrades_to_empty() {
        let cache: DatasetCache<Lines> =
            DatasetCache::new("test", Some(PathBuf::from("/nonexistent/riskgate/list.txt")));
        assert!(cache.get().is_empty());
        assert!(cache.is_loaded());
        assert!(cache.reload().is_err());
    }

    #[test]
    fn test_injected_dataset_wins_over_file() {
        let cache: DatasetCache<Lines> = DatasetCache::new("test", None);
        assert_eq!(cache.load_from_str("x\ny\nz"), 3);
        assert_eq!(cache.loaded_len(), 3);
        assert!(matches!(cache.reload(), Err(DatasetError::NoSource("test"))));
        assert_eq!(cache.get().len(), 3);
    }
}
