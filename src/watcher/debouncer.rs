//! Coalesces bursts of modification events per file.
//!
//! Editors often write a file several times per save; the index only needs
//! to hear about it once the file has been quiet for a while.

use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct Debouncer {
    /// Path -> time of the latest write seen.
    pending: HashMap<String, Instant>,
    quiet: Duration,
}

impl Debouncer {
    pub fn new(debounce_ms: u64) -> Self {
        Self {
            pending: HashMap::new(),
            quiet: Duration::from_millis(debounce_ms),
        }
    }

    /// Note a write to `path`, restarting its quiet period.
    pub fn record(&mut self, path: impl Into<String>) {
        self.pending.insert(path.into(), Instant::now());
    }

    /// Forget `path`; a removal supersedes any pending modification.
    pub fn remove(&mut self, path: &str) -> bool {
        self.pending.remove(path).is_some()
    }

    /// Paths quiet for the whole debounce period, sorted.
    pub fn take_ready(&mut self) -> Vec<String> {
        self.take_ready_at(Instant::now())
    }

    fn take_ready_at(&mut self, now: Instant) -> Vec<String> {
        let quiet = self.quiet;
        let mut ready = Vec::new();
        self.pending.retain(|path, last| {
            if now.duration_since(*last) >= quiet {
                ready.push(path.clone());
                false
            } else {
                true
            }
        });
        ready.sort();
        ready
    }

    /// Time until the earliest pending path becomes ready.
    pub fn next_deadline(&self) -> Option<Duration> {
        let now = Instant::now();
        self.pending
            .values()
            .map(|last| (*last + self.quiet).saturating_duration_since(now))
            .min()
    }

    /// Everything pending, regardless of age. Used on shutdown.
    pub fn flush(&mut self) -> Vec<String> {
        let mut all: Vec<String> = self.pending.drain().map(|(path, _)| path).collect();
        all.sort();
        all
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}
