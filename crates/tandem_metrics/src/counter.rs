//! Named counters for tracking bridge events

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug)]
pub struct Counter {
    counters: Mutex<HashMap<String, usize>>,
}

impl Counter {
    pub fn new() -> Self {
        Self {
            counters: Mutex::new(HashMap::new()),
        }
    }

    fn counters(&self) -> MutexGuard<'_, HashMap<String, usize>> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn increment(&self, name: &str, value: usize) {
        *self.counters().entry(name.to_string()).or_insert(0) += value;
    }

    pub fn get(&self, name: &str) -> usize {
        self.counters().get(name).copied().unwrap_or(0)
    }

    /// All counters, sorted by name.
    pub fn snapshot(&self) -> Vec<(String, usize)> {
        let mut entries: Vec<_> = self
            .counters()
            .iter()
            .map(|(name, value)| (name.clone(), *value))
            .collect();
        entries.sort();
        entries
    }
}

impl Default for Counter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_and_snapshot() {
        let counter = Counter::new();
        counter.increment("wrap", 2);
        counter.increment("release", 1);
        counter.increment("wrap", 1);

        assert_eq!(counter.get("wrap"), 3);
        assert_eq!(counter.get("missing"), 0);
        assert_eq!(
            counter.snapshot(),
            vec![("release".to_string(), 1), ("wrap".to_string(), 3)]
        );
    }

    #[test]
    fn test_shared_across_threads() {
        let counter = Counter::new();
        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..100 {
                        counter.increment("crossing", 1);
                    }
                });
            }
        });
        assert_eq!(counter.get("crossing"), 400);
    }
}
