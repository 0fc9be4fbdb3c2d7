//! Bounded round history
//!
//! Newest entries sit at the front; pushing past capacity evicts the oldest.

use super::types::{Multiplier, RoundResult};
use crate::config::HistoryConfig;
use std::collections::VecDeque;

/// Fixed-capacity FIFO window, newest first
#[derive(Debug, Clone)]
pub struct BoundedWindow<T> {
    entries: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedWindow<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Insert at the front, returning the evicted oldest entry if any
    pub fn push(&mut self, entry: T) -> Option<T> {
        if self.capacity == 0 {
            return Some(entry);
        }
        self.entries.push_front(entry);
        if self.entries.len() > self.capacity {
            self.entries.pop_back()
        } else {
            None
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<&T> {
        self.entries.front()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }
}

impl<T: Clone> BoundedWindow<T> {
    pub fn to_vec(&self) -> Vec<T> {
        self.entries.iter().cloned().collect()
    }
}

/// Recent crash points plus full round results
#[derive(Debug, Clone)]
pub struct RoundHistory {
    recent: BoundedWindow<Multiplier>,
    results: BoundedWindow<RoundResult>,
}

impl RoundHistory {
    pub fn new(config: &HistoryConfig) -> Self {
        Self {
            recent: BoundedWindow::new(config.recent_capacity),
            results: BoundedWindow::new(config.history_capacity),
        }
    }

    pub fn record(&mut self, result: RoundResult) {
        self.recent.push(result.crash_point);
        self.results.push(result);
    }

    pub fn recent_crash_points(&self) -> Vec<Multiplier> {
        self.recent.to_vec()
    }

    pub fn results(&self) -> Vec<RoundResult> {
        self.results.to_vec()
    }

    pub fn last_result(&self) -> Option<&RoundResult> {
        self.results.latest()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(round_id: u64, hundredths: u32) -> RoundResult {
        RoundResult {
            round_id,
            crash_point: Multiplier::from_hundredths(hundredths),
            timestamp: 0,
            players: vec![],
        }
    }

    #[test]
    fn test_window_evicts_oldest() {
        let mut window = BoundedWindow::new(3);
        assert_eq!(window.push(1), None);
        assert_eq!(window.push(2), None);
        assert_eq!(window.push(3), None);
        assert_eq!(window.push(4), Some(1));
        assert_eq!(window.push(5), Some(2));
        assert_eq!(window.len(), 3);
        assert_eq!(window.to_vec(), vec![5, 4, 3]);
    }

    #[test]
    fn test_history_respects_capacities() {
        let mut history = RoundHistory::new(&HistoryConfig::default());
        for round in 1..=25u64 {
            history.record(result(round, 100 + round as u32));
        }

        let recent = history.recent_crash_points();
        assert_eq!(recent.len(), 10);
        assert_eq!(recent[0], Multiplier::from_hundredths(125));
        assert_eq!(recent[9], Multiplier::from_hundredths(116));

        let results = history.results();
        assert_eq!(results.len(), 20);
        assert_eq!(results[0].round_id, 25);
        assert_eq!(results[19].round_id, 6);
        assert_eq!(history.last_result().map(|r| r.round_id), Some(25));
    }
}
