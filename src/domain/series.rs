use std::collections::VecDeque;

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// A single timestamped sample (epoch milliseconds)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPoint<T> {
    pub timestamp: i64,
    pub data: T,
}

impl<T> TimeSeriesPoint<T> {
    pub fn new(timestamp: i64, data: T) -> Self {
        Self { timestamp, data }
    }

    pub fn now(data: T) -> Self {
        Self::new(Utc::now().timestamp_millis(), data)
    }
}

/// Fixed-capacity FIFO of samples. Oldest points are evicted first.
#[derive(Debug, Clone)]
pub struct RollingHistory<T> {
    points: VecDeque<TimeSeriesPoint<T>>,
    capacity: usize,
}

impl<T: Clone> RollingHistory<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            points: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, point: TimeSeriesPoint<T>) {
        self.points.push_back(point);

        while self.points.len() > self.capacity {
            self.points.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Owned copy of the points in insertion order
    pub fn to_vec(&self) -> Vec<TimeSeriesPoint<T>> {
        self.points.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_last_points_in_order() {
        let mut history = RollingHistory::new(3);
        for (i, value) in [10, 20, 30, 40, 50].into_iter().enumerate() {
            history.push(TimeSeriesPoint::new(i as i64, value));
        }

        let data: Vec<_> = history.to_vec().into_iter().map(|p| p.data).collect();
        assert_eq!(data, vec![30, 40, 50]);
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn test_length_never_exceeds_capacity() {
        for n in 0..12 {
            let mut history = RollingHistory::new(5);
            for i in 0..n {
                history.push(TimeSeriesPoint::new(i, i));
            }
            assert_eq!(history.len(), n.min(5) as usize);
        }
    }

    #[test]
    fn test_to_vec_is_detached() {
        let mut history = RollingHistory::new(4);
        history.push(TimeSeriesPoint::new(1, 1.0));

        let mut copy = history.to_vec();
        copy.push(TimeSeriesPoint::new(2, 2.0));
        copy[0].data = 99.0;

        assert_eq!(history.len(), 1);
        assert_eq!(history.to_vec()[0].data, 1.0);
    }
}
