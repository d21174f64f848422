use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default number of points kept for the glow trail.
pub const DEFAULT_TRAIL_CAPACITY: usize = 200;

/// Bounded FIFO of recent bob positions, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrailHistory {
    capacity: usize,
    points: VecDeque<(f64, f64)>,
}

impl Default for TrailHistory {
    fn default() -> Self {
        Self::new(DEFAULT_TRAIL_CAPACITY)
    }
}

impl TrailHistory {
    /// A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            points: VecDeque::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Appends a point, dropping the oldest once full.
    pub fn push(&mut self, x: f64, y: f64) {
        if self.points.len() == self.capacity {
            self.points.pop_front();
        }
        self.points.push_back((x, y));
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.points.iter().copied()
    }

    pub fn newest(&self) -> Option<(f64, f64)> {
        self.points.back().copied()
    }

    /// Separate x and y series, the shape line plots take.
    pub fn xs_ys(&self) -> (Vec<f64>, Vec<f64>) {
        self.points.iter().copied().unzip()
    }

    /// Interleaved `[x0, y0, x1, y1, ...]`.
    pub fn flattened(&self) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.points.len() * 2);
        for &(x, y) in &self.points {
            out.push(x);
            out.push(y);
        }
        out
    }
}
