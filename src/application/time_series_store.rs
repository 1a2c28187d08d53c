// Time series store - one bounded ring buffer per series key
use crate::domain::telemetry::{DataPoint, SeriesKey};
use std::collections::{HashMap, VecDeque};

pub const DEFAULT_CAPACITY: usize = 240;

/// Fixed-capacity FIFO of points. Keeps append order; never re-sorts by timestamp.
#[derive(Debug, Clone)]
pub struct SeriesBuffer {
    points: VecDeque<DataPoint>,
    capacity: usize,
}

impl SeriesBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            points: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, point: DataPoint) {
        if self.points.len() == self.capacity {
            self.points.pop_front();
        }
        self.points.push_back(point);
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &DataPoint> + ExactSizeIterator {
        self.points.iter()
    }

    /// The most recent `n` points, oldest first.
    pub fn tail(&self, n: usize) -> impl Iterator<Item = &DataPoint> {
        self.points.iter().skip(self.points.len().saturating_sub(n))
    }

    pub fn latest(&self) -> Option<&DataPoint> {
        self.points.back()
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

    pub fn to_vec(&self) -> Vec<DataPoint> {
        self.points.iter().copied().collect()
    }
}

#[derive(Debug, Clone)]
pub struct TimeSeriesStore {
    buffers: HashMap<SeriesKey, SeriesBuffer>,
    capacity: usize,
}

impl TimeSeriesStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffers: HashMap::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn append(&mut self, key: &str, point: DataPoint) {
        match self.buffers.get_mut(key) {
            Some(buffer) => buffer.push(point),
            None => {
                let mut buffer = SeriesBuffer::with_capacity(self.capacity);
                buffer.push(point);
                self.buffers.insert(key.to_string(), buffer);
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&SeriesBuffer> {
        self.buffers.get(key)
    }

    /// Owned copy of a series, empty when the key has never been seen.
    pub fn points(&self, key: &str) -> Vec<DataPoint> {
        self.get(key).map(SeriesBuffer::to_vec).unwrap_or_default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.buffers.contains_key(key)
    }

    pub fn series_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for TimeSeriesStore {
    fn default() -> Self {
        Self::new()
    }
}
