// Chart view model - merges several series onto one timestamp axis for renderers
use crate::application::time_series_store::TimeSeriesStore;
use std::collections::BTreeMap;

pub const MAX_RENDER_POINTS: usize = 120;

/// One row per distinct timestamp; a series without a sample at that instant is `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartRow {
    pub timestamp: i64,
    pub values: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChartFrame {
    pub keys: Vec<String>,
    pub rows: Vec<ChartRow>,
}

impl ChartFrame {
    pub fn build(store: &TimeSeriesStore, keys: &[String], max_points: usize) -> Self {
        let mut timeline: BTreeMap<i64, Vec<Option<f64>>> = BTreeMap::new();
        for (column, key) in keys.iter().enumerate() {
            let Some(buffer) = store.get(key) else {
                continue;
            };
            for point in buffer.tail(max_points) {
                let row = timeline
                    .entry(point.timestamp)
                    .or_insert_with(|| vec![None; keys.len()]);
                row[column] = Some(point.value);
            }
        }

        let skip = timeline.len().saturating_sub(max_points);
        let rows = timeline
            .into_iter()
            .skip(skip)
            .map(|(timestamp, values)| ChartRow { timestamp, values })
            .collect();
        Self {
            keys: keys.to_vec(),
            rows,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Y-axis range over all finite values. A flat line gets padded so it
    /// does not collapse to a zero-height axis.
    pub fn value_domain(&self) -> Option<(f64, f64)> {
        let (min, max) = self
            .rows
            .iter()
            .flat_map(|row| row.values.iter().flatten())
            .filter(|v| v.is_finite())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(*v), hi.max(*v))
            });
        if !min.is_finite() || !max.is_finite() {
            return None;
        }
        if min == max {
            let pad = (min.abs() * 0.1).max(1.0);
            return Some((min - pad, max + pad));
        }
        Some((min, max))
    }
}
