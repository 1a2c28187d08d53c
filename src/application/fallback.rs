// Fallback generator - synthetic frames while the backend is unreachable
use crate::domain::telemetry::{DEFAULT_MAP_HEIGHT, DEFAULT_MAP_WIDTH};
use crate::infrastructure::protocol::{DataMessage, InboundMessage, MapMessage};
use std::collections::BTreeMap;
use std::time::Duration;

pub const FALLBACK_SERIES: [&str; 5] = ["ekf_x", "ekf_y", "target_dist", "fps", "latency"];
pub const DEFAULT_TICK: Duration = Duration::from_millis(40);
pub const DEFAULT_MAP_EVERY: u64 = 5;

/// Produces plausible `data` and `map` frames as a pure function of time.
#[derive(Debug, Clone)]
pub struct FallbackGenerator {
    tick: Duration,
    map_every: u64,
    ticks: u64,
}

impl FallbackGenerator {
    pub fn new(tick: Duration, map_every: u64) -> Self {
        Self {
            tick,
            map_every: map_every.max(1),
            ticks: 0,
        }
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick
    }

    /// Frames for one tick: always a data frame, plus a map every `map_every` ticks.
    pub fn frames(&mut self, now_ms: i64) -> Vec<InboundMessage> {
        let mut frames = vec![InboundMessage::Data(Self::data_frame(now_ms))];
        if self.ticks % self.map_every == 0 {
            frames.push(InboundMessage::Map(Self::map_frame(now_ms)));
        }
        self.ticks += 1;
        frames
    }

    fn data_frame(now_ms: i64) -> DataMessage {
        let t = now_ms as f64 / 1000.0;
        let values = [
            3.0 * (t / 1.7).sin(),
            2.0 * (t / 2.3).cos(),
            4.0 + 1.5 * (t / 3.1).sin(),
            210.0 + 5.0 * (t * 2.0).sin(),
            4.0 + 1.5 * (t * 1.3).sin().abs(),
        ];
        let series: BTreeMap<String, f64> = FALLBACK_SERIES
            .iter()
            .zip(values)
            .map(|(key, value)| (key.to_string(), value))
            .collect();
        DataMessage {
            timestamp: now_ms,
            series,
        }
    }

    /// Distance to the nearer of a fixed obstacle and one orbiting around it.
    fn map_frame(now_ms: i64) -> MapMessage {
        let (width, height) = (DEFAULT_MAP_WIDTH, DEFAULT_MAP_HEIGHT);
        let cx = width as f64 / 2.0;
        let cy = height as f64 / 2.0;
        let orbit_x = cx + (now_ms as f64 / 1000.0).sin() * 20.0;
        let orbit_y = cy - 10.0;
        let grid = (0..width * height)
            .map(|i| {
                let x = (i % width) as f64;
                let y = (i / width) as f64;
                let fixed = (x - cx).hypot(y - cy);
                let moving = (x - orbit_x).hypot(y - orbit_y);
                fixed.min(moving) / 10.0
            })
            .collect();
        MapMessage {
            timestamp: now_ms,
            width,
            height,
            grid,
        }
    }
}

impl Default for FallbackGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_TICK, DEFAULT_MAP_EVERY)
    }
}
