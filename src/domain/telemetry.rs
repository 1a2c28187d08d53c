// Telemetry data domain models
use serde::Serialize;

/// Series identifiers are plain, case-sensitive strings.
pub type SeriesKey = String;

pub const DEFAULT_SERIAL_PORT: &str = "/dev/ttyACM0";
pub const DEFAULT_MAP_WIDTH: usize = 100;
pub const DEFAULT_MAP_HEIGHT: usize = 100;

/// A single sample. The timestamp is whatever the producer stamped (ms).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DataPoint {
    pub timestamp: i64,
    pub value: f64,
}

impl DataPoint {
    pub fn new(timestamp: i64, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Row-major ESDF distance grid.
#[derive(Debug, Clone, PartialEq)]
pub struct MapSnapshot {
    pub width: usize,
    pub height: usize,
    pub grid: Vec<f64>,
}

impl MapSnapshot {
    pub fn new(width: usize, height: usize, grid: Vec<f64>) -> Self {
        Self {
            width,
            height,
            grid,
        }
    }

    pub fn zeroed(width: usize, height: usize) -> Self {
        Self::new(width, height, vec![0.0; width * height])
    }

    /// Number of cells the declared dimensions require, `None` on overflow.
    pub fn expected_len(&self) -> Option<usize> {
        self.width.checked_mul(self.height)
    }

    pub fn is_consistent(&self) -> bool {
        self.expected_len() == Some(self.grid.len())
    }

    pub fn distance_at(&self, x: usize, y: usize) -> Option<f64> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.grid.get(y * self.width + x).copied()
    }
}

impl Default for MapSnapshot {
    fn default() -> Self {
        Self::zeroed(DEFAULT_MAP_WIDTH, DEFAULT_MAP_HEIGHT)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SystemStatusSnapshot {
    pub backend_connected: bool,
    pub shm_active: bool,
    pub serial_port: String,
    pub nuc_cpu_load: f64,
    pub nuc_temp: f64,
}

impl Default for SystemStatusSnapshot {
    fn default() -> Self {
        Self {
            backend_connected: false,
            shm_active: false,
            serial_port: DEFAULT_SERIAL_PORT.to_string(),
            nuc_cpu_load: 0.0,
            nuc_temp: 0.0,
        }
    }
}

/// Tuning parameters pushed to the backend. Unset fields are left out of the frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ControlUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid_i: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid_d: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exposure: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fire_enabled: Option<bool>,
}

impl ControlUpdate {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}
