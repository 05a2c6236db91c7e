//! Configuration for ballpath
//!
//! Loads configuration from a TOML file. Every value that the session freezes
//! at start (sampling rate, ball radius, calibration factor, mount geometry)
//! lives here so a rig can be re-tuned without a rebuild.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub sensor: SensorConfig,
    pub tracking: TrackingConfig,
    pub display: DisplayConfig,
    pub recording: RecordingConfig,
    pub logging: LoggingConfig,
}

/// Which sensor model to bind and which attached units to use
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SensorConfig {
    /// Registry name, e.g. "Logitech G102"
    pub model: String,
    /// Zero-based ordinal of the primary sensor among matching devices
    pub primary_ordinal: usize,
    /// Zero-based ordinal of the secondary sensor among matching devices
    pub secondary_ordinal: usize,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            model: "Logitech G102".to_string(),
            primary_ordinal: 0,
            secondary_ordinal: 1,
        }
    }
}

/// Sign applied to one sensor axis before fusion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    #[default]
    Normal,
    Inverted,
}

impl Polarity {
    /// Multiplier for this polarity (+1.0 or -1.0)
    #[inline]
    pub fn sign(self) -> f64 {
        match self {
            Polarity::Normal => 1.0,
            Polarity::Inverted => -1.0,
        }
    }
}

/// Axis convention of the mounting rig.
///
/// The secondary sensor's y axis is mirrored on the reference rig; other rigs
/// mount it the other way round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct AxisConfig {
    pub primary_x: Polarity,
    pub primary_y: Polarity,
    pub secondary_y: Polarity,
}

impl Default for AxisConfig {
    fn default() -> Self {
        Self {
            primary_x: Polarity::Normal,
            primary_y: Polarity::Normal,
            secondary_y: Polarity::Inverted,
        }
    }
}

/// Dead-reckoning parameters, frozen when a session starts
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Fusion tick rate (Hz)
    pub sample_rate_hz: f64,
    /// Effective ball radius
    pub ball_radius: f64,
    /// Counts-to-rate calibration factor
    pub calibration_factor: f64,
    /// Angle between the sensor measurement axis and the forward axis (degrees)
    pub mount_angle_deg: f64,
    pub axes: AxisConfig,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 100.0,
            ball_radius: 1.0,
            calibration_factor: 1.0,
            mount_angle_deg: 63.5,
            axes: AxisConfig::default(),
        }
    }
}

impl TrackingConfig {
    /// Tick period derived from the sample rate
    pub fn tick_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.sample_rate_hz)
    }

    /// φ = 90° − mount angle, in radians
    pub fn mount_complement_rad(&self) -> f64 {
        (90.0 - self.mount_angle_deg).to_radians()
    }

    /// Validate the parameters a session would freeze
    pub fn validate(&self) -> Result<()> {
        if !self.sample_rate_hz.is_finite() || self.sample_rate_hz <= 0.0 {
            return Err(Error::Config(format!(
                "sample_rate_hz must be a positive number, got {}",
                self.sample_rate_hz
            )));
        }
        if !self.ball_radius.is_finite() || self.ball_radius == 0.0 {
            return Err(Error::Config(format!(
                "ball_radius must be a finite non-zero number, got {}",
                self.ball_radius
            )));
        }
        if !self.calibration_factor.is_finite() {
            return Err(Error::Config(format!(
                "calibration_factor must be finite, got {}",
                self.calibration_factor
            )));
        }
        if !self.mount_angle_deg.is_finite() || self.mount_complement_rad().cos().abs() < 1e-9 {
            return Err(Error::Config(format!(
                "mount_angle_deg {} leaves no usable sensor decomposition",
                self.mount_angle_deg
            )));
        }
        Ok(())
    }
}

/// Live display settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Half-size of the square view window
    pub canvas_half_size: f64,
    /// Number of recent samples kept for the live trail
    pub history_capacity: usize,
    /// Refresh period of the live view (ms)
    pub refresh_ms: u64,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            canvas_half_size: 100.0,
            history_capacity: 1000,
            refresh_ms: 40,
        }
    }
}

impl DisplayConfig {
    pub fn refresh_period(&self) -> Duration {
        Duration::from_millis(self.refresh_ms)
    }
}

/// On-disk layout of a recorded session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordLayout {
    /// Three append-only CSV tables flushed during the session
    #[default]
    Csv,
    /// Three NumPy arrays written once at session end
    Npy,
}

impl std::str::FromStr for RecordLayout {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(RecordLayout::Csv),
            "npy" => Ok(RecordLayout::Npy),
            other => Err(Error::Config(format!("unknown record layout '{}'", other))),
        }
    }
}

/// Recording settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Root under which `runs/<timestamp>/` directories are created
    pub output_dir: PathBuf,
    pub layout: RecordLayout,
    /// Period of the persistence flush (ms)
    pub flush_interval_ms: u64,
    /// Capacity of each pending-record buffer between flushes.
    ///
    /// If the tick rate fills this faster than `flush_interval_ms` drains it,
    /// the oldest pending rows are evicted.
    pub buffer_capacity: usize,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            layout: RecordLayout::Csv,
            flush_interval_ms: 1000,
            buffer_capacity: 500,
        }
    }
}

impl RecordingConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from TOML file
    ///
    /// # Example
    /// ```no_run
    /// use ballpath::config::AppConfig;
    ///
    /// let config = AppConfig::from_file("ballpath.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        self.tracking.validate()?;

        if self.sensor.primary_ordinal == self.sensor.secondary_ordinal {
            return Err(Error::Config(
                "primary and secondary sensors must use different ordinals".to_string(),
            ));
        }
        if !self.display.canvas_half_size.is_finite() || self.display.canvas_half_size <= 0.0 {
            return Err(Error::Config(
                "canvas_half_size must be a positive number".to_string(),
            ));
        }
        if self.display.history_capacity == 0 || self.recording.buffer_capacity == 0 {
            return Err(Error::Config("buffer capacities must be non-zero".to_string()));
        }
        if self.display.refresh_ms == 0 || self.recording.flush_interval_ms == 0 {
            return Err(Error::Config("periods must be non-zero".to_string()));
        }
        Ok(())
    }
}
