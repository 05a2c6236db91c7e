//! Error types for ballpath

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// ballpath error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// USB transport error
    #[cfg(feature = "usb")]
    #[error("USB error: {0}")]
    Usb(#[from] rusb::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration rejected by validation
    #[error("Configuration error: {0}")]
    Config(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// Sensor model name not present in the registry
    #[error("Unsupported sensor model: '{0}'")]
    UnsupportedSensor(String),

    /// Fewer attached devices than the requested ordinal needs
    #[error("Insufficient devices for {model}: requested ordinal {requested}, found {found}")]
    InsufficientDevices {
        /// Registry name of the sensor model
        model: String,
        /// Zero-based ordinal that was requested
        requested: usize,
        /// Number of matching devices present
        found: usize,
    },

    /// Raw report of the wrong length for its decoder
    #[error("Malformed {model} report: expected {expected} bytes, got {actual}")]
    MalformedReport {
        /// Registry name of the sensor model
        model: &'static str,
        /// Report length the decoder needs
        expected: usize,
        /// Report length received
        actual: usize,
    },

    /// Session state machine refused a transition
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// Recording output failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Transport read timed out with no report
    #[error("Read timeout")]
    Timeout,

    /// A worker thread panicked
    #[error("Worker thread panicked")]
    ThreadPanic,

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}
