use std::io;
use std::num::{ParseFloatError, ParseIntError};
use thiserror::Error;
use std::str::Utf8Error;
use btleplug;
use serde_json;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to determine path to config file")]
    NoConfigPath,

    #[error("Failed to acquire file lock on config file: {source}")]
    CanNotLock { source: io::Error },

    #[error("Failed to decode config as utf-8: {source}")]
    Utf8Error { #[from] source: Utf8Error },

    #[error("Failed to read config file: {source}")]
    IOError { #[from] source: io::Error },

    #[error("Failed to parse config file: {source}")]
    JsonError { #[from] source: serde_json::Error },
}

impl ConfigError {
    pub fn is_file_not_found_error(&self) -> bool {
        match self {
            ConfigError::IOError { source } => source.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum AppRunError {
    #[error("Failed to start (config): {source}")]
    ConfigError { #[from] source: ConfigError },

    #[error("Failed to start (bluetooth): {source}")]
    DeviceError { #[from] source: DeviceError },

    #[error("Failed to start (battery): {source}")]
    BatteryError { #[from] source: BatteryError },

    #[error("Failed to start (tokio runtime): {source}")]
    Runtime { source: io::Error },

    #[error("{source}")]
    Link { #[from] source: LinkError },
}

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Error communicating with device (btleplug): {source}")]
    Btle { #[from] source: btleplug::Error },

    #[error("No bluetooth adapter is available")]
    NoAdapter,

    #[error("A required bluetooth characteristic is not available")]
    MissingCharacteristic,
}

#[derive(Error, Debug)]
pub enum BatteryError {
    #[error("Failed to read battery state: {source}")]
    IOError { #[from] source: io::Error },

    #[error("Failed to parse battery capacity: {source}")]
    ParseError { #[from] source: ParseIntError },
}

/// Outcome of a lifecycle transition or a write, as observed by callers and the status slot.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("Scan timed out. Please try again.")]
    ScanTimeout,

    #[error("Failed to connect: {0}")]
    ConnectFailed(String),

    #[error("The peripheral disconnected unexpectedly")]
    UnexpectedDisconnect,

    #[error("Not connected to the peripheral")]
    NotConnected,

    #[error("Failed to write to the peripheral: {0}")]
    WriteFailed(String),

    #[error("The connection controller is no longer running")]
    ControllerStopped,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArgumentError {
    #[error("LED routine index {0} is out of range (0-5)")]
    RoutineOutOfRange(usize),

    #[error("LED routine must be an index between 0 and 5: {source}")]
    InvalidRoutine { #[from] source: ParseIntError },

    #[error("Battery level must be a number between 0 and 1: {source}")]
    InvalidLevel { #[from] source: ParseFloatError },
}
