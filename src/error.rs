use std::io;
use std::str::Utf8Error;
use thiserror::Error;
use btleplug;
use serde_json;
use uuid::Uuid;

use crate::device::types::Field;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to encode/decode config as utf-8: {source}")]
    Utf8Error { #[from] source: Utf8Error },

    #[error("Failed to read config file: {source}")]
    IOError { #[from] source: io::Error },

    #[error("Failed to parse config file: {source}")]
    JsonError { #[from] source: serde_json::Error },
}

#[derive(Error, Debug)]
pub enum AppRunError {
    #[error("Failed to start application (config): {source}")]
    ConfigError { #[from] source: ConfigError },

    #[error("Failed to start application (io): {source}")]
    IOError { #[from] source: io::Error },
}

/// Faults reported by a [`Transport`](crate::device::transport::Transport) implementation.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Error communicating with device (btleplug): {source}")]
    Btle { #[from] source: btleplug::Error },

    #[error("No bluetooth adapter is available")]
    NoAdapter,

    #[error("Bluetooth has not been initialized")]
    NotInitialized,

    #[error("Device {device_id} has not been discovered")]
    UnknownDevice { device_id: String },

    #[error("Device {device_id} is not connected")]
    NotConnected { device_id: String },

    #[error("A required bluetooth characteristic is not available: {uuid}")]
    MissingCharacteristic { uuid: Uuid },

    #[error("{0}")]
    Simulated(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Init,
    Scan,
    Connect,
    Disconnect,
    Read,
    Write,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let result = match self {
            Operation::Init => "initialize",
            Operation::Scan => "scan",
            Operation::Connect => "connect",
            Operation::Disconnect => "disconnect",
            Operation::Read => "read",
            Operation::Write => "write",
        };

        write!(f, "{}", result)
    }
}

/// A user visible failure of one session operation.
///
/// The message is captured as text so that the error can be cloned into state snapshots.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OperationError {
    #[error("Failed to initialize bluetooth: {message}")]
    InitError { message: String },

    #[error("Failed to scan for devices: {message}")]
    ScanError { message: String },

    #[error("Failed to connect to {device_id}: {message}")]
    ConnectError { device_id: String, message: String },

    #[error("Failed to disconnect from {device_id}: {message}")]
    DisconnectError { device_id: String, message: String },

    #[error("Failed to read {field} from {device_id}: {message}")]
    ReadError { device_id: String, field: Field, message: String },

    #[error("Failed to write {field} to {device_id}: {message}")]
    WriteError { device_id: String, field: Field, message: String },
}

impl OperationError {
    pub fn init(source: &TransportError) -> Self {
        OperationError::InitError { message: source.to_string() }
    }

    pub fn scan(source: &TransportError) -> Self {
        OperationError::ScanError { message: source.to_string() }
    }

    pub fn connect(device_id: &str, source: &TransportError) -> Self {
        OperationError::ConnectError { device_id: device_id.to_string(), message: source.to_string() }
    }

    pub fn disconnect(device_id: &str, source: &TransportError) -> Self {
        OperationError::DisconnectError { device_id: device_id.to_string(), message: source.to_string() }
    }

    pub fn read(device_id: &str, field: Field, source: &TransportError) -> Self {
        OperationError::ReadError { device_id: device_id.to_string(), field, message: source.to_string() }
    }

    pub fn write(device_id: &str, field: Field, source: &TransportError) -> Self {
        OperationError::WriteError { device_id: device_id.to_string(), field, message: source.to_string() }
    }

    pub fn operation(&self) -> Operation {
        match self {
            OperationError::InitError { .. } => Operation::Init,
            OperationError::ScanError { .. } => Operation::Scan,
            OperationError::ConnectError { .. } => Operation::Connect,
            OperationError::DisconnectError { .. } => Operation::Disconnect,
            OperationError::ReadError { .. } => Operation::Read,
            OperationError::WriteError { .. } => Operation::Write,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            OperationError::InitError { message }
            | OperationError::ScanError { message }
            | OperationError::ConnectError { message, .. }
            | OperationError::DisconnectError { message, .. }
            | OperationError::ReadError { message, .. }
            | OperationError::WriteError { message, .. } => message,
        }
    }
}

/// An intent that the session refused without touching the transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IntentRejected {
    #[error("A scan is already in progress")]
    ScanInProgress,

    #[error("Device {device_id} is not in the list of discovered devices")]
    UnknownDevice { device_id: String },

    #[error("No device is connected")]
    NotConnected,

    #[error("The {field} field must not be empty")]
    IncompleteRecord { field: Field },
}
