//! Error types shared by every relay component.

use protocol::ProtocolError;
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Failed to read config {0}: {1}")]
    ConfigRead(PathBuf, io::Error),

    #[error("Failed to write config {0}: {1}")]
    ConfigWrite(PathBuf, io::Error),

    #[error("Could not parse config {0}: {1}")]
    ConfigParse(PathBuf, serde_json::Error),

    #[error("Could not serialize config: {0}")]
    ConfigSerialize(serde_json::Error),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Unknown handler: {0}")]
    UnknownHandler(String),

    #[error("Failed to open log {0}: {1}")]
    LogOpen(PathBuf, io::Error),

    #[error("Failed to read log {0}: {1}")]
    LogRead(PathBuf, io::Error),

    #[error("Could not resolve address {0}")]
    Resolve(String),

    #[error("No status response from {0} within {1:?}")]
    ProbeTimeout(String, Duration),

    #[error("Network error: {0}")]
    Network(#[from] io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}
