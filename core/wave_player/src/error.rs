use std::io;

use thiserror::Error;
use wave_file::{FormatTag, ParseError};

use crate::device_manager::DeviceError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Device(#[from] DeviceError),
    #[error("Invalid buffer ring: {buffer_count} buffers of {buffer_size} bytes")]
    InvalidRing {
        buffer_size: usize,
        buffer_count: usize,
    },
    #[error("Failed to spawn producer thread: {0}")]
    Spawn(#[source] io::Error),
}

#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("Failed to read file: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("Only 'Pulse Code Modulation' (PCM) files are supported, found {0}")]
    UnsupportedEncoding(FormatTag),
    #[error("Invalid 'Waveform Audio File' (.wav) file")]
    EmptyData,
    #[error("No file is open")]
    NoFileOpen,
    #[error(transparent)]
    Engine(#[from] EngineError),
}
