use std::io;

use thiserror::Error;

use crate::chunk::ChunkId;

/// Reasons a byte stream is not an acceptable WAVE container.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Invalid file format: expected '{expected}' tag, found '{found}'")]
    BadMagic { expected: ChunkId, found: ChunkId },

    #[error("Invalid file format: format chunk is {0} bytes, only 16-byte PCM descriptors are supported")]
    UnsupportedFormatChunk(i32),

    #[error("Invalid file format: no 'data' chunk")]
    NoDataChunk,

    #[error("Failed to read WAVE header: {0}")]
    Io(#[from] io::Error),
}

pub type ParseResult<T> = Result<T, ParseError>;
