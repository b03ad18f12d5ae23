//! RIFF/WAVE container parsing.
//!
//! [`PcmContainerReader`] validates a WAVE header and exposes the PCM payload
//! as a bounded `Read + Seek` source; [`WaveFormat`] describes its layout.

pub mod chunk;
pub mod error;
pub mod format;
pub mod reader;

pub use chunk::ChunkId;
pub use error::{ParseError, ParseResult};
pub use format::{FormatTag, WaveFormat};
pub use reader::PcmContainerReader;
