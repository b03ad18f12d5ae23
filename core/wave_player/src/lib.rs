//! Looped WAV playback through a ring of device buffers.
//!
//! A [`PlaybackEngine`](engine::PlaybackEngine) keeps a fixed
//! [`BufferRing`](buffer::BufferRing) of buffers queued on an
//! [`OutputDevice`](device_manager::OutputDevice), refilled by a producer
//! thread as the device reports each one played. [`Player`](player::Player)
//! wires a parsed WAVE file into an engine.

pub mod buffer;
pub mod config;
pub mod constants;
pub mod device_manager;
pub mod engine;
pub mod error;
pub mod player;

pub use config::PlayerConfig;
pub use error::{EngineError, PlayerError};
pub use player::{Player, open_file};
