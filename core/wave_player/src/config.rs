use crate::constants::{DEFAULT_BUFFER_COUNT, DEFAULT_BUFFER_SIZE};

/// Output device and buffering used by a [`Player`](crate::player::Player).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerConfig {
    /// `None` selects the host's default output device
    pub device_name: Option<String>,
    /// bytes per ring buffer
    pub buffer_size: usize,
    pub buffer_count: usize,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            device_name: None,
            buffer_size: DEFAULT_BUFFER_SIZE,
            buffer_count: DEFAULT_BUFFER_COUNT,
        }
    }
}

impl PlayerConfig {
    pub fn with_device_name(mut self, name: impl Into<String>) -> Self {
        self.device_name = Some(name.into());
        self
    }

    pub const fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub const fn with_buffer_count(mut self, buffer_count: usize) -> Self {
        self.buffer_count = buffer_count;
        self
    }
}
