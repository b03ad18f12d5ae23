/// Bytes per playback buffer.
pub const DEFAULT_BUFFER_SIZE: usize = 16_384;

/// Buffers in the ring, i.e. how many writes may be queued ahead of the device.
pub const DEFAULT_BUFFER_COUNT: usize = 3;

pub const PRODUCER_THREAD_PREFIX: &str = "wave-producer";

pub const STREAM_THREAD_NAME: &str = "wave-out-stream";

#[cfg(test)]
pub const AUDIO_SAMPLE_EPSILON: f32 = 1e-6;
