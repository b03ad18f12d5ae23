use std::sync::Arc;

use super::{CompletionRegistry, PlaybackBuffer};
use crate::device_manager::{DeviceError, OutputDevice};

/// Fixed pool of buffers used round-robin.
///
/// `advance` is the producer's only backpressure point: it never hands out a
/// slot whose previous submission is still playing, so at most `len()`
/// buffers are queued on the device at any time.
#[derive(Debug)]
pub struct BufferRing {
    buffers: Vec<PlaybackBuffer>,
    current: Option<usize>,
}

impl BufferRing {
    /// Acquires `buffer_count` buffers of `buffer_size` bytes each. If any
    /// acquisition fails, the ones already acquired are released before the
    /// error is returned.
    ///
    /// # Panics
    /// If `buffer_count` is zero.
    pub fn allocate(
        device: &Arc<dyn OutputDevice>,
        registry: &Arc<CompletionRegistry>,
        buffer_size: usize,
        buffer_count: usize,
    ) -> Result<Self, DeviceError> {
        assert!(buffer_count > 0, "a buffer ring needs at least one buffer");

        let mut buffers = Vec::with_capacity(buffer_count);
        for _ in 0..buffer_count {
            match PlaybackBuffer::acquire(device, registry, buffer_size) {
                Ok(buffer) => buffers.push(buffer),
                Err(err) => {
                    log::warn!(
                        "Buffer allocation failed after {} of {buffer_count}: {err}",
                        buffers.len()
                    );
                    for buffer in buffers {
                        if let Err(release_err) = buffer.release() {
                            log::warn!("Failed to release partial ring: {release_err}");
                        }
                    }
                    return Err(err);
                }
            }
        }

        log::debug!("Allocated {buffer_count} buffers of {buffer_size} bytes");
        Ok(Self {
            buffers,
            current: None,
        })
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    /// Moves to the next slot and blocks until its storage is safe to
    /// overwrite.
    pub fn advance(&mut self) -> &mut PlaybackBuffer {
        let next = self.current.map_or(0, |index| (index + 1) % self.buffers.len());
        self.current = Some(next);

        let buffer = &mut self.buffers[next];
        buffer.await_completion();
        buffer
    }

    /// Waits for every buffer to go idle, then releases each one exactly
    /// once, walking the ring a single cycle from the current slot. The first
    /// release error is returned after all buffers have been attempted.
    pub fn release_all(self) -> Result<(), DeviceError> {
        let mut buffers = self.buffers;
        if let Some(current) = self.current {
            buffers.rotate_left(current);
        }

        for buffer in &buffers {
            buffer.await_completion();
        }

        let mut first_err = None;
        for buffer in buffers {
            let token = buffer.token();
            if let Err(err) = buffer.release() {
                log::warn!("Failed to release buffer {token}: {err}");
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}
