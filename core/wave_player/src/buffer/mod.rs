use std::sync::Arc;

use crate::device_manager::{BufferRegion, BufferToken, DeviceError, OutputDevice};

pub mod registry;
pub mod ring;
pub mod signal;

pub use registry::CompletionRegistry;
pub use ring::BufferRing;
pub use signal::CompletionSignal;

/// One fixed-size buffer registered with an output device.
///
/// The sample storage is prepared on the device for the whole lifetime of
/// the buffer and is never resized. While the buffer is in flight its bytes
/// belong to the device: filling asserts that the previous submission has
/// completed.
#[derive(Debug)]
pub struct PlaybackBuffer {
    device: Arc<dyn OutputDevice>,
    registry: Arc<CompletionRegistry>,
    token: BufferToken,
    region: Arc<BufferRegion>,
    signal: Arc<CompletionSignal>,
    released: bool,
}

impl PlaybackBuffer {
    /// Allocates `size` bytes and prepares them on `device`. The device must
    /// already be open.
    pub fn acquire(
        device: &Arc<dyn OutputDevice>,
        registry: &Arc<CompletionRegistry>,
        size: usize,
    ) -> Result<Self, DeviceError> {
        let (token, signal) = registry.register();
        let region = Arc::new(BufferRegion::new(size));

        if let Err(err) = device.prepare(token, Arc::clone(&region)) {
            registry.unregister(token);
            return Err(err);
        }

        Ok(Self {
            device: Arc::clone(device),
            registry: Arc::clone(registry),
            token,
            region,
            signal,
            released: false,
        })
    }

    pub const fn token(&self) -> BufferToken {
        self.token
    }

    pub fn len(&self) -> usize {
        self.region.len()
    }

    pub fn is_empty(&self) -> bool {
        self.region.is_empty()
    }

    pub fn is_in_flight(&self) -> bool {
        self.signal.is_in_flight()
    }

    /// Gives `fill` the whole sample storage.
    ///
    /// # Panics
    /// If the buffer is still in flight.
    pub fn fill_with<F>(&mut self, fill: F)
    where
        F: FnOnce(&mut [u8]),
    {
        assert!(
            !self.signal.is_in_flight(),
            "buffer {} filled while in flight",
            self.token
        );
        let mut bytes = self.region.lock();
        fill(&mut bytes);
    }

    /// Queues the buffer on the device. A rejected write is not an error for
    /// the caller: the buffer simply stays idle and `false` is returned.
    pub fn submit(&self) -> bool {
        // in flight before the device can possibly complete it
        self.signal.begin();
        match self.device.write(self.token) {
            Ok(()) => true,
            Err(err) => {
                self.signal.complete();
                log::warn!("Write of buffer {} rejected: {err}", self.token);
                false
            }
        }
    }

    /// Blocks until the last submission completed. Returns immediately if
    /// the buffer is idle.
    pub fn await_completion(&self) {
        self.signal.wait();
    }

    /// Waits for any outstanding submission, then unregisters the buffer
    /// from the device and frees its storage.
    pub fn release(mut self) -> Result<(), DeviceError> {
        self.await_completion();
        self.released = true;
        self.registry.unregister(self.token);
        self.device.unprepare(self.token)
    }
}

impl Drop for PlaybackBuffer {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.registry.unregister(self.token);
        if let Err(err) = self.device.unprepare(self.token) {
            log::debug!("Dropping buffer {} without release: {err}", self.token);
        }
    }
}
