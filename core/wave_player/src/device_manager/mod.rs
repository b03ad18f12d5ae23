use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError},
};

use thiserror::Error;
use wave_file::WaveFormat;

pub mod cpal_dm;
pub mod pcm;

#[cfg(test)]
pub(crate) mod fake;

/// Stable identifier the device uses to report which buffer finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferToken(pub u32);

impl fmt::Display for BufferToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Invoked by the device, on its own execution context, once for every
/// write that finished playing or was aborted by a reset. Must not block.
pub type CompletionHandler = Arc<dyn Fn(BufferToken) + Send + Sync>;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DeviceError {
    #[error("No audio output device available")]
    DeviceNotFound,
    #[error("Audio output device '{0}' not found")]
    NamedDeviceNotFound(String),
    #[error("Failed to build output stream: {0}")]
    StreamBuildFailed(String),
    #[error("Failed to start output stream: {0}")]
    StreamStartFailed(String),
    #[error("Unsupported output format: {0}")]
    UnsupportedFormat(String),
    #[error("Output device is not open")]
    NotOpen,
    #[error("Output device is already open")]
    AlreadyOpen,
    #[error("Buffer {0} is not prepared on this device")]
    NotPrepared(BufferToken),
    #[error("Buffer {0} is still queued for playback")]
    StillPlaying(BufferToken),
    #[error("Output device call failed with code {0}")]
    Native(i32),
}

/// Fixed-size sample storage shared between a buffer and the device.
///
/// The allocation never moves or changes size, so the device may keep an
/// `Arc` to it and read it at any time between a write and its completion.
pub struct BufferRegion {
    bytes: Mutex<Box<[u8]>>,
    len: usize,
}

impl BufferRegion {
    pub fn new(len: usize) -> Self {
        Self {
            bytes: Mutex::new(vec![0u8; len].into_boxed_slice()),
            len,
        }
    }

    pub const fn len(&self) -> usize {
        self.len
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn lock(&self) -> MutexGuard<'_, Box<[u8]>> {
        self.bytes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Non-blocking access for the device's realtime context.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, Box<[u8]>>> {
        match self.bytes.try_lock() {
            Ok(guard) => Some(guard),
            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }
}

impl fmt::Debug for BufferRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferRegion").field("len", &self.len).finish()
    }
}

/// An asynchronous, buffer-queue style output device.
///
/// Buffers are registered once with [`prepare`](OutputDevice::prepare),
/// queued any number of times with [`write`](OutputDevice::write), and
/// reported back through the [`CompletionHandler`] given to
/// [`open`](OutputDevice::open). All methods take `&self`: the producer
/// thread writes while another thread may reset.
pub trait OutputDevice: Send + Sync + fmt::Debug {
    fn open(&self, format: &WaveFormat, on_complete: CompletionHandler) -> Result<(), DeviceError>;

    fn prepare(&self, token: BufferToken, region: Arc<BufferRegion>) -> Result<(), DeviceError>;

    fn unprepare(&self, token: BufferToken) -> Result<(), DeviceError>;

    /// Queues a prepared buffer behind everything already written.
    fn write(&self, token: BufferToken) -> Result<(), DeviceError>;

    /// Aborts every queued buffer; each one still gets its completion.
    fn reset(&self) -> Result<(), DeviceError>;

    fn close(&self) -> Result<(), DeviceError>;
}
