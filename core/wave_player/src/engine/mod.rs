use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
};

use uuid::Uuid;
use wave_file::WaveFormat;

use crate::{
    buffer::{BufferRing, CompletionRegistry},
    constants::PRODUCER_THREAD_PREFIX,
    device_manager::OutputDevice,
    error::EngineError,
};

pub mod fill;

pub use fill::{FillCallback, fill_looping, looping_fill};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EngineId(Uuid);

impl EngineId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for EngineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Streams a fill source to an output device through a ring of buffers
/// driven by a dedicated producer thread.
///
/// An engine is single-use: it can be started once and stopped any number of
/// times. Dropping a running engine stops it.
#[derive(Debug)]
pub struct PlaybackEngine {
    id: EngineId,
    device: Arc<dyn OutputDevice>,
    state: EngineState,
    /// set by the first successful device open
    spent: bool,
    /// tells the producer to leave its loop
    finished: Arc<AtomicBool>,
    /// hands the ring back for release once the producer exits
    producer: Option<JoinHandle<BufferRing>>,
}

impl PlaybackEngine {
    pub fn new(device: Arc<dyn OutputDevice>) -> Self {
        Self {
            id: EngineId::new(),
            device,
            state: EngineState::Stopped,
            spent: false,
            finished: Arc::new(AtomicBool::new(false)),
            producer: None,
        }
    }

    pub const fn id(&self) -> EngineId {
        self.id
    }

    pub const fn state(&self) -> EngineState {
        self.state
    }

    pub const fn is_running(&self) -> bool {
        matches!(self.state, EngineState::Running)
    }

    /// Opens the device, allocates `buffer_count` buffers of `buffer_size`
    /// bytes and starts the producer. Without a `fill` callback the engine
    /// plays silence.
    ///
    /// Nothing is left open or running when this fails.
    ///
    /// # Panics
    /// If the engine was already started.
    pub fn start(
        &mut self,
        format: &WaveFormat,
        buffer_size: usize,
        buffer_count: usize,
        fill: Option<FillCallback>,
    ) -> Result<(), EngineError> {
        assert!(!self.spent, "playback engine {} is single-use", self.id);

        if buffer_size == 0 || buffer_count == 0 {
            return Err(EngineError::InvalidRing {
                buffer_size,
                buffer_count,
            });
        }

        self.state = EngineState::Starting;
        match self.launch(format, buffer_size, buffer_count, fill) {
            Ok(producer) => {
                self.producer = Some(producer);
                self.state = EngineState::Running;
                log::info!(
                    "Engine {} playing {format} through {buffer_count} x {buffer_size} byte buffers",
                    self.id
                );
                Ok(())
            }
            Err(err) => {
                self.state = EngineState::Stopped;
                log::error!("Engine {} failed to start: {err}", self.id);
                Err(err)
            }
        }
    }

    fn launch(
        &mut self,
        format: &WaveFormat,
        buffer_size: usize,
        buffer_count: usize,
        fill: Option<FillCallback>,
    ) -> Result<JoinHandle<BufferRing>, EngineError> {
        let registry = Arc::new(CompletionRegistry::new());
        let on_complete = Arc::clone(&registry);
        self.device
            .open(format, Arc::new(move |token| on_complete.complete(token)))?;
        self.spent = true;

        let ring = match BufferRing::allocate(&self.device, &registry, buffer_size, buffer_count) {
            Ok(ring) => ring,
            Err(err) => {
                self.close_device();
                return Err(err.into());
            }
        };

        let producer = Producer {
            id: self.id,
            ring,
            fill,
            silence: format.silence_byte(),
            finished: Arc::clone(&self.finished),
        };

        thread::Builder::new()
            .name(format!("{PRODUCER_THREAD_PREFIX}-{}", self.id))
            .spawn(move || producer.run())
            .map_err(|err| {
                // the unstarted closure dropped the ring and its buffers
                self.close_device();
                EngineError::Spawn(err)
            })
    }

    /// Stops the producer and tears everything down: resets the device,
    /// joins the producer, waits for every buffer to complete, releases the
    /// ring and closes the device. Blocks until done. No-op when not running.
    pub fn stop(&mut self) {
        let Some(producer) = self.producer.take() else {
            return;
        };

        self.state = EngineState::Stopping;
        self.finished.store(true, Ordering::Release);
        self.reset_device();

        match producer.join() {
            Ok(ring) => {
                // aborts a buffer the producer submitted after the first reset
                self.reset_device();
                if let Err(err) = ring.release_all() {
                    log::warn!("Engine {} could not release every buffer: {err}", self.id);
                }
            }
            Err(_) => log::error!("Engine {} producer thread panicked", self.id),
        }

        self.close_device();
        self.state = EngineState::Stopped;
        log::info!("Engine {} stopped", self.id);
    }

    fn reset_device(&self) {
        if let Err(err) = self.device.reset() {
            log::warn!("Engine {} device reset failed: {err}", self.id);
        }
    }

    fn close_device(&self) {
        if let Err(err) = self.device.close() {
            log::warn!("Engine {} device close failed: {err}", self.id);
        }
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Producer {
    id: EngineId,
    ring: BufferRing,
    fill: Option<FillCallback>,
    silence: u8,
    finished: Arc<AtomicBool>,
}

impl Producer {
    fn run(mut self) -> BufferRing {
        log::debug!("Producer {} running", self.id);
        let silence = self.silence;

        while !self.finished.load(Ordering::Acquire) {
            let buffer = self.ring.advance();

            let stopping = self.finished.load(Ordering::Acquire);
            match self.fill.as_mut() {
                Some(fill) if !stopping => buffer.fill_with(|bytes| fill(bytes)),
                _ => buffer.fill_with(|bytes| bytes.fill(silence)),
            }

            if !buffer.submit() {
                thread::yield_now();
            }
        }

        log::debug!("Producer {} exiting", self.id);
        self.ring
    }
}
