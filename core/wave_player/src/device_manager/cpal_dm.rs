use std::{
    collections::{HashMap, VecDeque},
    fmt,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
        TryLockError, mpsc,
    },
    thread::{self, JoinHandle},
};

use cpal::{
    FromSample, OutputCallbackInfo, Sample, SizedSample,
    traits::{DeviceTrait, HostTrait, StreamTrait},
};
use wave_file::WaveFormat;

use super::{
    BufferRegion, BufferToken, CompletionHandler, DeviceError, OutputDevice,
    pcm::{SampleDecoder, SampleEncoding},
};
use crate::constants::STREAM_THREAD_NAME;

/// Buffer-queue output device on top of a cpal output stream.
///
/// The stream is opened at the file's own sample rate and channel count and
/// pulls bytes from written buffers in submission order. `cpal::Stream` is
/// not `Send` on every host, so it lives on a dedicated owner thread for the
/// whole open..close session.
pub struct CpalOutputDevice {
    device_name: Option<String>,
    open: Mutex<Option<OpenStream>>,
}

struct OpenStream {
    session: Arc<StreamSession>,
    shutdown: mpsc::Sender<()>,
    thread: JoinHandle<()>,
}

impl CpalOutputDevice {
    /// Uses the host's default output device.
    pub const fn new() -> Self {
        Self {
            device_name: None,
            open: Mutex::new(None),
        }
    }

    /// Uses the output device whose cpal name matches `name`.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            device_name: Some(name.into()),
            open: Mutex::new(None),
        }
    }

    pub fn is_open(&self) -> bool {
        self.lock_open().is_some()
    }

    fn lock_open(&self) -> MutexGuard<'_, Option<OpenStream>> {
        self.open.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn session(&self) -> Result<Arc<StreamSession>, DeviceError> {
        self.lock_open()
            .as_ref()
            .map(|open| Arc::clone(&open.session))
            .ok_or(DeviceError::NotOpen)
    }
}

impl Default for CpalOutputDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CpalOutputDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CpalOutputDevice")
            .field("device_name", &self.device_name)
            .field("open", &self.is_open())
            .finish()
    }
}

impl OutputDevice for CpalOutputDevice {
    fn open(&self, format: &WaveFormat, on_complete: CompletionHandler) -> Result<(), DeviceError> {
        let mut open = self.lock_open();
        if open.is_some() {
            return Err(DeviceError::AlreadyOpen);
        }
        if format.channels() == 0 || format.sample_rate() == 0 {
            return Err(DeviceError::UnsupportedFormat(format!("{format}")));
        }

        let encoding = SampleEncoding::for_format(format)?;
        let session = Arc::new(StreamSession::new(encoding, on_complete));
        *open = Some(spawn_stream(self.device_name.clone(), *format, session)?);

        log::info!("Audio stream opened: {format}");
        Ok(())
    }

    fn prepare(&self, token: BufferToken, region: Arc<BufferRegion>) -> Result<(), DeviceError> {
        self.session()?.prepare(token, region);
        Ok(())
    }

    fn unprepare(&self, token: BufferToken) -> Result<(), DeviceError> {
        self.session()?.unprepare(token)
    }

    fn write(&self, token: BufferToken) -> Result<(), DeviceError> {
        self.session()?.write(token)
    }

    fn reset(&self) -> Result<(), DeviceError> {
        let aborted = self.session()?.reset();
        log::debug!("Audio stream reset, {aborted} queued buffers aborted");
        Ok(())
    }

    fn close(&self) -> Result<(), DeviceError> {
        let open = self.lock_open().take().ok_or(DeviceError::NotOpen)?;

        // dropping the stream on its owner thread stops the callback
        let _ = open.shutdown.send(());
        if open.thread.join().is_err() {
            log::error!("Audio stream thread panicked");
        }

        let abandoned = open.session.reset();
        if abandoned > 0 {
            log::warn!("{abandoned} buffers were still queued when the stream closed");
        }
        open.session.forget_prepared();

        log::info!("Audio stream closed");
        Ok(())
    }
}

impl Drop for CpalOutputDevice {
    fn drop(&mut self) {
        if self.is_open() {
            let _ = self.close();
        }
    }
}

fn spawn_stream(
    device_name: Option<String>,
    format: WaveFormat,
    session: Arc<StreamSession>,
) -> Result<OpenStream, DeviceError> {
    let (ready_tx, ready_rx) = mpsc::channel();
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
    let stream_session = Arc::clone(&session);

    let thread = thread::Builder::new()
        .name(STREAM_THREAD_NAME.to_owned())
        .spawn(move || {
            let stream = match build_stream(device_name.as_deref(), &format, stream_session) {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    stream
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            // parked until close() or until the sender is dropped
            let _ = shutdown_rx.recv();
            drop(stream);
        })
        .map_err(|e| DeviceError::StreamBuildFailed(e.to_string()))?;

    match ready_rx.recv() {
        Ok(Ok(())) => Ok(OpenStream {
            session,
            shutdown: shutdown_tx,
            thread,
        }),
        Ok(Err(e)) => {
            let _ = thread.join();
            Err(e)
        }
        Err(_) => {
            let _ = thread.join();
            Err(DeviceError::StreamBuildFailed(
                "stream thread exited during setup".to_owned(),
            ))
        }
    }
}

fn select_device(host: &cpal::Host, name: Option<&str>) -> Result<cpal::Device, DeviceError> {
    let Some(name) = name else {
        return host
            .default_output_device()
            .ok_or(DeviceError::DeviceNotFound);
    };

    let devices = host
        .output_devices()
        .map_err(|e| DeviceError::StreamBuildFailed(e.to_string()))?;
    for device in devices {
        if device.name().is_ok_and(|n| n == name) {
            return Ok(device);
        }
    }
    Err(DeviceError::NamedDeviceNotFound(name.to_owned()))
}

fn build_stream(
    device_name: Option<&str>,
    format: &WaveFormat,
    session: Arc<StreamSession>,
) -> Result<cpal::Stream, DeviceError> {
    let host = cpal::default_host();
    let device = select_device(&host, device_name)?;
    log::info!(
        "Using audio device: {}",
        device.name().unwrap_or_else(|_| "Unknown".to_owned())
    );

    let supported = device
        .default_output_config()
        .map_err(|e| DeviceError::StreamBuildFailed(e.to_string()))?;
    let config = cpal::StreamConfig {
        channels: format.channels(),
        sample_rate: cpal::SampleRate(format.sample_rate()),
        buffer_size: cpal::BufferSize::Default,
    };

    let stream = match supported.sample_format() {
        cpal::SampleFormat::F32 => build_output_stream::<f32>(&device, &config, session)?,
        cpal::SampleFormat::I16 => build_output_stream::<i16>(&device, &config, session)?,
        cpal::SampleFormat::U16 => build_output_stream::<u16>(&device, &config, session)?,
        sample_format => {
            return Err(DeviceError::UnsupportedFormat(format!(
                "Unsupported sample format '{sample_format}'"
            )));
        }
    };

    stream
        .play()
        .map_err(|e| DeviceError::StreamStartFailed(e.to_string()))?;
    Ok(stream)
}

fn build_output_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    session: Arc<StreamSession>,
) -> Result<cpal::Stream, DeviceError>
where
    T: SizedSample + FromSample<f32>,
{
    let error_cb = |err: cpal::StreamError| {
        log::error!("Stream error: {err}");
    };
    let data_cb = move |data: &mut [T], _: &OutputCallbackInfo| session.render(data);

    device
        .build_output_stream(config, data_cb, error_cb, None)
        .map_err(|e| DeviceError::StreamBuildFailed(e.to_string()))
}

/// State shared by the device handle and the stream callback for one
/// open..close session.
struct StreamSession {
    on_complete: CompletionHandler,
    prepared: RwLock<HashMap<BufferToken, Arc<BufferRegion>>>,
    queue: Mutex<PlayQueue>,
}

struct PlayQueue {
    entries: VecDeque<QueuedBuffer>,
    decoder: SampleDecoder,
}

struct QueuedBuffer {
    token: BufferToken,
    region: Arc<BufferRegion>,
    cursor: usize,
}

impl StreamSession {
    fn new(encoding: SampleEncoding, on_complete: CompletionHandler) -> Self {
        Self {
            on_complete,
            prepared: RwLock::new(HashMap::new()),
            queue: Mutex::new(PlayQueue {
                entries: VecDeque::new(),
                decoder: SampleDecoder::new(encoding),
            }),
        }
    }

    fn lock_queue(&self) -> MutexGuard<'_, PlayQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_prepared(&self) -> RwLockReadGuard<'_, HashMap<BufferToken, Arc<BufferRegion>>> {
        self.prepared.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_prepared(&self) -> RwLockWriteGuard<'_, HashMap<BufferToken, Arc<BufferRegion>>> {
        self.prepared.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn prepare(&self, token: BufferToken, region: Arc<BufferRegion>) {
        self.write_prepared().insert(token, region);
    }

    fn unprepare(&self, token: BufferToken) -> Result<(), DeviceError> {
        if self.lock_queue().entries.iter().any(|e| e.token == token) {
            return Err(DeviceError::StillPlaying(token));
        }
        self.write_prepared()
            .remove(&token)
            .map(drop)
            .ok_or(DeviceError::NotPrepared(token))
    }

    fn write(&self, token: BufferToken) -> Result<(), DeviceError> {
        let region = self
            .read_prepared()
            .get(&token)
            .cloned()
            .ok_or(DeviceError::NotPrepared(token))?;
        self.lock_queue().entries.push_back(QueuedBuffer {
            token,
            region,
            cursor: 0,
        });
        Ok(())
    }

    /// Drops every queued buffer and reports each one complete.
    fn reset(&self) -> usize {
        let aborted: Vec<BufferToken> = {
            let mut queue = self.lock_queue();
            queue.decoder.clear();
            queue.entries.drain(..).map(|e| e.token).collect()
        };
        for &token in &aborted {
            (self.on_complete)(token);
        }
        aborted.len()
    }

    fn forget_prepared(&self) {
        self.write_prepared().clear();
    }

    /// Stream callback body. Outputs equilibrium rather than waiting when
    /// the producer side holds the queue.
    fn render<T>(&self, out: &mut [T])
    where
        T: Sample + FromSample<f32>,
    {
        let finished = {
            let mut queue = match self.queue.try_lock() {
                Ok(queue) => queue,
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
                Err(TryLockError::WouldBlock) => {
                    out.fill(T::EQUILIBRIUM);
                    return;
                }
            };
            queue.render(out)
        };
        // handlers run with the queue unlocked
        for token in finished {
            (self.on_complete)(token);
        }
    }
}

impl PlayQueue {
    /// Returns the buffers that were fully consumed, in play order.
    fn render<T>(&mut self, out: &mut [T]) -> Vec<BufferToken>
    where
        T: Sample + FromSample<f32>,
    {
        let mut finished = Vec::new();
        let mut written = 0;
        while written < out.len() {
            let Some(entry) = self.entries.front_mut() else {
                break;
            };

            let exhausted = {
                // the producer never touches a region while it is queued
                let Some(bytes) = entry.region.try_lock() else {
                    break;
                };
                while written < out.len() && entry.cursor < bytes.len() {
                    if let Some(value) = self.decoder.push(bytes[entry.cursor]) {
                        out[written] = value.to_sample::<T>();
                        written += 1;
                    }
                    entry.cursor += 1;
                }
                entry.cursor >= bytes.len()
            };

            if exhausted {
                if let Some(done) = self.entries.pop_front() {
                    finished.push(done.token);
                }
            }
        }
        out[written..].fill(T::EQUILIBRIUM);
        finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::OnceLock;

    fn recording_session(encoding: SampleEncoding) -> (StreamSession, Arc<Mutex<Vec<BufferToken>>>) {
        let completed = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&completed);
        let handler: CompletionHandler = Arc::new(move |token| sink.lock().unwrap().push(token));
        (StreamSession::new(encoding, handler), completed)
    }

    fn region_with(bytes: &[u8]) -> Arc<BufferRegion> {
        let region = Arc::new(BufferRegion::new(bytes.len()));
        region.lock().copy_from_slice(bytes);
        region
    }

    fn i16_bytes(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn test_render_consumes_buffers_in_write_order() {
        let (session, completed) = recording_session(SampleEncoding::I16);
        session.prepare(BufferToken(1), region_with(&i16_bytes(&[16_384, -16_384])));
        session.prepare(BufferToken(2), region_with(&i16_bytes(&[0, 16_384])));
        session.write(BufferToken(1)).unwrap();
        session.write(BufferToken(2)).unwrap();

        let mut out = [9.0f32; 6];
        session.render(&mut out);

        assert_eq!(out, [0.5, -0.5, 0.0, 0.5, 0.0, 0.0]);
        assert_eq!(*completed.lock().unwrap(), vec![BufferToken(1), BufferToken(2)]);
    }

    #[test]
    fn test_partially_played_buffer_stays_queued() {
        let (session, completed) = recording_session(SampleEncoding::I16);
        session.prepare(BufferToken(7), region_with(&i16_bytes(&[1, 2, 3])));
        session.write(BufferToken(7)).unwrap();

        let mut out = [0i16; 2];
        session.render(&mut out);
        assert!(completed.lock().unwrap().is_empty());
        assert_eq!(
            session.unprepare(BufferToken(7)),
            Err(DeviceError::StillPlaying(BufferToken(7)))
        );

        session.render(&mut out);
        assert_eq!(*completed.lock().unwrap(), vec![BufferToken(7)]);
        assert_eq!(session.unprepare(BufferToken(7)), Ok(()));
    }

    #[test]
    fn test_sample_straddling_two_buffers_is_decoded() {
        let (session, _) = recording_session(SampleEncoding::I16);
        // 0x4000 split across the buffer boundary
        session.prepare(BufferToken(1), region_with(&[0x00]));
        session.prepare(BufferToken(2), region_with(&[0x40]));
        session.write(BufferToken(1)).unwrap();
        session.write(BufferToken(2)).unwrap();

        let mut out = [0.0f32; 1];
        session.render(&mut out);

        assert_eq!(out, [0.5]);
    }

    #[test]
    fn test_empty_queue_renders_equilibrium() {
        let (session, _) = recording_session(SampleEncoding::U8);

        let mut signed = [5i16; 4];
        let mut unsigned = [5u16; 4];
        session.render(&mut signed);
        session.render(&mut unsigned);

        assert!(signed.iter().all(|&s| s == 0));
        assert!(unsigned.iter().all(|&s| s == u16::EQUILIBRIUM));
    }

    #[test]
    fn test_completions_fire_after_the_queue_is_released() {
        let session_cell: Arc<OnceLock<Arc<StreamSession>>> = Arc::new(OnceLock::new());
        let queue_free = Arc::new(Mutex::new(Vec::new()));

        let cell = Arc::clone(&session_cell);
        let sink = Arc::clone(&queue_free);
        let handler: CompletionHandler = Arc::new(move |_| {
            let free = cell
                .get()
                .is_some_and(|session| session.queue.try_lock().is_ok());
            sink.lock().unwrap().push(free);
        });
        let session = Arc::new(StreamSession::new(SampleEncoding::I16, handler));
        assert!(session_cell.set(Arc::clone(&session)).is_ok());

        session.prepare(BufferToken(1), region_with(&i16_bytes(&[1])));
        session.prepare(BufferToken(2), region_with(&i16_bytes(&[2])));
        session.write(BufferToken(1)).unwrap();
        session.write(BufferToken(2)).unwrap();

        let mut out = [0.0f32; 4];
        session.render(&mut out);

        assert_eq!(*queue_free.lock().unwrap(), vec![true, true]);
    }

    #[test]
    fn test_render_does_not_wait_for_a_held_queue() {
        let (session, completed) = recording_session(SampleEncoding::I16);
        session.prepare(BufferToken(1), region_with(&i16_bytes(&[16_384])));
        session.write(BufferToken(1)).unwrap();

        let held = session.lock_queue();
        let mut out = [1.0f32; 2];
        session.render(&mut out);
        drop(held);

        assert_eq!(out, [0.0, 0.0]);
        assert!(completed.lock().unwrap().is_empty());
    }

    #[test]
    fn test_reset_completes_every_queued_buffer() {
        let (session, completed) = recording_session(SampleEncoding::I16);
        for id in 1..=3 {
            session.prepare(BufferToken(id), region_with(&[0; 4]));
            session.write(BufferToken(id)).unwrap();
        }

        assert_eq!(session.reset(), 3);
        assert_eq!(
            *completed.lock().unwrap(),
            vec![BufferToken(1), BufferToken(2), BufferToken(3)]
        );
        assert_eq!(session.unprepare(BufferToken(2)), Ok(()));
    }

    #[test]
    fn test_write_requires_a_prepared_buffer() {
        let (session, _) = recording_session(SampleEncoding::I16);

        assert_eq!(
            session.write(BufferToken(4)),
            Err(DeviceError::NotPrepared(BufferToken(4)))
        );
    }

    #[test]
    fn test_device_calls_fail_before_open() {
        let device = CpalOutputDevice::named("no-such-device");

        assert!(!device.is_open());
        assert_eq!(device.write(BufferToken(0)), Err(DeviceError::NotOpen));
        assert_eq!(device.close(), Err(DeviceError::NotOpen));
    }

    #[test]
    fn test_undecodable_format_is_rejected_at_open() {
        let device = CpalOutputDevice::new();
        let format = WaveFormat::new(44_100, 12, 2);
        let handler: CompletionHandler = Arc::new(|_| {});

        assert!(matches!(
            device.open(&format, handler),
            Err(DeviceError::UnsupportedFormat(_))
        ));
        assert!(!device.is_open());
    }
}
