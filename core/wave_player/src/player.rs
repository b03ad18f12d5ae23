use std::{
    fs::File,
    io::{Seek as _, SeekFrom},
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};

use wave_file::{PcmContainerReader, WaveFormat};

use crate::{
    config::PlayerConfig,
    device_manager::{OutputDevice, cpal_dm::CpalOutputDevice},
    engine::{PlaybackEngine, looping_fill},
    error::PlayerError,
};

type SharedSource = Arc<Mutex<PcmContainerReader<File>>>;

/// Opens a WAVE file and checks that it can be played: the data region must
/// not be empty and the samples must be PCM or IEEE float.
pub fn open_file(
    path: impl AsRef<Path>,
) -> Result<(WaveFormat, PcmContainerReader<File>), PlayerError> {
    let file = File::open(path.as_ref())?;
    let reader = PcmContainerReader::open(file)?;
    let format = *reader.format();

    if reader.is_empty() {
        return Err(PlayerError::EmptyData);
    }
    if !format.format_tag().is_playable() {
        return Err(PlayerError::UnsupportedEncoding(format.format_tag()));
    }

    Ok((format, reader))
}

#[derive(Debug)]
struct OpenFile {
    path: PathBuf,
    format: WaveFormat,
    source: SharedSource,
}

/// Loops one WAVE file at a time on an output device.
///
/// Every [`play`](Player::play) starts a fresh [`PlaybackEngine`] from the
/// beginning of the file.
#[derive(Debug)]
pub struct Player {
    config: PlayerConfig,
    device: Arc<dyn OutputDevice>,
    file: Option<OpenFile>,
    engine: Option<PlaybackEngine>,
}

impl Player {
    /// Plays through cpal on the device named in `config`.
    pub fn new(config: PlayerConfig) -> Self {
        let device = config
            .device_name
            .clone()
            .map_or_else(CpalOutputDevice::new, CpalOutputDevice::named);
        Self::with_device(Arc::new(device), config)
    }

    pub fn with_device(device: Arc<dyn OutputDevice>, config: PlayerConfig) -> Self {
        Self {
            config,
            device,
            file: None,
            engine: None,
        }
    }

    pub const fn config(&self) -> &PlayerConfig {
        &self.config
    }

    /// Replaces the current file. On failure no file is open afterwards.
    pub fn open(&mut self, path: impl AsRef<Path>) -> Result<WaveFormat, PlayerError> {
        self.close();

        let path = path.as_ref();
        let (format, reader) = open_file(path)?;
        log::info!("Opened {} ({format}, {} data bytes)", path.display(), reader.len());

        self.file = Some(OpenFile {
            path: path.to_path_buf(),
            format,
            source: Arc::new(Mutex::new(reader)),
        });
        Ok(format)
    }

    /// Starts looping the open file from its beginning, restarting playback
    /// if it is already running.
    pub fn play(&mut self) -> Result<(), PlayerError> {
        if self.file.is_none() {
            return Err(PlayerError::NoFileOpen);
        }
        self.stop();

        let Some(file) = &self.file else {
            return Err(PlayerError::NoFileOpen);
        };
        file.source
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .seek(SeekFrom::Start(0))?;

        let fill = looping_fill(Arc::clone(&file.source), file.format.silence_byte());
        let mut engine = PlaybackEngine::new(Arc::clone(&self.device));
        engine.start(
            &file.format,
            self.config.buffer_size,
            self.config.buffer_count,
            Some(fill),
        )?;

        log::info!("Playing {} on engine {}", file.path.display(), engine.id());
        self.engine = Some(engine);
        Ok(())
    }

    pub fn stop(&mut self) {
        if let Some(mut engine) = self.engine.take() {
            engine.stop();
        }
    }

    /// Stops playback and forgets the open file.
    pub fn close(&mut self) {
        self.stop();
        if let Some(file) = self.file.take() {
            log::debug!("Closed {}", file.path.display());
        }
    }

    pub fn is_playing(&self) -> bool {
        self.engine.as_ref().is_some_and(PlaybackEngine::is_running)
    }

    pub fn format(&self) -> Option<WaveFormat> {
        self.file.as_ref().map(|file| file.format)
    }

    pub fn path(&self) -> Option<&Path> {
        self.file.as_ref().map(|file| file.path.as_path())
    }
}
