use std::{
    collections::{HashMap, VecDeque},
    fmt,
    sync::{
        Arc, Condvar, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use wave_file::WaveFormat;

use super::{BufferRegion, BufferToken, CompletionHandler, DeviceError, OutputDevice};

const MAX_RECORDED: usize = 256;

/// One accepted write, with the buffer bytes as they were at write time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub token: BufferToken,
    pub bytes: Vec<u8>,
}

#[derive(Default)]
struct FakeState {
    handler: Option<CompletionHandler>,
    opened_format: Option<WaveFormat>,
    prepared: HashMap<BufferToken, Arc<BufferRegion>>,
    pending: VecDeque<BufferToken>,
    submissions: Vec<Submission>,
    writes: usize,
    prepares: usize,
    unprepares: usize,
    resets: usize,
    closes: usize,
}

/// In-memory device: completions are only delivered when a test asks for
/// them, or on reset unless built with [`FakeDevice::holding_on_reset`].
pub struct FakeDevice {
    state: Mutex<FakeState>,
    changed: Condvar,
    reject_writes: AtomicBool,
    complete_on_reset: bool,
    fail_open: Option<i32>,
    fail_prepare_after: Option<usize>,
}

impl FakeDevice {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState::default()),
            changed: Condvar::new(),
            reject_writes: AtomicBool::new(false),
            complete_on_reset: true,
            fail_open: None,
            fail_prepare_after: None,
        }
    }

    pub const fn failing_open(mut self, code: i32) -> Self {
        self.fail_open = Some(code);
        self
    }

    /// The first `count` prepares succeed, every later one fails.
    pub const fn failing_prepare_after(mut self, count: usize) -> Self {
        self.fail_prepare_after = Some(count);
        self
    }

    /// Reset drops queued buffers without completing them.
    pub const fn holding_on_reset(mut self) -> Self {
        self.complete_on_reset = false;
        self
    }

    pub fn set_reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_open(&self) -> bool {
        self.state().handler.is_some()
    }

    pub fn opened_format(&self) -> Option<WaveFormat> {
        self.state().opened_format
    }

    pub fn prepared_count(&self) -> usize {
        self.state().prepared.len()
    }

    pub fn pending_count(&self) -> usize {
        self.state().pending.len()
    }

    pub fn write_count(&self) -> usize {
        self.state().writes
    }

    pub fn unprepare_count(&self) -> usize {
        self.state().unprepares
    }

    pub fn reset_count(&self) -> usize {
        self.state().resets
    }

    pub fn close_count(&self) -> usize {
        self.state().closes
    }

    /// The first writes the device accepted, in order.
    pub fn submissions(&self) -> Vec<Submission> {
        self.state().submissions.clone()
    }

    /// Blocks until at least `count` writes were accepted or `timeout` elapsed.
    pub fn wait_for_writes(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state();
        while state.writes < count {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            state = self
                .changed
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }

    /// Completes the oldest queued buffer, calling the handler outside the lock.
    pub fn complete_next(&self) -> Option<BufferToken> {
        let (token, handler) = {
            let mut state = self.state();
            let token = state.pending.pop_front()?;
            (token, state.handler.clone())
        };
        if let Some(handler) = handler {
            handler(token);
        }
        Some(token)
    }

    pub fn complete_all(&self) -> usize {
        let mut completed = 0;
        while self.complete_next().is_some() {
            completed += 1;
        }
        completed
    }
}

impl Default for FakeDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FakeDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("FakeDevice")
            .field("open", &state.handler.is_some())
            .field("prepared", &state.prepared.len())
            .field("pending", &state.pending)
            .field("writes", &state.writes)
            .finish_non_exhaustive()
    }
}

impl OutputDevice for FakeDevice {
    fn open(&self, format: &WaveFormat, on_complete: CompletionHandler) -> Result<(), DeviceError> {
        if let Some(code) = self.fail_open {
            return Err(DeviceError::Native(code));
        }
        let mut state = self.state();
        if state.handler.is_some() {
            return Err(DeviceError::AlreadyOpen);
        }
        state.handler = Some(on_complete);
        state.opened_format = Some(*format);
        Ok(())
    }

    fn prepare(&self, token: BufferToken, region: Arc<BufferRegion>) -> Result<(), DeviceError> {
        let mut state = self.state();
        if state.handler.is_none() {
            return Err(DeviceError::NotOpen);
        }
        if self
            .fail_prepare_after
            .is_some_and(|limit| state.prepares >= limit)
        {
            return Err(DeviceError::Native(7));
        }
        state.prepares += 1;
        state.prepared.insert(token, region);
        Ok(())
    }

    fn unprepare(&self, token: BufferToken) -> Result<(), DeviceError> {
        let mut state = self.state();
        if state.pending.contains(&token) {
            return Err(DeviceError::StillPlaying(token));
        }
        state
            .prepared
            .remove(&token)
            .ok_or(DeviceError::NotPrepared(token))?;
        state.unprepares += 1;
        Ok(())
    }

    fn write(&self, token: BufferToken) -> Result<(), DeviceError> {
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(DeviceError::Native(5));
        }
        let mut state = self.state();
        let region = state
            .prepared
            .get(&token)
            .cloned()
            .ok_or(DeviceError::NotPrepared(token))?;

        state.pending.push_back(token);
        state.writes += 1;
        if state.submissions.len() < MAX_RECORDED {
            let bytes = region.lock().to_vec();
            state.submissions.push(Submission { token, bytes });
        }
        drop(state);
        self.changed.notify_all();
        Ok(())
    }

    fn reset(&self) -> Result<(), DeviceError> {
        let (aborted, handler) = {
            let mut state = self.state();
            state.resets += 1;
            if !self.complete_on_reset {
                return Ok(());
            }
            let aborted: Vec<_> = state.pending.drain(..).collect();
            (aborted, state.handler.clone())
        };
        if let Some(handler) = handler {
            for token in aborted {
                handler(token);
            }
        }
        Ok(())
    }

    fn close(&self) -> Result<(), DeviceError> {
        let mut state = self.state();
        state.handler = None;
        state.prepared.clear();
        state.closes += 1;
        Ok(())
    }
}
