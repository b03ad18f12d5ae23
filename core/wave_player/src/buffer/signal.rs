use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// Binary "in flight" flag of one buffer, set by the producer on submit and
/// cleared exactly once by the device's completion.
#[derive(Debug, Default)]
pub struct CompletionSignal {
    in_flight: Mutex<bool>,
    done: Condvar,
}

impl CompletionSignal {
    fn lock(&self) -> MutexGuard<'_, bool> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_in_flight(&self) -> bool {
        *self.lock()
    }

    /// Marks the buffer as handed to the device.
    ///
    /// # Panics
    /// If the previous submission has not completed yet.
    pub fn begin(&self) {
        let mut in_flight = self.lock();
        assert!(!*in_flight, "buffer submitted again before its completion");
        *in_flight = true;
    }

    /// Clears the flag and wakes waiters. Returns whether the buffer was
    /// actually in flight.
    pub fn complete(&self) -> bool {
        let was_in_flight = std::mem::replace(&mut *self.lock(), false);
        self.done.notify_all();
        was_in_flight
    }

    /// Blocks until the buffer is idle. Returns immediately if it already is.
    pub fn wait(&self) {
        let mut in_flight = self.lock();
        while *in_flight {
            in_flight = self
                .done
                .wait(in_flight)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}
