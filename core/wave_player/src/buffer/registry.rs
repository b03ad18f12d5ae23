use std::{
    collections::HashMap,
    sync::{
        Arc, PoisonError, RwLock,
        atomic::{AtomicU32, Ordering},
    },
};

use super::signal::CompletionSignal;
use crate::device_manager::BufferToken;

/// Maps the tokens handed to the device back to buffer completion signals.
///
/// Entries are added when a buffer is acquired and removed when it is
/// released, so the device only ever sees plain integers.
#[derive(Debug, Default)]
pub struct CompletionRegistry {
    next_token: AtomicU32,
    slots: RwLock<HashMap<BufferToken, Arc<CompletionSignal>>>,
}

impl CompletionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self) -> (BufferToken, Arc<CompletionSignal>) {
        let token = BufferToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        let signal = Arc::new(CompletionSignal::default());
        self.slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(token, Arc::clone(&signal));
        (token, signal)
    }

    pub fn unregister(&self, token: BufferToken) {
        self.slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&token);
    }

    pub fn len(&self) -> usize {
        self.slots.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entry point for the device's completion context. Never panics:
    /// stray or duplicate completions are logged and dropped.
    pub fn complete(&self, token: BufferToken) {
        let signal = self
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&token)
            .cloned();

        match signal {
            Some(signal) => {
                if !signal.complete() {
                    log::warn!("Completion for buffer {token} which was not in flight");
                }
            }
            None => log::warn!("Completion for unknown buffer {token}"),
        }
    }
}
