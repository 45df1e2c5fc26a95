//! Handles of background timer tasks, keyed by timer id.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::task::JoinHandle;
use tracing::debug;

/// A registered task and the generation it was scheduled under.
#[derive(Debug)]
struct TimerSlot {
    generation: u64,
    handle: JoinHandle<()>,
}

#[derive(Debug, Default)]
pub struct TimerRegistry {
    handles: Mutex<HashMap<String, TimerSlot>>,
    next_id: AtomicU64,
    next_generation: AtomicU64,
}

impl TimerRegistry {
    pub fn next_id(&self) -> String {
        format!("timer-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Generation for a task about to be spawned. The task hands it back to
    /// [`TimerRegistry::complete`] when it finishes.
    pub fn reserve(&self) -> u64 {
        self.next_generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Track a task under `id`, aborting any task already registered there.
    pub fn insert(&self, id: impl Into<String>, generation: u64, handle: JoinHandle<()>) {
        let id = id.into();
        let previous = self
            .handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone(), TimerSlot { generation, handle });
        if let Some(previous) = previous {
            debug!(timer = %id, replaced = previous.generation, "replacing existing timer");
            previous.handle.abort();
        }
    }

    /// Abort and forget a timer. Returns whether one was registered.
    pub fn cancel(&self, id: &str) -> bool {
        let handle = self.handles.lock().unwrap_or_else(PoisonError::into_inner).remove(id);
        match handle {
            Some(slot) => {
                slot.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Forget a timer that finished on its own. A task that has since been
    /// replaced under the same id leaves its successor registered.
    pub fn complete(&self, id: &str, generation: u64) {
        let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        if handles.get(id).is_some_and(|slot| slot.generation == generation) {
            handles.remove(id);
        }
    }

    pub fn active(&self) -> Vec<String> {
        let handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<String> = handles
            .iter()
            .filter(|(_, slot)| !slot.handle.is_finished())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn cancel_all(&self) {
        let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        for (_, slot) in handles.drain() {
            slot.handle.abort();
        }
    }
}
