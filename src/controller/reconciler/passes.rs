//! # In-flight Passes
//!
//! Cancellation tokens for passes currently running, keyed by namespace/name.
//! The deletion watcher cancels a template's pass through this registry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;

/// Handle for one registered pass
#[derive(Debug, Clone)]
pub struct ActivePass {
    pub id: u64,
    pub token: CancellationToken,
}

#[derive(Debug, Clone, Default)]
pub struct PassRegistry {
    next_id: Arc<AtomicU64>,
    passes: Arc<Mutex<HashMap<String, ActivePass>>>,
}

impl PassRegistry {
    /// Register a new pass for `key`
    ///
    /// A pass still registered under the same key is cancelled first.
    pub fn begin(&self, key: &str) -> ActivePass {
        let pass = ActivePass {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            token: CancellationToken::new(),
        };
        let previous = self
            .passes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), pass.clone());
        if let Some(previous) = previous {
            previous.token.cancel();
        }
        pass
    }

    /// Drop a finished pass, unless a newer one replaced it
    pub fn finish(&self, key: &str, pass: &ActivePass) {
        let mut passes = self.passes.lock().unwrap_or_else(PoisonError::into_inner);
        if passes.get(key).is_some_and(|current| current.id == pass.id) {
            passes.remove(key);
        }
    }

    /// Cancel the pass running for `key`, returning whether one was running
    pub fn cancel(&self, key: &str) -> bool {
        let removed = self
            .passes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        match removed {
            Some(pass) => {
                pass.token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self, key: &str) -> bool {
        self.passes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }
}
