//! Per-key async locks for the write path.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use common::BalanceKey;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;

/// One async mutex per balance key, created on first use.
#[derive(Clone, Default)]
pub struct KeyLocks {
    locks: Arc<Mutex<HashMap<BalanceKey, Arc<Mutex<()>>>>>,
}

/// Held locks; released on drop.
pub struct KeyGuards {
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks every key, in ascending key order, under one deadline.
    ///
    /// Fixed ordering means two transfers between the same sites in opposite
    /// directions cannot deadlock. Returns the key that could not be locked
    /// in time; locks already taken are released.
    pub async fn acquire(
        &self,
        keys: &[BalanceKey],
        timeout: Duration,
    ) -> Result<KeyGuards, BalanceKey> {
        let deadline = Instant::now() + timeout;

        let mut keys = keys.to_vec();
        keys.sort();
        keys.dedup();

        let mut guards = Vec::with_capacity(keys.len());
        for key in keys {
            let lock = {
                let mut locks = self.locks.lock().await;
                Arc::clone(locks.entry(key).or_default())
            };
            match tokio::time::timeout_at(deadline, lock.lock_owned()).await {
                Ok(guard) => guards.push(guard),
                Err(_) => return Err(key),
            }
        }

        Ok(KeyGuards { _guards: guards })
    }
}
