//! Per-key mutual exclusion.
//!
//! Calls for the same key queue behind one async mutex; calls for different
//! keys never contend beyond a short critical section on the map itself.
//! A key's entry is removed once nobody holds or waits on it.

use std::{
  collections::HashMap,
  hash::Hash,
  sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

pub struct KeyedLocks<K> {
  slots: Mutex<HashMap<K, Slot>>,
}

/// One key's mutex and the number of callers holding or waiting on it.
#[derive(Default)]
struct Slot {
  mutex: Arc<AsyncMutex<()>>,
  users: usize,
}

impl<K: Eq + Hash + Clone> KeyedLocks<K> {
  pub fn new() -> Self { Self { slots: Mutex::new(HashMap::new()) } }

  /// Wait until `key` is free and hold it until the guard is dropped.
  ///
  /// Cancel-safe: a caller dropped while still waiting deregisters itself,
  /// so the entry goes away with the last holder.
  pub async fn lock(&self, key: K) -> KeyGuard<'_, K> {
    let mutex = {
      let mut slots = self.slots();
      let slot = slots.entry(key.clone()).or_default();
      slot.users += 1;
      slot.mutex.clone()
    };
    // Registered before waiting, so dropping this future releases the slot.
    let mut held = KeyGuard { locks: self, key, guard: None };
    held.guard = Some(mutex.lock_owned().await);
    held
  }

  /// Number of keys currently held or awaited.
  pub fn len(&self) -> usize { self.slots().len() }

  pub fn is_empty(&self) -> bool { self.len() == 0 }

  fn slots(&self) -> MutexGuard<'_, HashMap<K, Slot>> {
    self.slots.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

impl<K: Eq + Hash + Clone> Default for KeyedLocks<K> {
  fn default() -> Self { Self::new() }
}

pub struct KeyGuard<'a, K: Eq + Hash + Clone> {
  locks: &'a KeyedLocks<K>,
  key:   K,
  /// `None` while still waiting.
  guard: Option<OwnedMutexGuard<()>>,
}

impl<K: Eq + Hash + Clone> Drop for KeyGuard<'_, K> {
  fn drop(&mut self) {
    self.guard.take();
    let mut slots = self.locks.slots();
    if let Some(slot) = slots.get_mut(&self.key) {
      slot.users = slot.users.saturating_sub(1);
      if slot.users == 0 {
        slots.remove(&self.key);
      }
    }
  }
}
