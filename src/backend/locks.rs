//! Per-identity lock table.
//!
//! A fixed array of mutexes indexed by a hash of the identity string. Two
//! operations on the same identity always share a slot; unrelated identities
//! share one only on a hash collision.

use sha2::{Digest, Sha256};
use tokio::sync::{Mutex, MutexGuard};

/// Number of lock slots.
pub const LOCK_SLOTS: usize = 256;

#[derive(Debug)]
pub struct IdentityLockTable {
    slots: Vec<Mutex<()>>,
}

impl IdentityLockTable {
    pub fn new() -> Self {
        Self::with_slots(LOCK_SLOTS)
    }

    /// Table with `slots` slots; at least one.
    pub fn with_slots(slots: usize) -> Self {
        Self { slots: (0..slots.max(1)).map(|_| Mutex::new(())).collect() }
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Slot an identity maps to.
    pub fn slot_index(&self, identity: &str) -> usize {
        let digest = Sha256::digest(identity.as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        (u64::from_be_bytes(prefix) % self.slots.len() as u64) as usize
    }

    /// The lock guarding `identity`.
    pub fn for_identity(&self, identity: &str) -> &Mutex<()> {
        &self.slots[self.slot_index(identity)]
    }

    /// Wait for exclusive access to `identity`.
    pub async fn lock(&self, identity: &str) -> MutexGuard<'_, ()> {
        self.for_identity(identity).lock().await
    }
}

impl Default for IdentityLockTable {
    fn default() -> Self {
        Self::new()
    }
}
