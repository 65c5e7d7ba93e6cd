//! Striped per-key locks.
//!
//! A put publishes two files (sidecar, then payload) with two renames; a
//! reader opens the payload and reads the sidecar. Holding the key's stripe
//! across both steps makes the pair appear atomic. Key locks are held only
//! for the renames or opens, never across body transfer.
//!
//! The same type also guards whole buckets (keyed with an empty key) and
//! multipart uploads (keyed by upload id). An upload stripe may be held
//! while parts are assembled; it is always taken before any bucket or key
//! stripe.

use std::hash::{DefaultHasher, Hash, Hasher};

use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

const STRIPES: usize = 64;

#[derive(Debug)]
pub(crate) struct KeyLocks {
    stripes: Vec<RwLock<()>>,
}

impl Default for KeyLocks {
    fn default() -> Self {
        Self {
            stripes: (0..STRIPES).map(|_| RwLock::new(())).collect(),
        }
    }
}

impl KeyLocks {
    fn stripe(&self, bucket: &str, key: &str) -> &RwLock<()> {
        let mut hasher = DefaultHasher::new();
        (bucket, key).hash(&mut hasher);
        // Truncation is fine: only the low bits select a stripe.
        #[allow(clippy::cast_possible_truncation)]
        let index = hasher.finish() as usize % self.stripes.len();
        &self.stripes[index]
    }

    pub(crate) async fn read(&self, bucket: &str, key: &str) -> RwLockReadGuard<'_, ()> {
        self.stripe(bucket, key).read().await
    }

    pub(crate) async fn write(&self, bucket: &str, key: &str) -> RwLockWriteGuard<'_, ()> {
        self.stripe(bucket, key).write().await
    }
}
