//! Versioned copy-on-write cells for map-wide fields.
//!
//! Terrain and jamming are read by every session touching a map region and
//! written by external world-event collaborators. A [`SharedField`] never
//! mutates a published value in place: writers clone the current value,
//! modify the clone and publish it under a new version. A tick loop takes one
//! [`FieldSnapshot`] at the start of the tick and reads only that, so it can
//! never observe a half-applied update.

use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

struct Versioned<T> {
    version: u64,
    value: Arc<T>,
}

/// Shared handle to a versioned field value.
///
/// Cloning the handle shares the underlying cell.
pub struct SharedField<T> {
    inner: Arc<RwLock<Versioned<T>>>,
}

impl<T> Clone for SharedField<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for SharedField<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let version = self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .version;
        f.debug_struct("SharedField")
            .field("version", &version)
            .finish_non_exhaustive()
    }
}

/// Immutable view of a field at one version.
#[derive(Debug)]
pub struct FieldSnapshot<T> {
    version: u64,
    value: Arc<T>,
}

impl<T> Clone for FieldSnapshot<T> {
    fn clone(&self) -> Self {
        Self {
            version: self.version,
            value: Arc::clone(&self.value),
        }
    }
}

impl<T> FieldSnapshot<T> {
    pub fn version(&self) -> u64 {
        self.version
    }
}

impl<T> Deref for FieldSnapshot<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: Clone> SharedField<T> {
    /// Publish `value` as version 0.
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Versioned {
                version: 0,
                value: Arc::new(value),
            })),
        }
    }

    /// The currently published value and its version.
    pub fn snapshot(&self) -> FieldSnapshot<T> {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        FieldSnapshot {
            version: guard.version,
            value: Arc::clone(&guard.value),
        }
    }

    pub fn version(&self) -> u64 {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .version
    }

    /// Clone the current value, apply `mutate` to the clone and publish it.
    /// Returns the new version.
    pub fn update(&self, mutate: impl FnOnce(&mut T)) -> u64 {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = T::clone(&guard.value);
        mutate(&mut next);
        guard.version += 1;
        guard.value = Arc::new(next);
        debug!(version = guard.version, "shared field updated");
        guard.version
    }

    /// Publish a whole new value. Returns the new version.
    pub fn replace(&self, value: T) -> u64 {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        guard.version += 1;
        guard.value = Arc::new(value);
        debug!(version = guard.version, "shared field replaced");
        guard.version
    }
}
