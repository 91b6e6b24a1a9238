//! Bounded free list of raw-field buffers, one per bind kind.

use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, PoisonError};

use tracing::trace;

use crate::binder::RawFields;

pub(crate) struct Pool {
    free: Mutex<Vec<RawFields>>,
    capacity: usize,
}

impl Pool {
    pub(crate) fn new(capacity: usize) -> Self {
        Self { free: Mutex::new(Vec::new()), capacity }
    }

    /// Borrows a cleared buffer; it goes back on the list when dropped.
    pub(crate) fn get(&self) -> Pooled<'_> {
        let reused = self.free.lock().unwrap_or_else(PoisonError::into_inner).pop();
        if reused.is_some() {
            trace!("reusing pooled raw fields");
        }
        Pooled { fields: reused.unwrap_or_default(), pool: self }
    }

    fn put(&self, mut fields: RawFields) {
        fields.clear();
        let mut free = self.free.lock().unwrap_or_else(PoisonError::into_inner);
        if free.len() < self.capacity {
            free.push(fields);
        }
    }

    #[cfg(test)]
    fn idle(&self) -> usize {
        self.free.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// A buffer on loan from a [`Pool`].
pub(crate) struct Pooled<'p> {
    fields: RawFields,
    pool: &'p Pool,
}

impl Deref for Pooled<'_> {
    type Target = RawFields;

    fn deref(&self) -> &RawFields {
        &self.fields
    }
}

impl DerefMut for Pooled<'_> {
    fn deref_mut(&mut self) -> &mut RawFields {
        &mut self.fields
    }
}

impl Drop for Pooled<'_> {
    fn drop(&mut self) {
        self.pool.put(std::mem::take(&mut self.fields));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffers_come_back_cleared() {
        let pool = Pool::new(4);
        {
            let mut fields = pool.get();
            fields.insert("k".into(), vec!["v".into()]);
        }
        assert_eq!(pool.idle(), 1);
        let fields = pool.get();
        assert!(fields.is_empty());
        assert_eq!(pool.idle(), 0);
    }

    #[test]
    fn list_is_bounded() {
        let pool = Pool::new(1);
        let a = pool.get();
        let b = pool.get();
        drop(a);
        drop(b);
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn zero_capacity_keeps_nothing() {
        let pool = Pool::new(0);
        drop(pool.get());
        assert_eq!(pool.idle(), 0);
    }
}
