//! Field buffer pool.
//!
//! Every log entry needs a `Vec<Field>`. Rather than allocate one per
//! request, both middlewares borrow a buffer from a process-wide pool and
//! give it back once the entry has been handed to the sink.
//!
//! The handle, [`Fields`], is move-only and returns its buffer on drop, so a
//! buffer goes back exactly once on every exit path, unwinding included.
//! Anything a sink wants to keep past `log` must be cloned out.

use std::fmt;
use std::ops::{Deref, DerefMut};

use parking_lot::Mutex;

use super::fields::Field;

/// Idle buffers kept around; extras are freed on release.
const MAX_IDLE: usize = 256;

/// Buffers that grew past this many slots are freed instead of pooled.
const MAX_RETAINED_CAPACITY: usize = 64;

const INITIAL_CAPACITY: usize = 16;

static POOL: FieldPool = FieldPool::new();

/// Borrows a buffer from the process-wide pool.
pub fn acquire() -> Fields<'static> {
    POOL.acquire()
}

/// A bounded pool of reusable field buffers.
pub struct FieldPool {
    idle: Mutex<Vec<Vec<Field>>>,
}

impl FieldPool {
    pub const fn new() -> Self {
        Self { idle: Mutex::new(Vec::new()) }
    }

    /// Returns an empty buffer, recycled when one is idle.
    pub fn acquire(&self) -> Fields<'_> {
        let buf = self.idle.lock().pop()
            .unwrap_or_else(|| Vec::with_capacity(INITIAL_CAPACITY));
        Fields { buf, pool: self }
    }

    /// Number of buffers waiting for reuse.
    pub fn idle(&self) -> usize {
        self.idle.lock().len()
    }

    fn release(&self, mut buf: Vec<Field>) {
        if buf.capacity() > MAX_RETAINED_CAPACITY {
            return;
        }
        buf.clear();
        let mut idle = self.idle.lock();
        if idle.len() < MAX_IDLE {
            idle.push(buf);
        }
    }
}

impl Default for FieldPool {
    fn default() -> Self { Self::new() }
}

impl fmt::Debug for FieldPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldPool").field("idle", &self.idle()).finish()
    }
}

/// A buffer on loan from a [`FieldPool`]. Derefs to `Vec<Field>`.
pub struct Fields<'p> {
    buf: Vec<Field>,
    pool: &'p FieldPool,
}

impl Fields<'_> {
    /// Hands the buffer back. Same as dropping it.
    pub fn release(self) {}
}

impl Deref for Fields<'_> {
    type Target = Vec<Field>;
    fn deref(&self) -> &Vec<Field> { &self.buf }
}

impl DerefMut for Fields<'_> {
    fn deref_mut(&mut self) -> &mut Vec<Field> { &mut self.buf }
}

impl Drop for Fields<'_> {
    fn drop(&mut self) {
        self.pool.release(std::mem::take(&mut self.buf));
    }
}

impl fmt::Debug for Fields<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.buf.iter()).finish()
    }
}
