//! Reusable intermediate buffers for generation calls.
//!
//! Buffers carry capacity only. Every call clears them before use, so their
//! contents never influence results; they just must not be shared by two
//! calls at once, which the pool guarantees by handing out owned guards.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_channel::{Receiver, Sender, bounded};

use crate::sampler::Candidate;

#[derive(Debug, Default)]
pub struct ScratchBuffers {
    pub(crate) candidates: Vec<Candidate>,
}

impl ScratchBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(candidates: usize) -> Self {
        Self {
            candidates: Vec::with_capacity(candidates),
        }
    }

    /// Drops contents, keeps capacity.
    #[inline]
    pub fn clear(&mut self) {
        self.candidates.clear();
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.candidates.capacity()
    }
}

/// Bounded pool of scratch buffers shared by worker threads.
pub struct ScratchPool {
    available_tx: Sender<ScratchBuffers>,
    available_rx: Receiver<ScratchBuffers>,
    allocated: AtomicUsize,
    max_buffers: usize,
}

impl ScratchPool {
    pub fn new(max_buffers: usize) -> Self {
        let max_buffers = max_buffers.max(1);
        let (tx, rx) = bounded(max_buffers);
        Self {
            available_tx: tx,
            available_rx: rx,
            allocated: AtomicUsize::new(0),
            max_buffers,
        }
    }

    /// Takes an idle buffer set, allocates one while under capacity, or
    /// blocks until another caller releases theirs.
    pub fn acquire(&self) -> PooledScratch<'_> {
        if let Ok(buffers) = self.available_rx.try_recv() {
            return self.wrap(buffers);
        }

        loop {
            let current = self.allocated.load(Ordering::Acquire);
            if current < self.max_buffers {
                let prev = self.allocated.fetch_add(1, Ordering::AcqRel);
                if prev < self.max_buffers {
                    return self.wrap(ScratchBuffers::new());
                }
                self.allocated.fetch_sub(1, Ordering::AcqRel);
            }

            // The pool owns a sender, so the channel never disconnects.
            if let Ok(buffers) = self.available_rx.recv() {
                return self.wrap(buffers);
            }
        }
    }

    /// Number of buffer sets created so far.
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::Acquire)
    }

    pub fn max_buffers(&self) -> usize {
        self.max_buffers
    }

    fn wrap(&self, mut buffers: ScratchBuffers) -> PooledScratch<'_> {
        buffers.clear();
        PooledScratch {
            buffers,
            pool: self,
        }
    }

    fn release(&self, buffers: ScratchBuffers) {
        let _ = self.available_tx.try_send(buffers);
    }
}

/// Scratch buffers on loan from a [`ScratchPool`]; returned on drop.
pub struct PooledScratch<'pool> {
    buffers: ScratchBuffers,
    pool: &'pool ScratchPool,
}

impl Deref for PooledScratch<'_> {
    type Target = ScratchBuffers;

    fn deref(&self) -> &Self::Target {
        &self.buffers
    }
}

impl DerefMut for PooledScratch<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buffers
    }
}

impl Drop for PooledScratch<'_> {
    fn drop(&mut self) {
        self.pool.release(std::mem::take(&mut self.buffers));
    }
}
