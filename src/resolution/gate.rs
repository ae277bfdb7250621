//! Bounded-concurrency gate for outstanding rooftop requests.
//!
//! Each dispatched request holds one [`Permit`]; the permit is released when
//! its completion finishes or is dropped unrun.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug)]
pub struct OutstandingGate {
    ceiling: usize,
    outstanding: AtomicUsize,
}

/// One unit of outstanding capacity.
#[derive(Debug)]
pub struct Permit {
    gate: Arc<OutstandingGate>,
}

impl Drop for Permit {
    fn drop(&mut self) {
        self.gate.outstanding.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Capacity shortfall reported by [`OutstandingGate::try_acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exhausted {
    pub available: usize,
    pub ceiling: usize,
}

impl OutstandingGate {
    /// Gate with nothing outstanding.
    pub fn new(ceiling: usize) -> Arc<Self> {
        Arc::new(Self {
            ceiling,
            outstanding: AtomicUsize::new(0),
        })
    }

    /// Maximum outstanding plus held anchors.
    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    /// Permits currently alive.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    /// Reserve `n` permits, counting `held` anchors already occupying
    /// capacity elsewhere. All-or-nothing.
    pub fn try_acquire(self: &Arc<Self>, n: usize, held: usize) -> Result<Vec<Permit>, Exhausted> {
        let mut current = self.outstanding.load(Ordering::Acquire);
        loop {
            let used = current + held;
            let available = self.ceiling.saturating_sub(used);
            if n > available {
                return Err(Exhausted {
                    available,
                    ceiling: self.ceiling,
                });
            }
            match self.outstanding.compare_exchange_weak(
                current,
                current + n,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        Ok((0..n)
            .map(|_| Permit {
                gate: Arc::clone(self),
            })
            .collect())
    }
}
