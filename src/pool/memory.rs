//! Transient document memory accounting

use crate::error::{PercolateError, Result};
use crate::metrics::DOCUMENT_MEMORY_BYTES;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Multiplier applied to the raw payload size to approximate the in-memory
/// footprint of the materialized single-document index
const DOCUMENT_OVERHEAD_FACTOR: usize = 4;

/// Minimum charge per document, so empty payloads still count
const MIN_DOCUMENT_CHARGE: usize = 1024;

/// Estimate the transient memory a document will occupy once materialized
pub fn estimate_document_memory(source_len: usize) -> usize {
    source_len
        .saturating_mul(DOCUMENT_OVERHEAD_FACTOR)
        .max(MIN_DOCUMENT_CHARGE)
}

/// Tracks aggregate memory reserved for in-flight materialized documents
///
/// Reservations are taken before materialization and released when the guard
/// drops, which happens when the evaluation worker finishes, not when a
/// waiting caller gives up.
#[derive(Debug, Default)]
pub struct MemoryAccountant {
    used: AtomicUsize,
}

impl MemoryAccountant {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes currently reserved
    pub fn used(&self) -> usize {
        self.used.load(Ordering::Acquire)
    }

    /// Reserve `bytes` against `ceiling`, failing with backpressure if the
    /// aggregate would exceed it
    pub fn reserve(self: &Arc<Self>, bytes: usize, ceiling: usize) -> Result<MemoryReservation> {
        let mut current = self.used.load(Ordering::Relaxed);
        loop {
            let next = current.saturating_add(bytes);
            if next > ceiling {
                return Err(PercolateError::ResourceExhausted(format!(
                    "transient document memory: {} reserved + {} requested exceeds ceiling {}",
                    current, bytes, ceiling
                )));
            }
            match self
                .used
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        DOCUMENT_MEMORY_BYTES.add(bytes as i64);
        Ok(MemoryReservation {
            accountant: Arc::clone(self),
            bytes,
        })
    }
}

/// RAII guard for one document's reserved memory
#[derive(Debug)]
pub struct MemoryReservation {
    accountant: Arc<MemoryAccountant>,
    bytes: usize,
}

impl MemoryReservation {
    /// Bytes held by this reservation
    pub fn bytes(&self) -> usize {
        self.bytes
    }
}

impl Drop for MemoryReservation {
    fn drop(&mut self) {
        self.accountant.used.fetch_sub(self.bytes, Ordering::AcqRel);
        DOCUMENT_MEMORY_BYTES.sub(self.bytes as i64);
    }
}
