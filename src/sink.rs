//! Producer to writer contract. The orchestrator only ever talks to a
//! `PrimeSink`; a real streaming text/binary/delta writer (as
//! `original_source/include/writer.h` implements, with optional zstd) is out
//! of scope. `NullSink` and `VecSink` are the only concrete sinks this crate
//! ships, enough to make the count/enumerate/nth modes testable.

use crate::error::CoreResult;

/// Mirrors spec §6's producer→writer contract: `on_segment` is called
/// exactly once per segment, strictly in ascending `segment_id` order.
pub trait PrimeSink: Send {
    fn on_prefix(&mut self, primes: &[u64]) -> CoreResult<()> {
        let _ = primes;
        Ok(())
    }

    fn on_segment(&mut self, segment_id: u64, primes: &[u64]) -> CoreResult<()>;

    fn on_flush(&mut self) -> CoreResult<()> {
        Ok(())
    }

    fn on_finish(&mut self) -> CoreResult<()> {
        Ok(())
    }
}

/// Discards every prime; used for count-only runs.
#[derive(Default)]
pub struct NullSink {
    last_segment: Option<u64>,
}

impl PrimeSink for NullSink {
    fn on_segment(&mut self, segment_id: u64, _primes: &[u64]) -> CoreResult<()> {
        self.last_segment = Some(segment_id);
        Ok(())
    }
}

/// Collects every emitted prime, in order, into memory. Used by tests and
/// by enumerate-mode callers that want the full list back directly.
#[derive(Default)]
pub struct VecSink {
    pub prefix: Vec<u64>,
    pub primes: Vec<u64>,
    last_segment: Option<u64>,
}

impl PrimeSink for VecSink {
    fn on_prefix(&mut self, primes: &[u64]) -> CoreResult<()> {
        self.prefix.extend_from_slice(primes);
        Ok(())
    }

    fn on_segment(&mut self, segment_id: u64, primes: &[u64]) -> CoreResult<()> {
        if let Some(last) = self.last_segment {
            debug_assert!(segment_id > last, "segments must arrive in ascending order");
        }
        self.last_segment = Some(segment_id);
        self.primes.extend_from_slice(primes);
        Ok(())
    }
}

impl VecSink {
    /// Every prime seen so far, prefix primes first, in ascending order.
    pub fn all_primes(&self) -> Vec<u64> {
        let mut out = Vec::with_capacity(self.prefix.len() + self.primes.len());
        out.extend_from_slice(&self.prefix);
        out.extend_from_slice(&self.primes);
        out
    }
}
