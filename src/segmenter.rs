//! Segmenter (C3): sizes segments/tiles and hands out work via a single
//! atomic counter, per `original_source/src/segmenter.cpp`.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::topology::CpuTopology;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SieveRange {
    pub begin: u64,
    pub end: u64,
}

impl SieveRange {
    pub fn span(&self) -> u64 {
        self.end.saturating_sub(self.begin)
    }
}

const ALIGN_BYTES: u64 = 128;
const MIN_SEGMENT_BYTES: u64 = 8 * 1024;
const MIN_SEGMENT_BYTES_SINGLE_THREAD: u64 = 1024 * 1024;
const MIN_SEGMENT_BYTES_MULTI_THREAD: u64 = 768 * 1024;

fn align_down(value: u64, align: u64) -> u64 {
    (value / align) * align
}

fn align_up(value: u64, align: u64) -> u64 {
    align_down(value + align - 1, align)
}

#[derive(Debug, Clone, Copy)]
pub struct SegmentConfig {
    pub segment_bytes: u64,
    pub tile_bytes: u64,
    pub segment_bits: u64,
    pub tile_bits: u64,
    /// Number of integer values (odd residues) covered by one segment.
    pub segment_span: u64,
    pub tile_span: u64,
}

/// `s_fixed = R / (16 * k_r)` with `k_r = 1562.5 * (R / 1e10)^0.0625`,
/// carried over exactly from `choose_segment_config`.
fn fixed_segment_bytes(range_span: u64) -> u64 {
    let r = range_span.max(1) as f64;
    let k_r = 1562.5 * (r / 1e10).powf(0.0625);
    (r / (16.0 * k_r)).max(1.0) as u64
}

fn min_segment_bytes(range_span: u64) -> u64 {
    if range_span <= 1_000_000_000 {
        MIN_SEGMENT_BYTES
    } else {
        let r = range_span as f64;
        ((r / 1_000_000_000.0).sqrt() * MIN_SEGMENT_BYTES as f64) as u64
    }
}

/// Picks a segment/tile size for the whole run, before any per-worker
/// hybrid retuning. `total_l2_bytes` is the L2 budget available to a single
/// worker (`CpuTopology::l2_bytes`); `thread_count` affects the minimum
/// per-thread floor.
pub fn choose_segment_config(
    range_span: u64,
    total_l2_bytes: usize,
    thread_count: usize,
) -> SegmentConfig {
    let fixed = fixed_segment_bytes(range_span);
    let floor = min_segment_bytes(range_span).max(MIN_SEGMENT_BYTES);
    let cap = ((total_l2_bytes as f64) * 0.833) as u64;
    let thread_floor = if thread_count <= 1 {
        MIN_SEGMENT_BYTES_SINGLE_THREAD
    } else {
        MIN_SEGMENT_BYTES_MULTI_THREAD
    };

    let mut segment_bytes = fixed.max(floor).max(thread_floor);
    if cap > 0 {
        segment_bytes = segment_bytes.min(cap.max(MIN_SEGMENT_BYTES));
    }
    segment_bytes = align_up(segment_bytes, ALIGN_BYTES).max(ALIGN_BYTES);

    build_config(segment_bytes, total_l2_bytes)
}

fn build_config(segment_bytes: u64, total_l2_bytes: usize) -> SegmentConfig {
    let tile_bytes = align_up((total_l2_bytes as u64 / 2).clamp(ALIGN_BYTES, segment_bytes), ALIGN_BYTES)
        .min(segment_bytes)
        .max(ALIGN_BYTES);

    let segment_bits = segment_bytes * 8;
    let tile_bits = tile_bytes * 8;

    SegmentConfig {
        segment_bytes,
        tile_bytes,
        segment_bits,
        tile_bits,
        segment_span: segment_bits * 2,
        tile_span: tile_bits * 2,
    }
}

/// Per-worker retuning of the tile size (segment size stays shared): a
/// performance-class worker gets a tile sized off its own L2, an
/// efficiency-class worker off its own, smaller, L1d/L2. Capped by the
/// shared `segment_bytes`. This is the supplemented behavior from
/// `choose_worker_segment_config` (see SPEC_FULL.md).
pub fn choose_worker_segment_config(
    shared: SegmentConfig,
    topology: &CpuTopology,
    worker_id: usize,
    thread_count: usize,
) -> SegmentConfig {
    if !topology.has_hybrid {
        return shared;
    }
    let is_perf = topology.is_performance_worker(worker_id, thread_count);
    let worker_l2 = if is_perf {
        topology.perf_l2_bytes
    } else {
        topology.eff_l2_bytes
    } as u64;

    let tile_bytes = align_up((worker_l2 / 2).clamp(ALIGN_BYTES, shared.segment_bytes), ALIGN_BYTES)
        .min(shared.segment_bytes)
        .max(ALIGN_BYTES);
    let tile_bits = tile_bytes * 8;

    SegmentConfig {
        tile_bytes,
        tile_bits,
        tile_span: tile_bits * 2,
        ..shared
    }
}

/// Single-counter work queue: workers claim segment ids via `fetch_add`.
pub struct SegmentWorkQueue {
    range: SieveRange,
    segment_span: u64,
    next_segment: AtomicU64,
    segment_count: u64,
}

impl SegmentWorkQueue {
    pub fn new(range: SieveRange, segment_span: u64) -> Self {
        let span = range.span();
        let segment_count = if span == 0 {
            0
        } else {
            (span + segment_span - 1) / segment_span
        };
        SegmentWorkQueue {
            range,
            segment_span,
            next_segment: AtomicU64::new(0),
            segment_count,
        }
    }

    pub fn segment_count(&self) -> u64 {
        self.segment_count
    }

    pub fn segment_bounds(&self, segment_id: u64) -> Option<SieveRange> {
        if segment_id >= self.segment_count {
            return None;
        }
        let begin = self.range.begin + segment_id * self.segment_span;
        let end = (begin + self.segment_span).min(self.range.end);
        Some(SieveRange { begin, end })
    }

    /// Claims the next single segment id, or `None` once exhausted.
    pub fn next(&self) -> Option<u64> {
        let id = self.next_segment.fetch_add(1, Ordering::Relaxed);
        if id < self.segment_count {
            Some(id)
        } else {
            None
        }
    }

    /// Claims up to `n` consecutive segment ids as `[start, end)`, or `None`
    /// once exhausted.
    pub fn next_chunk(&self, n: u64) -> Option<(u64, u64)> {
        let n = n.max(1);
        let start = self.next_segment.fetch_add(n, Ordering::Relaxed);
        if start >= self.segment_count {
            return None;
        }
        let end = (start + n).min(self.segment_count);
        Some((start, end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_config_respects_min_floor_for_small_ranges() {
        let cfg = choose_segment_config(1_000, 1024 * 1024, 4);
        assert!(cfg.segment_bytes >= MIN_SEGMENT_BYTES_MULTI_THREAD);
        assert_eq!(cfg.segment_bytes % ALIGN_BYTES, 0);
    }

    #[test]
    fn segment_config_caps_at_l2_budget() {
        let cfg = choose_segment_config(10_000_000_000_000, 256 * 1024, 4);
        let cap = ((256 * 1024) as f64 * 0.833) as u64;
        assert!(cfg.segment_bytes <= align_up(cap.max(MIN_SEGMENT_BYTES), ALIGN_BYTES));
    }

    #[test]
    fn segment_config_single_thread_floor_is_larger() {
        let single = choose_segment_config(1_000_000, 1024 * 1024, 1);
        let multi = choose_segment_config(1_000_000, 1024 * 1024, 8);
        assert!(single.segment_bytes >= MIN_SEGMENT_BYTES_SINGLE_THREAD);
        assert!(multi.segment_bytes <= single.segment_bytes);
    }

    #[test]
    fn work_queue_hands_out_every_segment_once() {
        let range = SieveRange { begin: 0, end: 1000 };
        let queue = SegmentWorkQueue::new(range, 100);
        assert_eq!(queue.segment_count(), 10);
        let mut seen = Vec::new();
        while let Some(id) = queue.next() {
            seen.push(id);
        }
        seen.sort_unstable();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn work_queue_chunk_claims_are_disjoint_and_exhaustive() {
        let range = SieveRange { begin: 0, end: 10_000 };
        let queue = SegmentWorkQueue::new(range, 100);
        let mut total = 0u64;
        while let Some((start, end)) = queue.next_chunk(4) {
            total += end - start;
        }
        assert_eq!(total, queue.segment_count());
    }

    #[test]
    fn segment_bounds_clamp_at_range_end() {
        let range = SieveRange { begin: 0, end: 950 };
        let queue = SegmentWorkQueue::new(range, 100);
        let last = queue.segment_bounds(9).unwrap();
        assert_eq!(last.end, 950);
        assert!(queue.segment_bounds(10).is_none());
    }
}
