//! CPU topology summary used by the segmenter to size tiles and batches.
//!
//! Detection is best-effort: any value we can't query portably falls back to
//! the defaults `original_source/include/cpu_info.h` uses when its own
//! hybrid detection comes up empty.

const DEFAULT_L1D_BYTES: usize = 32 * 1024;
const DEFAULT_L2_BYTES: usize = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoreSchedulingMode {
    Auto,
    BigOnly,
    AllCores,
    Legacy,
}

#[derive(Debug, Clone, Copy)]
pub struct CpuTopology {
    pub logical_cpus: usize,
    pub physical_cpus: usize,
    pub l1d_bytes: usize,
    pub l2_bytes: usize,
    pub has_hybrid: bool,
    pub performance_logical_cpus: usize,
    pub efficiency_logical_cpus: usize,
    pub perf_l1d_bytes: usize,
    pub perf_l2_bytes: usize,
    pub eff_l1d_bytes: usize,
    pub eff_l2_bytes: usize,
}

impl CpuTopology {
    /// Detects what we safely can and falls back to uniform single-class
    /// values for the rest; see the CpuTopology section of SPEC_FULL.md.
    pub fn detect() -> Self {
        let logical_cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let l1d_bytes = cache_size::l1_cache_size().unwrap_or(DEFAULT_L1D_BYTES);
        let l2_bytes = cache_size::l2_cache_size().unwrap_or(DEFAULT_L2_BYTES);

        if l1d_bytes == DEFAULT_L1D_BYTES {
            log::debug!("falling back to default L1d cache size: {DEFAULT_L1D_BYTES} bytes");
        }
        if l2_bytes == DEFAULT_L2_BYTES {
            log::debug!("falling back to default L2 cache size: {DEFAULT_L2_BYTES} bytes");
        }

        CpuTopology {
            logical_cpus,
            physical_cpus: logical_cpus,
            l1d_bytes,
            l2_bytes,
            has_hybrid: false,
            performance_logical_cpus: logical_cpus,
            efficiency_logical_cpus: 0,
            perf_l1d_bytes: l1d_bytes,
            perf_l2_bytes: l2_bytes,
            eff_l1d_bytes: l1d_bytes,
            eff_l2_bytes: l2_bytes,
        }
    }

    pub fn effective_thread_count(&self) -> usize {
        if self.has_hybrid && self.performance_logical_cpus > 0 {
            self.performance_logical_cpus
        } else {
            self.logical_cpus
        }
        .max(1)
    }

    pub fn choose_thread_count(&self, mode: CoreSchedulingMode, requested: usize) -> usize {
        if requested > 0 {
            return requested;
        }
        match mode {
            CoreSchedulingMode::BigOnly if self.has_hybrid => {
                self.performance_logical_cpus.max(1)
            }
            CoreSchedulingMode::AllCores => self.logical_cpus.max(1),
            CoreSchedulingMode::Auto | CoreSchedulingMode::Legacy | CoreSchedulingMode::BigOnly => {
                self.effective_thread_count()
            }
        }
    }

    /// Whether logical worker index `worker_id` (0-based, round-robin over
    /// `thread_count` workers) should be treated as a performance-class core.
    pub fn is_performance_worker(&self, worker_id: usize, thread_count: usize) -> bool {
        if !self.has_hybrid || thread_count == 0 {
            return true;
        }
        let perf_share = (self.performance_logical_cpus * thread_count) / self.logical_cpus.max(1);
        worker_id < perf_share.max(1)
    }

    /// Batch size (number of segments claimed per `next_chunk` call) for a
    /// worker, driven by its core class's L2-to-segment-span ratio and
    /// nudged by how large the overall range is; carried over from
    /// `cpu_info.cpp`'s `choose_worker_segment_batch`.
    pub fn choose_worker_segment_batch(
        &self,
        worker_id: usize,
        thread_count: usize,
        segment_span: u64,
        range_span: u64,
    ) -> u32 {
        if !self.is_performance_worker(worker_id, thread_count) {
            return 1;
        }
        let l2 = if self.has_hybrid {
            self.perf_l2_bytes
        } else {
            self.l2_bytes
        } as u64;
        let span_bytes = segment_span.max(1);
        let ratio = l2 / span_bytes.max(1);

        let mut batch: i64 = if ratio >= 16 {
            5
        } else if ratio >= 8 {
            4
        } else if ratio >= 4 {
            3
        } else {
            2
        };

        if range_span >= 8_000_000_000 {
            batch += 1;
        } else if range_span < 1_000_000_000 {
            batch -= 1;
        }

        batch.clamp(1, 8) as u32
    }
}
