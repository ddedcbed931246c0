//! Sieve orchestrator (C8): ties the wheel, base-prime producer, segmenter,
//! marker, and wheel-bitmap engine together behind a single `run()` entry
//! point. Grounded on the `run()` body in `original_source/src/main.cpp`:
//! odd-align the range, split off prefix primes, auto-detect the
//! wheel-bitmap fast path, otherwise fan workers out over the segment work
//! queue and drain results through a single writer in ascending order.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Condvar, Mutex};

use crate::base_primes::{isqrt_ceil, sieve_up_to};
use crate::error::{CoreError, CoreResult};
use crate::marker::PrimeMarker;
use crate::popcount::count_zero_bits;
use crate::segmenter::{choose_segment_config, choose_worker_segment_config, SegmentWorkQueue, SieveRange};
use crate::sink::PrimeSink;
use crate::topology::{CoreSchedulingMode, CpuTopology};
use crate::wheel::{get_wheel, WheelType};
use crate::wheel_bitmap::{supports_wheel_bitmap_count, WheelBitmapEngine};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Count,
    Enumerate,
    Nth(u64),
}

#[derive(Debug, Clone)]
pub struct RunSpec {
    pub from: u64,
    pub to: u64,
    /// 0 means "let the topology decide".
    pub threads: usize,
    pub wheel: WheelType,
    pub segment_override: Option<u64>,
    pub tile_override: Option<u64>,
    pub mode: Mode,
    /// Governs thread-count and per-worker batch sizing via
    /// `CpuTopology::choose_thread_count`; see spec §6.
    pub scheduling_mode: CoreSchedulingMode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Count(u64),
    /// `None` when fewer than `n` primes exist in the range.
    NthValue(Option<u64>),
}

fn odd_ceil(v: u64) -> u64 {
    if v % 2 == 0 {
        v + 1
    } else {
        v
    }
}

fn validate(spec: &RunSpec) -> CoreResult<()> {
    if spec.from > spec.to {
        return Err(CoreError::InvalidRange {
            from: spec.from,
            to: spec.to,
            reason: "from must not exceed to",
        });
    }
    if matches!(spec.mode, Mode::Nth(_)) && spec.threads > 1 {
        return Err(CoreError::InvalidRange {
            from: spec.from,
            to: spec.to,
            reason: "nth-prime search requires single-threaded execution",
        });
    }
    Ok(())
}

/// Primes at or below the wheel's small-prime limit (2, and whichever of
/// 3..47 the wheel precomputes) that fall inside `[from, to)`; these are
/// never fed to the marker since the marker's own patterns would mark them
/// as composite multiples of themselves.
fn prefix_primes(wheel_type: WheelType, from: u64, to: u64) -> Vec<u64> {
    let limit = get_wheel(wheel_type).small_prime_limit() as u64;
    sieve_up_to(limit)
        .into_iter()
        .map(|p| p as u64)
        .filter(|&p| p >= from && p < to)
        .collect()
}

fn extract_primes(range: SieveRange, words: &[u64], out: &mut Vec<u64>) {
    let bit_count = ((range.span() + 1) / 2) as usize;
    for bit in 0..bit_count {
        let word = words[bit / 64];
        if (word >> (bit % 64)) & 1 == 0 {
            out.push(range.begin + 2 * bit as u64);
        }
    }
}

fn alloc_words(bit_count: usize) -> CoreResult<Vec<u64>> {
    let word_count = (bit_count + 63) / 64;
    let mut words = Vec::new();
    words
        .try_reserve_exact(word_count)
        .map_err(|_| CoreError::AllocationFailure {
            context: "segment bitset",
        })?;
    words.resize(word_count, 0u64);
    Ok(words)
}

/// Entry point: runs `spec` against `sink`, per spec §6.
pub fn run(spec: &RunSpec, sink: &mut dyn PrimeSink) -> CoreResult<RunOutcome> {
    validate(spec)?;

    let topology = CpuTopology::detect();
    let thread_count = topology.choose_thread_count(spec.scheduling_mode, spec.threads);

    let prefix = prefix_primes(spec.wheel, spec.from, spec.to);
    let wheel = get_wheel(spec.wheel);
    let sieve_begin = odd_ceil(spec.from.max(wheel.small_prime_limit() as u64 + 2));
    let sieve_end = spec.to;

    match spec.mode {
        Mode::Count => run_count(spec, &topology, thread_count, &prefix, sieve_begin, sieve_end, sink),
        Mode::Enumerate => run_enumerate(spec, thread_count, &prefix, sieve_begin, sieve_end, sink),
        Mode::Nth(n) => run_nth(spec, &prefix, sieve_begin, sieve_end, n),
    }
}

fn run_count(
    spec: &RunSpec,
    topology: &CpuTopology,
    thread_count: usize,
    prefix: &[u64],
    sieve_begin: u64,
    sieve_end: u64,
    sink: &mut dyn PrimeSink,
) -> CoreResult<RunOutcome> {
    sink.on_prefix(prefix)?;

    if sieve_begin >= sieve_end {
        sink.on_finish()?;
        return Ok(RunOutcome::Count(prefix.len() as u64));
    }

    let span = sieve_end - sieve_begin;
    let auto_wheel_bitmap = spec.segment_override.is_none()
        && supports_wheel_bitmap_count(spec.wheel)
        && ((thread_count <= 1 && span >= 1_000_000_000) || (thread_count > 1 && span >= 8_000_000_000));

    if auto_wheel_bitmap {
        let wheel = get_wheel(spec.wheel);
        if let Some(engine) = WheelBitmapEngine::new(wheel) {
            let base_primes = sieve_up_to(isqrt_ceil(sieve_end));
            let count = if thread_count > 1 {
                engine.count_concurrent(sieve_begin, sieve_end, &base_primes, thread_count)
            } else {
                engine.count(sieve_begin, sieve_end, &base_primes)
            };
            log::debug!("wheel-bitmap fast path: {count} primes in sieve region");
            sink.on_finish()?;
            return Ok(RunOutcome::Count(prefix.len() as u64 + count));
        }
    }

    let wheel = get_wheel(spec.wheel);
    let base_primes = sieve_up_to(isqrt_ceil(sieve_end));
    let range = SieveRange {
        begin: sieve_begin,
        end: sieve_end,
    };
    let segment_bytes = spec.segment_override;
    let mut config = choose_segment_config(span, topology.l2_bytes, thread_count);
    if let Some(bytes) = segment_bytes {
        config.segment_bytes = bytes;
        config.segment_bits = bytes * 8;
        config.segment_span = config.segment_bits * 2;
    }
    if let Some(tile_bytes) = spec.tile_override {
        config.tile_bytes = tile_bytes;
        config.tile_bits = tile_bytes * 8;
        config.tile_span = config.tile_bits * 2;
    }

    let queue = SegmentWorkQueue::new(range, config.segment_span);
    let marker = PrimeMarker::new(wheel, &base_primes, config.segment_span, queue.segment_count());
    let total = AtomicU64::new(0);
    let error: Mutex<Option<CoreError>> = Mutex::new(None);

    rayon::scope(|s| {
        for worker_id in 0..thread_count {
            let queue = &queue;
            let marker = &marker;
            let total = &total;
            let error = &error;
            s.spawn(move |_| {
                let mut state = marker.make_thread_state(worker_id, thread_count, range.begin);
                let worker_config = choose_worker_segment_config(config, topology, worker_id, thread_count);
                if topology.has_hybrid {
                    log::trace!(
                        "worker {worker_id}: retuned tile size to {} bytes",
                        worker_config.tile_bytes
                    );
                }
                let batch = topology.choose_worker_segment_batch(worker_id, thread_count, config.segment_span, span) as u64;
                'claim: while let Some((start, end)) = queue.next_chunk(batch) {
                    for segment_id in start..end {
                        log::trace!("worker {worker_id} claimed segment {segment_id}");
                        let Some(bounds) = queue.segment_bounds(segment_id) else {
                            break 'claim;
                        };
                        let bit_count = ((bounds.span() + 1) / 2) as usize;
                        let mut words = match alloc_words(bit_count) {
                            Ok(w) => w,
                            Err(e) => {
                                *error.lock().expect("error mutex poisoned") = Some(e);
                                break 'claim;
                            }
                        };
                        marker.sieve_segment(segment_id, bounds, &mut words, &mut state);
                        let zero_bits = count_zero_bits(&words, bit_count as u64);
                        total.fetch_add(zero_bits, Ordering::Relaxed);
                    }
                }
            });
        }
    });

    if let Some(e) = error.lock().expect("error mutex poisoned").take() {
        return Err(e);
    }

    sink.on_finish()?;
    Ok(RunOutcome::Count(prefix.len() as u64 + total.load(Ordering::Relaxed)))
}

struct SegmentSlot {
    ready: bool,
    primes: Vec<u64>,
}

fn run_enumerate(
    spec: &RunSpec,
    thread_count: usize,
    prefix: &[u64],
    sieve_begin: u64,
    sieve_end: u64,
    sink: &mut dyn PrimeSink,
) -> CoreResult<RunOutcome> {
    sink.on_prefix(prefix)?;

    if sieve_begin >= sieve_end {
        sink.on_finish()?;
        return Ok(RunOutcome::Count(prefix.len() as u64));
    }

    let topology = CpuTopology::detect();
    let wheel = get_wheel(spec.wheel);
    let base_primes = sieve_up_to(isqrt_ceil(sieve_end));
    let range = SieveRange {
        begin: sieve_begin,
        end: sieve_end,
    };
    let span = range.span();
    let config = choose_segment_config(span, topology.l2_bytes, thread_count);
    let segment_span = spec.segment_override.unwrap_or(config.segment_span);

    let queue = SegmentWorkQueue::new(range, segment_span);
    let segment_count = queue.segment_count() as usize;
    let marker = PrimeMarker::new(wheel, &base_primes, segment_span, queue.segment_count());

    let slots: Vec<Mutex<SegmentSlot>> = (0..segment_count)
        .map(|_| {
            Mutex::new(SegmentSlot {
                ready: false,
                primes: Vec::new(),
            })
        })
        .collect();
    let cv = Condvar::new();
    let stop = AtomicBool::new(false);
    let error: Mutex<Option<CoreError>> = Mutex::new(None);
    let mut total_count = 0u64;

    rayon::scope(|s| {
        for worker_id in 0..thread_count {
            let queue = &queue;
            let marker = &marker;
            let slots = &slots;
            let cv = &cv;
            let stop = &stop;
            let error = &error;
            s.spawn(move |_| {
                let mut state = marker.make_thread_state(worker_id, thread_count, range.begin);
                let batch = topology.choose_worker_segment_batch(worker_id, thread_count, segment_span, span) as u64;
                'claim: while !stop.load(Ordering::Relaxed) {
                    let Some((start, end)) = queue.next_chunk(batch) else {
                        break;
                    };
                    for segment_id in start..end {
                        if stop.load(Ordering::Relaxed) {
                            break 'claim;
                        }
                        log::trace!("worker {worker_id} claimed segment {segment_id}");
                        let Some(bounds) = queue.segment_bounds(segment_id) else {
                            break 'claim;
                        };
                        let bit_count = ((bounds.span() + 1) / 2) as usize;
                        let mut words = match alloc_words(bit_count) {
                            Ok(w) => w,
                            Err(e) => {
                                *error.lock().expect("error mutex poisoned") = Some(e);
                                stop.store(true, Ordering::Relaxed);
                                break 'claim;
                            }
                        };
                        marker.sieve_segment(segment_id, bounds, &mut words, &mut state);
                        let mut primes = Vec::new();
                        extract_primes(bounds, &words, &mut primes);

                        let mut slot = slots[segment_id as usize].lock().expect("segment slot poisoned");
                        slot.ready = true;
                        slot.primes = primes;
                        drop(slot);
                        cv.notify_all();
                    }
                }
            });
        }

        s.spawn(|_| {
            let mut expected = 0usize;
            while expected < segment_count {
                if stop.load(Ordering::Relaxed) {
                    return;
                }
                let mut slot = slots[expected].lock().expect("segment slot poisoned");
                while !slot.ready && !stop.load(Ordering::Relaxed) {
                    slot = cv.wait(slot).expect("segment slot poisoned");
                }
                if stop.load(Ordering::Relaxed) {
                    return;
                }
                let primes = std::mem::take(&mut slot.primes);
                drop(slot);

                total_count += primes.len() as u64;
                if let Err(e) = sink.on_segment(expected as u64, &primes) {
                    *error.lock().expect("error mutex poisoned") = Some(e);
                    stop.store(true, Ordering::Relaxed);
                    return;
                }
                expected += 1;
            }
        });
    });

    if let Some(e) = error.lock().expect("error mutex poisoned").take() {
        return Err(e);
    }

    sink.on_finish()?;
    Ok(RunOutcome::Count(prefix.len() as u64 + total_count))
}

fn run_nth(
    spec: &RunSpec,
    prefix: &[u64],
    sieve_begin: u64,
    sieve_end: u64,
    n: u64,
) -> CoreResult<RunOutcome> {
    if n == 0 {
        return Err(CoreError::InvalidRange {
            from: spec.from,
            to: spec.to,
            reason: "nth is 1-indexed; n must be >= 1",
        });
    }
    if n <= prefix.len() as u64 {
        return Ok(RunOutcome::NthValue(Some(prefix[(n - 1) as usize])));
    }
    let mut remaining = n - prefix.len() as u64;

    if sieve_begin >= sieve_end {
        return Ok(RunOutcome::NthValue(None));
    }

    let wheel = get_wheel(spec.wheel);
    let base_primes = sieve_up_to(isqrt_ceil(sieve_end));
    let range = SieveRange {
        begin: sieve_begin,
        end: sieve_end,
    };
    let topology = CpuTopology::detect();
    let config = choose_segment_config(range.span(), topology.l2_bytes, 1);
    let segment_span = spec.segment_override.unwrap_or(config.segment_span);

    let queue = SegmentWorkQueue::new(range, segment_span);
    let marker = PrimeMarker::new(wheel, &base_primes, segment_span, queue.segment_count());
    let mut state = marker.make_thread_state(0, 1, range.begin);
    let batch = topology.choose_worker_segment_batch(0, 1, segment_span, range.span()) as u64;

    while let Some((start, end)) = queue.next_chunk(batch) {
        for segment_id in start..end {
            log::trace!("nth search claimed segment {segment_id}");
            let Some(bounds) = queue.segment_bounds(segment_id) else {
                return Ok(RunOutcome::NthValue(None));
            };
            let bit_count = ((bounds.span() + 1) / 2) as usize;
            let mut words = alloc_words(bit_count)?;
            marker.sieve_segment(segment_id, bounds, &mut words, &mut state);

            let mut primes = Vec::new();
            extract_primes(bounds, &words, &mut primes);
            if (primes.len() as u64) < remaining {
                remaining -= primes.len() as u64;
                continue;
            }
            return Ok(RunOutcome::NthValue(Some(primes[(remaining - 1) as usize])));
        }
    }

    Ok(RunOutcome::NthValue(None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{NullSink, VecSink};

    fn spec(from: u64, to: u64, mode: Mode) -> RunSpec {
        RunSpec {
            from,
            to,
            threads: 1,
            wheel: WheelType::Mod30,
            segment_override: None,
            tile_override: None,
            mode,
            scheduling_mode: CoreSchedulingMode::Auto,
        }
    }

    #[test]
    fn count_matches_canonical_pi_values() {
        let mut sink = NullSink::default();
        assert_eq!(
            run(&spec(0, 10, Mode::Count), &mut sink).unwrap(),
            RunOutcome::Count(4)
        );
        assert_eq!(
            run(&spec(0, 100, Mode::Count), &mut sink).unwrap(),
            RunOutcome::Count(25)
        );
        assert_eq!(
            run(&spec(0, 1000, Mode::Count), &mut sink).unwrap(),
            RunOutcome::Count(168)
        );
    }

    #[test]
    fn count_boundary_cases() {
        let mut sink = NullSink::default();
        assert_eq!(run(&spec(2, 2, Mode::Count), &mut sink).unwrap(), RunOutcome::Count(0));
        assert_eq!(run(&spec(0, 1, Mode::Count), &mut sink).unwrap(), RunOutcome::Count(0));
        assert_eq!(run(&spec(0, 2, Mode::Count), &mut sink).unwrap(), RunOutcome::Count(0));
        assert_eq!(run(&spec(0, 3, Mode::Count), &mut sink).unwrap(), RunOutcome::Count(1));
    }

    #[test]
    fn enumerate_small_window_matches_expected_list() {
        let mut sink = VecSink::default();
        run(&spec(10, 30, Mode::Enumerate), &mut sink).unwrap();
        assert_eq!(sink.all_primes(), vec![11, 13, 17, 19, 23, 29]);
    }

    #[test]
    fn enumeration_order_is_strictly_increasing() {
        let mut sink = VecSink::default();
        run(&spec(0, 20_000, Mode::Enumerate), &mut sink).unwrap();
        let primes = sink.all_primes();
        assert!(primes.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn nth_matches_known_values() {
        assert_eq!(
            run(&spec(0, 100, Mode::Nth(1)), &mut NullSink::default()).unwrap(),
            RunOutcome::NthValue(Some(2))
        );
        assert_eq!(
            run(&spec(0, 100, Mode::Nth(10)), &mut NullSink::default()).unwrap(),
            RunOutcome::NthValue(Some(29))
        );
    }

    #[test]
    fn nth_rejects_multi_threaded_requests() {
        let mut s = spec(0, 100, Mode::Nth(1));
        s.threads = 4;
        assert!(run(&s, &mut NullSink::default()).is_err());
    }

    #[test]
    fn scheduling_mode_all_cores_still_counts_correctly() {
        // AllCores just changes how many workers are chosen when `threads`
        // is 0; it must not change the answer.
        let mut s = spec(0, 100_000, Mode::Count);
        s.threads = 0;
        s.scheduling_mode = CoreSchedulingMode::AllCores;
        assert_eq!(run(&s, &mut NullSink::default()).unwrap(), RunOutcome::Count(9592));
    }

    #[test]
    fn range_purity_enumerate_never_yields_values_outside_bounds() {
        let mut sink = VecSink::default();
        run(&spec(1_000, 2_000, Mode::Enumerate), &mut sink).unwrap();
        for &p in &sink.all_primes() {
            assert!(p >= 1_000 && p < 2_000);
        }
    }

    #[test]
    fn wheel_independence_on_a_shared_window() {
        let mut count30 = NullSink::default();
        let mut count210 = NullSink::default();
        let mut s30 = spec(100_000, 120_000, Mode::Count);
        let mut s210 = spec(100_000, 120_000, Mode::Count);
        s210.wheel = WheelType::Mod210;
        s30.threads = 2;
        s210.threads = 2;
        let a = run(&s30, &mut count30).unwrap();
        let b = run(&s210, &mut count210).unwrap();
        assert_eq!(a, b);
    }
}
