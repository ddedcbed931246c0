//! Prime marker (C5): marks composites into a segment's bitset, one bit per
//! odd integer (`bit i` <-> `value = segment.begin + 2*i`). Primes are
//! partitioned into three classes by how often they hit a segment, per
//! `original_source/src/marker.cpp`:
//!
//! - small: primes dividing the wheel's small-pattern table, applied with a
//!   precomputed per-word mask (`Wheel::small_patterns`).
//! - medium: primes that hit a segment more than once (`p <= segment_span/2`),
//!   stepped directly every segment.
//! - large: primes that hit a segment at most once (`p > segment_span/2`),
//!   deferred via a bucket ring so a segment with no hit costs nothing.
//!
//! The bucket ring is shared behind a mutex rather than owned per worker
//! thread: because the segment work queue hands out each segment id exactly
//! once, only one thread ever touches a given ring slot at a time, so
//! contention is inherently limited to one push/drain pair per segment
//! (documented as an Open Question resolution in DESIGN.md).

use std::sync::Mutex;

use crate::bucket::{BucketRing, LargeIdx};
use crate::segmenter::SieveRange;
use crate::wheel::Wheel;

fn first_hit(prime: u64, start: u64) -> u64 {
    let square = prime.saturating_mul(prime);
    let mut hit = square.max(start);
    if hit % 2 == 0 {
        hit += 1;
    }
    while hit % prime != 0 {
        hit += 2;
    }
    hit
}

struct LargePrimeState {
    prime: u64,
}

pub struct PrimeMarker<'w> {
    wheel: &'w Wheel,
    medium_primes: Vec<u64>,
    large_primes: Vec<u64>,
    segment_span: u64,
    bucket_ring: Mutex<BucketRing>,
}

impl<'w> PrimeMarker<'w> {
    /// `base_primes` must be every prime up to `ceil(sqrt(range.end))`,
    /// ascending. `segment_count` sizes the bucket ring.
    pub fn new(
        wheel: &'w Wheel,
        base_primes: &[u32],
        segment_span: u64,
        segment_count: u64,
    ) -> Self {
        let small_limit = wheel.small_patterns.last().map(|p| p.prime).unwrap_or(0);
        let half_span = (segment_span / 2).max(1);

        let mut medium_primes = Vec::new();
        let mut large_primes = Vec::new();
        for &p in base_primes {
            let p = p as u64;
            if p <= small_limit as u64 || wheel.presieve_modulus as u64 % p == 0 {
                continue;
            }
            if p <= half_span {
                medium_primes.push(p);
            } else {
                large_primes.push(p);
            }
        }

        PrimeMarker {
            wheel,
            medium_primes,
            large_primes,
            segment_span,
            bucket_ring: Mutex::new(BucketRing::new(segment_count.max(1) as usize)),
        }
    }

    /// Builds this worker's thread-local state: its shard of medium primes
    /// (round-robin by `worker_id`) seeded to their first hit at or after
    /// `range_begin`, and its large primes pre-scheduled into the shared
    /// bucket ring.
    pub fn make_thread_state(
        &self,
        worker_id: usize,
        thread_count: usize,
        range_begin: u64,
    ) -> ThreadMarkerState {
        let thread_count = thread_count.max(1);

        let mut medium = Vec::new();
        for (i, &p) in self.medium_primes.iter().enumerate() {
            if i % thread_count == worker_id {
                medium.push(MediumPrimeState {
                    prime: p,
                    next_value: first_hit(p, range_begin),
                });
            }
        }

        let mut arena = Vec::new();
        {
            let mut ring = self.bucket_ring.lock().expect("bucket ring poisoned");
            for (i, &p) in self.large_primes.iter().enumerate() {
                if i % thread_count != worker_id {
                    continue;
                }
                let owner = arena.len() as LargeIdx;
                arena.push(LargePrimeState { prime: p });
                let hit = first_hit(p, range_begin);
                let segment_id = (hit - range_begin) / self.segment_span;
                let offset = ((hit - range_begin) % self.segment_span) as u32;
                ring.push(segment_id, p, offset, owner);
            }
        }

        ThreadMarkerState {
            medium,
            arena,
        }
    }

    /// Marks every composite bit in `words` for the segment `[range.begin,
    /// range.end)`. `words` must hold at least enough bits to cover the
    /// range's span (one bit per odd integer).
    pub fn sieve_segment(
        &self,
        segment_id: u64,
        range: SieveRange,
        words: &mut [u64],
        state: &mut ThreadMarkerState,
    ) {
        let bit_count = ((range.span() + 1) / 2) as usize;
        self.wheel.fill_presieve(range.begin, bit_count, words);
        self.apply_small_primes(range.begin, bit_count, words);
        self.apply_medium_primes(range, words, state);
        self.apply_large_primes(segment_id, range, words, state);
    }

    fn apply_small_primes(&self, start_value: u64, bit_count: usize, words: &mut [u64]) {
        for pattern in &self.wheel.small_patterns {
            let prime = pattern.prime as u64;
            let mut phase = (start_value % prime) as u32;
            let full_words = bit_count / 64;
            for word in words.iter_mut().take(full_words) {
                *word |= pattern.masks[phase as usize];
                phase = pattern.next_phase[phase as usize];
            }
            let rem = bit_count % 64;
            if rem != 0 {
                let mask = pattern.masks[phase as usize] & ((1u64 << rem) - 1);
                words[full_words] |= mask;
            }
        }
    }

    fn apply_medium_primes(&self, range: SieveRange, words: &mut [u64], state: &mut ThreadMarkerState) {
        for entry in &mut state.medium {
            while entry.next_value < range.end {
                let bit = ((entry.next_value - range.begin) / 2) as usize;
                words[bit / 64] |= 1u64 << (bit % 64);
                entry.next_value += 2 * entry.prime;
            }
        }
    }

    fn apply_large_primes(
        &self,
        segment_id: u64,
        range: SieveRange,
        words: &mut [u64],
        state: &mut ThreadMarkerState,
    ) {
        let due = {
            let mut ring = self.bucket_ring.lock().expect("bucket ring poisoned");
            ring.take(segment_id)
        };
        for entry in due {
            let bit = (entry.offset / 2) as usize;
            words[bit / 64] |= 1u64 << (bit % 64);

            let prime = state.arena[entry.owner as usize].prime;
            let hit_value = range.begin + entry.offset as u64;
            let next_value = hit_value + 2 * prime;
            let next_segment = segment_id + (next_value - range.begin) / self.segment_span;
            let next_offset = ((next_value - range.begin) % self.segment_span) as u32;

            let mut ring = self.bucket_ring.lock().expect("bucket ring poisoned");
            ring.push(next_segment, prime, next_offset, entry.owner);
        }
    }
}

struct MediumPrimeState {
    prime: u64,
    next_value: u64,
}

pub struct ThreadMarkerState {
    medium: Vec<MediumPrimeState>,
    arena: Vec<LargePrimeState>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base_primes::sieve_up_to;
    use crate::wheel::{get_wheel, WheelType};

    fn count_primes_direct(limit: u64) -> u64 {
        sieve_up_to(limit).len() as u64
    }

    #[test]
    fn first_hit_is_odd_multiple_at_or_past_start() {
        assert_eq!(first_hit(7, 0), 49);
        assert_eq!(first_hit(7, 50), 63);
        assert_eq!(first_hit(11, 200), 209);
    }

    #[test]
    fn single_segment_matches_known_pi_1000() {
        // Start past the wheel's own small-prime limit (19 for mod 30) so
        // none of the sieved primes' own positions get self-marked — that
        // bookkeeping (prefix primes) is the orchestrator's job, not the
        // marker's; see SPEC_FULL.md / the orchestrator module.
        let wheel = get_wheel(WheelType::Mod30);
        let base = sieve_up_to(32); // sqrt(1000) ~ 31.6
        let range = SieveRange { begin: 101, end: 1001 };
        let segment_span = 2048u64;
        let marker = PrimeMarker::new(wheel, &base, segment_span, 1);
        let mut state = marker.make_thread_state(0, 1, range.begin);

        let bit_count = ((range.span() + 1) / 2) as usize;
        let mut words = vec![0u64; (bit_count + 63) / 64];
        marker.sieve_segment(0, range, &mut words, &mut state);

        let zero_bits = crate::popcount::count_zero_bits(&words, bit_count as u64);
        let expected = count_primes_direct(1000) - count_primes_direct(100);
        assert_eq!(zero_bits, expected);
    }

    #[test]
    fn sharded_thread_state_covers_disjoint_primes() {
        let wheel = get_wheel(WheelType::Mod30);
        let base = sieve_up_to(1000);
        let marker = PrimeMarker::new(wheel, &base, 4096, 4);
        let shard0 = marker.make_thread_state(0, 2, 0);
        let shard1 = marker.make_thread_state(1, 2, 0);
        assert_eq!(
            shard0.medium.len() + shard1.medium.len(),
            marker.medium_primes.len()
        );
    }
}
