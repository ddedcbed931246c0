//! Wheel-bitmap counter (C7): a count-only engine for mod-30 and mod-210
//! wheels that packs only coprime residues into the bitmap, skipping the
//! segmented-sieve machinery in `marker`/`bucket` entirely. Grounded on
//! `original_source/src/wheel_bitmap_count.cpp`'s `count_with_kernel30_fast`
//! (dynamic, atomic-counter work-stealing) and `count_with_kernel210_fast`
//! (static per-worker partition).
//!
//! Mod 1155 has no counterpart here, matching `supports_wheel_bitmap_count()`
//! in the original, which only ever returns true for mod 30 and mod 210.

use std::sync::atomic::{AtomicU64, Ordering};

use rayon::prelude::*;

use crate::popcount;
use crate::wheel::{Wheel, WheelType};

const DYNAMIC_CHUNK_BLOCKS: u64 = 64;

pub struct WheelBitmapEngine<'w> {
    wheel: &'w Wheel,
    residue_rank_of: Vec<i32>,
}

impl<'w> WheelBitmapEngine<'w> {
    /// Returns `None` for wheels this engine doesn't support (mod 1155).
    pub fn new(wheel: &'w Wheel) -> Option<Self> {
        if wheel.wheel_type == WheelType::Mod1155 {
            return None;
        }
        let modulus = wheel.modulus as usize;
        let mut residue_rank_of = vec![-1i32; modulus];
        for (rank, &r) in wheel.residues.iter().enumerate() {
            residue_rank_of[r as usize] = rank as i32;
        }
        Some(WheelBitmapEngine {
            wheel,
            residue_rank_of,
        })
    }

    fn residue_count(&self) -> usize {
        self.wheel.residues.len()
    }

    fn candidate_index(&self, value: u64, block0: u64) -> Option<usize> {
        let modulus = self.wheel.modulus as u64;
        let block = value / modulus;
        let residue = (value % modulus) as usize;
        let rank = self.residue_rank_of[residue];
        if rank < 0 {
            return None;
        }
        Some(((block - block0) as usize) * self.residue_count() + rank as usize)
    }

    /// Single-threaded count over `[from, to)`, excluding the wheel's own
    /// prefix primes (2, 3, 5[, 7]) — callers add those separately.
    pub fn count(&self, from: u64, to: u64, base_primes: &[u32]) -> u64 {
        if to <= from {
            return 0;
        }
        self.count_block_range(from, to, from / self.wheel.modulus as u64, (to - 1) / self.wheel.modulus as u64, base_primes)
    }

    fn count_block_range(
        &self,
        from: u64,
        to: u64,
        block0: u64,
        block1: u64,
        base_primes: &[u32],
    ) -> u64 {
        let modulus = self.wheel.modulus as u64;
        let block_count = block1 - block0 + 1;
        let total_candidates = block_count as usize * self.residue_count();
        let mut words = vec![0u64; (total_candidates + 63) / 64];

        for &p in base_primes {
            let p = p as u64;
            if self.wheel.presieved_primes.iter().any(|&q| q as u64 == p) {
                continue;
            }
            if p.saturating_mul(p) >= to {
                continue;
            }
            self.mark_prime(p, from, to, block0, &mut words);
        }

        // The boundary blocks may hold candidates outside [from, to); mark
        // those bits too so the population count below can treat them as
        // excluded the same way it treats composites.
        for (rank, &residue) in self.wheel.residues.iter().enumerate() {
            if block0 * modulus + residue as u64 < from {
                let idx = rank;
                words[idx / 64] |= 1u64 << (idx % 64);
            }
            if block1 * modulus + residue as u64 >= to {
                let idx = (block1 - block0) as usize * self.residue_count() + rank;
                words[idx / 64] |= 1u64 << (idx % 64);
            }
        }

        if total_candidates % 64 == 0 {
            popcount::count_zero_bits_full(&words)
        } else {
            popcount::count_zero_bits(&words, total_candidates as u64)
        }
    }

    fn mark_prime(&self, prime: u64, from: u64, to: u64, block0: u64, words: &mut [u64]) {
        let modulus = self.wheel.modulus as u64;
        let residues = &self.wheel.residues;
        let steps = &self.wheel.steps;
        let n = residues.len();
        if n == 0 {
            return;
        }

        let k_start = prime.max((from + prime - 1) / prime);
        let mut k = k_start;
        while self.residue_rank_of[(k % modulus) as usize] < 0 {
            k += 1;
        }
        let mut rank = self.residue_rank_of[(k % modulus) as usize] as usize;

        loop {
            let v = match prime.checked_mul(k) {
                Some(v) if v < to => v,
                _ => break,
            };
            if v >= from {
                if let Some(idx) = self.candidate_index(v, block0) {
                    words[idx / 64] |= 1u64 << (idx % 64);
                }
            }
            k += steps[rank] as u64;
            rank = (rank + 1) % n;
        }
    }

    /// Multi-threaded count. Mod 210 statically partitions the block range
    /// across workers; mod 30 claims `DYNAMIC_CHUNK_BLOCKS`-sized chunks off
    /// a shared atomic counter, matching the original's per-wheel strategy.
    pub fn count_concurrent(&self, from: u64, to: u64, base_primes: &[u32], thread_count: usize) -> u64 {
        if to <= from {
            return 0;
        }
        let modulus = self.wheel.modulus as u64;
        let block0 = from / modulus;
        let block1 = (to - 1) / modulus;
        let thread_count = thread_count.max(1);

        match self.wheel.wheel_type {
            WheelType::Mod210 => {
                let total_blocks = block1 - block0 + 1;
                let chunk = (total_blocks + thread_count as u64 - 1) / thread_count as u64;
                (0..thread_count)
                    .into_par_iter()
                    .map(|worker| {
                        let start = block0 + worker as u64 * chunk;
                        if start > block1 {
                            return 0;
                        }
                        let end = (start + chunk - 1).min(block1);
                        let from_clamped = (start * modulus).max(from);
                        let to_clamped = ((end + 1) * modulus).min(to);
                        self.count_block_range(from_clamped, to_clamped, start, end, base_primes)
                    })
                    .sum()
            }
            _ => {
                let next_chunk = AtomicU64::new(block0);
                let partials: Vec<u64> = (0..thread_count)
                    .into_par_iter()
                    .map(|_| {
                        let mut local = 0u64;
                        loop {
                            let start = next_chunk.fetch_add(DYNAMIC_CHUNK_BLOCKS, Ordering::Relaxed);
                            if start > block1 {
                                break;
                            }
                            let end = (start + DYNAMIC_CHUNK_BLOCKS - 1).min(block1);
                            let from_clamped = (start * modulus).max(from);
                            let to_clamped = ((end + 1) * modulus).min(to);
                            local += self.count_block_range(from_clamped, to_clamped, start, end, base_primes);
                        }
                        local
                    })
                    .collect();
                partials.into_iter().sum()
            }
        }
    }
}

pub fn supports_wheel_bitmap_count(wheel_type: WheelType) -> bool {
    matches!(wheel_type, WheelType::Mod30 | WheelType::Mod210)
}
