//! Popcount kernel (C6): counts zero bits (surviving, unmarked candidates)
//! over a word slice. `original_source/src/popcnt.cpp` hand-rolls SWAR and
//! AVX2/AVX512 popcount; `u64::count_ones` compiles to the same `POPCNT`
//! instruction on targets that have it, so it stands in for the portable
//! fallback path without bringing in SIMD intrinsics.

/// Counts the zero bits across `words`, where `valid_bits` is the number of
/// bits that actually belong to the range (bits beyond it, in the final
/// partial word, are masked out of the count).
pub fn count_zero_bits(words: &[u64], valid_bits: u64) -> u64 {
    if valid_bits == 0 {
        return 0;
    }
    let full_words = (valid_bits / 64) as usize;
    let rem_bits = valid_bits % 64;

    let mut ones: u64 = words[..full_words.min(words.len())]
        .iter()
        .map(|w| w.count_ones() as u64)
        .sum();

    if rem_bits != 0 {
        if let Some(&tail) = words.get(full_words) {
            let mask = (1u64 << rem_bits) - 1;
            ones += (tail & mask).count_ones() as u64;
        }
    }

    valid_bits - ones
}

/// Like `count_zero_bits`, but `words` is already known to cover a whole
/// number of words (no tail masking needed) — the common case for
/// full, non-final segments.
pub fn count_zero_bits_full(words: &[u64]) -> u64 {
    let ones: u64 = words.iter().map(|w| w.count_ones() as u64).sum();
    (words.len() as u64) * 64 - ones
}
