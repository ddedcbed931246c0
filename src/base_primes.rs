//! Base-prime producer (C2): an ordinary sieve of Eratosthenes over
//! `[2, limit]`, used to seed the marker with primes up to `sqrt(to)`.

use bitvec::prelude::*;

/// Returns every prime `p <= limit`, ascending.
pub fn sieve_up_to(limit: u64) -> Vec<u32> {
    if limit < 2 {
        return Vec::new();
    }
    let limit = limit as usize;

    let mut is_composite: BitVec = bitvec![0; limit + 1];
    let mut primes = Vec::new();

    let mut n = 2usize;
    while n * n <= limit {
        if !is_composite[n] {
            let mut m = n * n;
            while m <= limit {
                is_composite.set(m, true);
                m += n;
            }
        }
        n += 1;
    }

    for n in 2..=limit {
        if !is_composite[n] {
            primes.push(n as u32);
        }
    }
    primes
}

/// Smallest integer `r` with `r * r >= n`.
pub fn isqrt_ceil(n: u64) -> u64 {
    if n == 0 {
        return 0;
    }
    let mut r = (n as f64).sqrt() as u64;
    while r * r < n {
        r += 1;
    }
    while r > 0 && (r - 1) * (r - 1) >= n {
        r -= 1;
    }
    r
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sieve_matches_known_primes() {
        assert_eq!(sieve_up_to(30), vec![2, 3, 5, 7, 11, 13, 17, 19, 23, 29]);
    }

    #[test]
    fn sieve_handles_small_limits() {
        assert_eq!(sieve_up_to(0), Vec::<u32>::new());
        assert_eq!(sieve_up_to(1), Vec::<u32>::new());
        assert_eq!(sieve_up_to(2), vec![2]);
    }

    #[test]
    fn isqrt_ceil_is_exact_at_perfect_squares() {
        assert_eq!(isqrt_ceil(100), 10);
        assert_eq!(isqrt_ceil(101), 11);
        assert_eq!(isqrt_ceil(99), 10);
        assert_eq!(isqrt_ceil(1_000_000_000_000), 1_000_000);
    }
}
