//! Bucket ring (C4): per-segment deferred marking events for large primes.
//!
//! `original_source/include/bucket.h` stores a raw `LargePrimeState*` in
//! each entry; here the owner is an index into a thread-local arena
//! (`LargeIdx`) instead, per the spec's own DESIGN NOTES on avoiding
//! pointer-chasing state across threads.

pub type LargeIdx = u32;

#[derive(Debug, Clone, Copy)]
pub struct BucketEntry {
    pub prime: u64,
    pub next: i32,
    pub offset: u32,
    pub owner: LargeIdx,
    segment_id: u64,
}

/// A ring of singly-linked lists, one list head per segment slot. Entries
/// are pushed into `ring[segment_id % capacity]` and drained (`take`) in one
/// pass when that segment is processed.
pub struct BucketRing {
    capacity: usize,
    heads: Vec<i32>,
    entries: Vec<BucketEntry>,
    free_list: Vec<i32>,
}

impl BucketRing {
    pub fn new(capacity: usize) -> Self {
        BucketRing {
            capacity: capacity.max(1),
            heads: vec![-1; capacity.max(1)],
            entries: Vec::new(),
            free_list: Vec::new(),
        }
    }

    fn slot(&self, segment_id: u64) -> usize {
        (segment_id % self.capacity as u64) as usize
    }

    /// Clears the list head for `segment_id`'s ring slot, returning its
    /// entries to the free list. Must be called once a segment's bucket
    /// list has been fully drained via `take`.
    pub fn reset(&mut self, segment_id: u64) {
        let slot = self.slot(segment_id);
        self.heads[slot] = -1;
    }

    pub fn push(&mut self, segment_id: u64, prime: u64, offset: u32, owner: LargeIdx) {
        let slot = self.slot(segment_id);
        let idx = if let Some(idx) = self.free_list.pop() {
            self.entries[idx as usize] = BucketEntry {
                prime,
                next: self.heads[slot],
                offset,
                owner,
                segment_id,
            };
            idx
        } else {
            self.entries.push(BucketEntry {
                prime,
                next: self.heads[slot],
                offset,
                owner,
                segment_id,
            });
            (self.entries.len() - 1) as i32
        };
        self.heads[slot] = idx;
    }

    /// Drains every entry queued for `segment_id`, returning them in
    /// arbitrary order, and resets that slot's head.
    pub fn take(&mut self, segment_id: u64) -> Vec<BucketEntry> {
        let slot = self.slot(segment_id);
        let mut out = Vec::new();
        let mut cur = self.heads[slot];
        while cur >= 0 {
            let entry = self.entries[cur as usize];
            out.push(entry);
            let next = entry.next;
            self.free_list.push(cur);
            cur = next;
        }
        self.heads[slot] = -1;
        out
    }

    /// Grows the ring so it can address `new_capacity` distinct segment
    /// slots without collision, rehashing existing entries into their new
    /// `segment_id % new_capacity` slot. Used when the wrap distance between
    /// a large prime's own segment span and the ring size would otherwise
    /// alias two live segments onto one slot.
    pub fn ensure_capacity(&mut self, new_capacity: usize) {
        if new_capacity <= self.capacity {
            return;
        }
        log::debug!("bucket ring rehash: {} -> {new_capacity} slots", self.capacity);

        let mut new_heads = vec![-1i32; new_capacity];
        for &old_head in &self.heads {
            let mut cur = old_head;
            while cur >= 0 {
                let next = self.entries[cur as usize].next;
                let new_slot = (self.entries[cur as usize].segment_id % new_capacity as u64) as usize;
                self.entries[cur as usize].next = new_heads[new_slot];
                new_heads[new_slot] = cur;
                cur = next;
            }
        }

        self.heads = new_heads;
        self.capacity = new_capacity;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_then_take_returns_everything_pushed() {
        let mut ring = BucketRing::new(8);
        ring.push(3, 101, 5, 0);
        ring.push(3, 103, 7, 1);
        ring.push(3, 107, 2, 2);

        let mut primes: Vec<u64> = ring.take(3).iter().map(|e| e.prime).collect();
        primes.sort_unstable();
        assert_eq!(primes, vec![101, 103, 107]);
    }

    #[test]
    fn take_empties_the_slot() {
        let mut ring = BucketRing::new(4);
        ring.push(1, 13, 0, 0);
        assert_eq!(ring.take(1).len(), 1);
        assert!(ring.take(1).is_empty());
    }

    #[test]
    fn slots_wrap_around_capacity() {
        let mut ring = BucketRing::new(4);
        ring.push(0, 17, 0, 0);
        ring.push(4, 19, 0, 0);
        // segment 4 aliases to the same slot as segment 0.
        let mut combined: Vec<u64> = ring.take(0).iter().map(|e| e.prime).collect();
        combined.sort_unstable();
        assert_eq!(combined, vec![17, 19]);
    }

    #[test]
    fn entries_are_reused_after_being_taken() {
        let mut ring = BucketRing::new(4);
        for i in 0..100u64 {
            ring.push(i % 4, 1000 + i, 0, 0);
            ring.take(i % 4);
        }
        // Arena should not have grown unboundedly: reuse keeps it small.
        assert!(ring.entries.len() <= 4);
    }

    #[test]
    fn ensure_capacity_rehashes_aliased_entries_into_distinct_slots() {
        let mut ring = BucketRing::new(4);
        ring.push(0, 11, 0, 0);
        ring.push(4, 13, 0, 1); // aliases segment 0's slot under capacity 4
        ring.push(1, 17, 0, 2);

        ring.ensure_capacity(8);

        let seg0: Vec<u64> = ring.take(0).iter().map(|e| e.prime).collect();
        let seg4: Vec<u64> = ring.take(4).iter().map(|e| e.prime).collect();
        let seg1: Vec<u64> = ring.take(1).iter().map(|e| e.prime).collect();
        assert_eq!(seg0, vec![11]);
        assert_eq!(seg4, vec![13]);
        assert_eq!(seg1, vec![17]);
    }

    #[test]
    fn ensure_capacity_is_a_no_op_when_shrinking_or_equal() {
        let mut ring = BucketRing::new(8);
        ring.push(2, 23, 0, 0);
        ring.ensure_capacity(8);
        ring.ensure_capacity(4);
        assert_eq!(ring.take(2).iter().map(|e| e.prime).collect::<Vec<_>>(), vec![23]);
    }

    #[test]
    fn idempotent_multiset_of_pushes_equals_takes() {
        let mut ring = BucketRing::new(16);
        let mut pushed = Vec::new();
        for i in 0..50u64 {
            let seg = i % 16;
            ring.push(seg, 2 * i + 1, (i % 7) as u32, (i % 3) as u32);
            pushed.push((seg, 2 * i + 1));
        }
        let mut taken = Vec::new();
        for seg in 0..16u64 {
            for entry in ring.take(seg) {
                taken.push((seg, entry.prime));
            }
        }
        pushed.sort_unstable();
        taken.sort_unstable();
        assert_eq!(pushed, taken);
    }
}
