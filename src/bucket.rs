//! A fixed ring of equal-duration time buckets.
//!
//! The ring is sized once, from the longest configured period, and never grows. Each
//! rotation moves "current" one slot forward and clears that slot, so a bucket keeps its
//! counts for exactly `capacity - 1` rotations after it stops being current.

use crate::counter::DiscreteCounter;

/// One fixed-duration slice of time.
#[derive(Debug, Clone, Default)]
pub struct Bucket {
    pub total: u64,
    pub counter: DiscreteCounter,
}

impl Bucket {
    #[inline]
    pub fn clear(&mut self) {
        self.total = 0;
        self.counter.clear();
    }

    #[inline]
    pub fn record(&mut self, label: &str) {
        self.total += 1;
        self.counter.increment(label);
    }
}

#[derive(Debug)]
pub struct BucketRing {
    ring: Vec<Bucket>,
    current: usize,
    full: bool,
    rotations: u64,
}

impl BucketRing {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            ring: vec![Bucket::default(); capacity],
            current: 0,
            full: false,
            rotations: 0,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.ring.len()
    }

    #[inline]
    pub fn current_index(&self) -> usize {
        self.current
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.full
    }

    #[inline]
    pub fn rotations(&self) -> u64 {
        self.rotations
    }

    #[inline]
    pub fn current_bucket(&self) -> &Bucket {
        &self.ring[self.current]
    }

    #[inline]
    pub fn current_bucket_mut(&mut self) -> &mut Bucket {
        &mut self.ring[self.current]
    }

    #[inline]
    pub fn record(&mut self, label: &str) {
        self.current_bucket_mut().record(label);
    }

    /// Number of buckets that hold data written since the ring was created.
    #[inline]
    pub fn available(&self) -> usize {
        if self.full {
            self.capacity()
        } else {
            self.current + 1
        }
    }

    /// Advances to the next bucket and zeroes it out. Happens even if the outgoing bucket
    /// saw no events.
    pub fn rotate(&mut self) {
        self.current = (self.current + 1) % self.capacity();
        if !self.full && self.current == 0 {
            self.full = true;
        }
        self.rotations += 1;
        self.current_bucket_mut().clear();
    }

    /// The last `n` buckets, oldest first, ending with the current one. `n` is clamped to
    /// [`available`](Self::available).
    pub fn last_n(&self, n: usize) -> impl Iterator<Item = &Bucket> + '_ {
        let n = n.min(self.available());
        let capacity = self.capacity();
        let current = self.current;
        (0..n)
            .rev()
            .map(move |i| &self.ring[(current + capacity - i) % capacity])
    }
}
