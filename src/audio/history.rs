//! Fixed-capacity sample history.
//!
//! Circular storage: pushing a sample overwrites the oldest slot and advances
//! the head, so ingesting a block costs O(block length) regardless of
//! capacity. Readers always see exactly `capacity` samples, oldest first.

/// Most recent `capacity` samples of one channel.
#[derive(Debug, Clone)]
pub struct SampleHistory {
    buffer: Box<[f32]>,
    /// Index of the oldest sample (and the next slot to overwrite)
    head: usize,
}

impl SampleHistory {
    /// Zero-filled history. `capacity` must be non-zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "history capacity must be non-zero");
        Self {
            buffer: vec![0.0; capacity].into_boxed_slice(),
            head: 0,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Always equal to [`capacity`](Self::capacity).
    #[inline]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Evict the oldest sample and append `sample` as the newest.
    #[inline]
    pub fn push(&mut self, sample: f32) {
        self.buffer[self.head] = sample;
        self.head += 1;
        if self.head == self.buffer.len() {
            self.head = 0;
        }
    }

    pub fn extend<I: IntoIterator<Item = f32>>(&mut self, samples: I) {
        for s in samples {
            self.push(s);
        }
    }

    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.head = 0;
    }

    /// Copy the history into `out`, oldest first.
    pub fn copy_ordered(&self, out: &mut [f32]) {
        assert_eq!(out.len(), self.buffer.len(), "snapshot length mismatch");
        let (newer, older) = self.buffer.split_at(self.head);
        out[..older.len()].copy_from_slice(older);
        out[older.len()..].copy_from_slice(newer);
    }

    pub fn to_vec(&self) -> Vec<f32> {
        let mut out = vec![0.0; self.buffer.len()];
        self.copy_ordered(&mut out);
        out
    }

    /// Oldest-first iterator.
    pub fn iter(&self) -> impl Iterator<Item = f32> + '_ {
        let (newer, older) = self.buffer.split_at(self.head);
        older.iter().chain(newer.iter()).copied()
    }

    /// Most recent sample.
    pub fn newest(&self) -> f32 {
        let idx = if self.head == 0 { self.buffer.len() - 1 } else { self.head - 1 };
        self.buffer[idx]
    }
}
