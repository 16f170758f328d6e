/// A compact bit vector used as the null indicator for dense segment storage.
///
/// Bits are stored little-endian within each `u64` word. A maintained ones
/// count keeps `count_ones` O(1), which the cache uses for
/// `effective_len = cells - nulls`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bitmap {
    words: Vec<u64>,
    len: usize,
    ones: usize,
}

impl Bitmap {
    /// A bitmap of `len` bits, all set to `value`.
    pub fn new_filled(len: usize, value: bool) -> Self {
        if len == 0 {
            return Self {
                words: Vec::new(),
                len: 0,
                ones: 0,
            };
        }

        let word_len = (len + 63) / 64;
        if !value {
            return Self {
                words: vec![0u64; word_len],
                len,
                ones: 0,
            };
        }

        let mut words = vec![u64::MAX; word_len];
        let rem = len % 64;
        if rem != 0 {
            if let Some(last) = words.last_mut() {
                *last = (1u64 << rem) - 1;
            }
        }
        Self {
            words,
            len,
            ones: len,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, index: usize) -> bool {
        debug_assert!(index < self.len, "Bitmap index out of bounds");
        let word = self.words[index / 64];
        ((word >> (index % 64)) & 1) == 1
    }

    pub fn set(&mut self, index: usize, value: bool) {
        debug_assert!(index < self.len, "Bitmap index out of bounds");
        let word_idx = index / 64;
        let mask = 1u64 << (index % 64);
        let was_set = (self.words[word_idx] & mask) != 0;

        match (was_set, value) {
            (true, false) => {
                self.words[word_idx] &= !mask;
                self.ones -= 1;
            }
            (false, true) => {
                self.words[word_idx] |= mask;
                self.ones += 1;
            }
            _ => {}
        }
    }

    pub fn count_ones(&self) -> usize {
        self.ones
    }
}
