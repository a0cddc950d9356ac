//! Scratch buffer used by the buffered driver.
//!
//! The buffer glues successive chunks into one contiguous byte range so the
//! engine can be re-presented with a single view on every resumption. It
//! keeps the still-uncommitted tail of earlier chunks plus whatever has been
//! fed since, and reclaims the committed prefix with [`Buffer::consume`].
//!
//! Growth policy, in order of preference: append in place when the unused
//! tail is large enough; compact (shift the live range to offset zero) when
//! the total free space suffices; otherwise grow capacity by three halves
//! until the new bytes fit, then copy-compact into the new allocation.

/// A growable byte buffer with a movable logical start.
#[derive(Debug)]
pub struct Buffer {
    data: Vec<u8>,
    off: usize,
    len: usize,
}

impl Buffer {
    /// Creates a buffer with `capacity` bytes of backing storage.
    pub fn with_capacity(capacity: usize) -> Self {
        Buffer {
            data: vec![0; capacity],
            off: 0,
            len: 0,
        }
    }

    /// Number of live bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the live range is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The live byte range.
    #[inline]
    pub fn view(&self) -> &[u8] {
        &self.data[self.off..self.off + self.len]
    }

    /// Appends `bytes` after the live range, growing if necessary.
    pub fn feed(&mut self, bytes: &[u8]) {
        let needed = bytes.len();
        let tail_free = self.data.len() - (self.off + self.len);
        if tail_free < needed {
            if self.data.len() - self.len >= needed {
                // Freed prefix plus tail is enough: shift live bytes down.
                self.data.copy_within(self.off..self.off + self.len, 0);
                self.off = 0;
            } else {
                let mut capacity = self.data.len().max(1);
                while capacity - self.len < needed {
                    capacity = capacity + capacity / 2 + 1;
                }
                let mut grown = vec![0; capacity];
                grown[..self.len].copy_from_slice(self.view());
                self.data = grown;
                self.off = 0;
            }
        }
        let at = self.off + self.len;
        self.data[at..at + needed].copy_from_slice(bytes);
        self.len += needed;
    }

    /// Advances the logical start by `n`, freeing that prefix.
    ///
    /// Panics if `n` exceeds the live length; that is a driver bug.
    pub fn consume(&mut self, n: usize) {
        assert!(n <= self.len, "consumed past the live buffer range");
        self.off += n;
        self.len -= n;
    }

    /// Consumes the buffer, exporting the live tail with its backing store.
    pub fn unconsumed(self) -> Unconsumed {
        Unconsumed {
            buf: self.data,
            off: self.off,
            len: self.len,
        }
    }
}

/// The tail of buffered input that a finished parse never consumed.
///
/// `buf` is the backing store; the live bytes are `buf[off..off + len]`.
#[derive(Debug, Clone)]
pub struct Unconsumed {
    /// Backing storage, possibly larger than the live range.
    pub buf: Vec<u8>,
    /// Offset of the first live byte.
    pub off: usize,
    /// Number of live bytes.
    pub len: usize,
}

impl Unconsumed {
    /// The live bytes.
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.buf[self.off..self.off + self.len]
    }

    /// Appends more input after the live range.
    ///
    /// Used by the buffered driver when data keeps arriving after the parse
    /// already reached a terminal state.
    pub(crate) fn extend(&mut self, bytes: &[u8]) {
        self.buf.truncate(self.off + self.len);
        self.buf.extend_from_slice(bytes);
        self.len += bytes.len();
    }
}
