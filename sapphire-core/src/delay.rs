//! Circular delay line with a fixed capacity and an adjustable logical length.
//!
//! Storage is allocated once. `set_len` only moves the wrap point, so changing
//! a waveguide's pitch never touches the allocator on the audio thread.
//! `reserve` is the one exception and belongs to sample-rate changes.

use crate::error::CoreError;

#[derive(Clone, Debug)]
pub struct DelayLine<T> {
    buf: Vec<T>,
    cursor: usize,
    len: usize,
}

// A line always holds at least one sample.
#[allow(clippy::len_without_is_empty)]
impl<T: Copy + Default> DelayLine<T> {
    /// A line holding up to `capacity` samples. Starts at full length.
    pub fn new(capacity: usize) -> Result<Self, CoreError> {
        if capacity == 0 {
            return Err(CoreError::ZeroCapacity);
        }
        Ok(Self { buf: vec![T::default(); capacity], cursor: 0, len: capacity })
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Set the logical length, clamped to `[1, capacity]`.
    #[inline]
    pub fn set_len(&mut self, len: usize) {
        self.len = len.clamp(1, self.buf.len());
        self.cursor %= self.len;
    }

    /// Grow or shrink the storage and clear it.
    pub fn reserve(&mut self, capacity: usize) -> Result<(), CoreError> {
        if capacity == 0 {
            return Err(CoreError::ZeroCapacity);
        }
        self.buf.clear();
        self.buf.resize(capacity, T::default());
        self.cursor = 0;
        self.len = self.len.clamp(1, capacity);
        Ok(())
    }

    pub fn clear(&mut self) {
        self.buf.fill(T::default());
        self.cursor = 0;
    }

    /// The sample written `delay + 1` writes ago. `delay` wraps at `len`.
    #[inline]
    pub fn read(&self, delay: usize) -> T {
        let back = delay % self.len;
        self.buf[(self.cursor + self.len - 1 - back) % self.len]
    }

    #[inline]
    pub fn write(&mut self, x: T) {
        self.buf[self.cursor] = x;
        self.cursor += 1;
        if self.cursor >= self.len {
            self.cursor = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(matches!(DelayLine::<f32>::new(0), Err(CoreError::ZeroCapacity)));
    }

    #[test]
    fn read_returns_history_in_order() {
        let mut d = DelayLine::<f32>::new(8).unwrap();
        d.set_len(4);
        for x in [1.0, 2.0, 3.0, 4.0, 5.0] {
            d.write(x);
        }
        assert_eq!(d.read(0), 5.0);
        assert_eq!(d.read(1), 4.0);
        assert_eq!(d.read(3), 2.0);
        // wraps at the logical length
        assert_eq!(d.read(4), 5.0);
    }

    #[test]
    fn length_is_clamped_to_capacity() {
        let mut d = DelayLine::<f32>::new(16).unwrap();
        d.set_len(1000);
        assert_eq!(d.len(), 16);
        d.set_len(0);
        assert_eq!(d.len(), 1);
    }

    #[test]
    fn write_then_read_len_minus_one_is_full_delay() {
        let mut d = DelayLine::<f32>::new(32).unwrap();
        d.set_len(10);
        d.write(1.0);
        for _ in 0..9 {
            d.write(0.0);
        }
        assert_eq!(d.read(9), 1.0);
        d.write(0.0);
        assert_eq!(d.read(9), 0.0);
    }

    #[test]
    fn reserve_clears_history() {
        let mut d = DelayLine::<f32>::new(4).unwrap();
        d.write(3.0);
        d.reserve(64).unwrap();
        assert_eq!(d.capacity(), 64);
        assert_eq!(d.read(0), 0.0);
        d.set_len(64);
        assert_eq!(d.len(), 64);
    }
}
