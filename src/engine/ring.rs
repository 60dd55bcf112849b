//! Fixed-capacity circular buffer with independent cursors
//!
//! Storage holds `I` values; reads convert to `O`. Capacity is always a power
//! of two so cursor arithmetic is a mask. Slots that were never written read
//! as zero.

use num_traits::{AsPrimitive, Zero};
use std::marker::PhantomData;

/// Round up to the next power of two (0 and 1 both give 1)
#[inline]
pub fn power_ceil(x: usize) -> usize {
    x.max(1).next_power_of_two()
}

/// Single-writer/single-reader ring for one audio channel
#[derive(Debug, Clone)]
pub struct CircularBuffer<I, O> {
    buffer: Vec<I>,
    mask: usize,
    write_pos: usize,
    read_pos: usize,
    _out: PhantomData<O>,
}

impl<I, O> Default for CircularBuffer<I, O>
where
    I: Copy + Zero + AsPrimitive<O>,
    O: Copy + Zero + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<I, O> CircularBuffer<I, O>
where
    I: Copy + Zero + AsPrimitive<O>,
    O: Copy + Zero + 'static,
{
    /// Create an empty, uninitialized buffer (capacity 0)
    pub fn new() -> Self {
        Self {
            buffer: Vec::new(),
            mask: 0,
            write_pos: 0,
            read_pos: 0,
            _out: PhantomData,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let mut ring = Self::new();
        ring.initialize(capacity);
        ring
    }

    /// Allocate zeroed storage of `power_ceil(capacity)` and reset both cursors
    pub fn initialize(&mut self, capacity: usize) {
        let capacity = power_ceil(capacity);
        self.buffer = vec![I::zero(); capacity];
        self.mask = capacity - 1;
        self.write_pos = 0;
        self.read_pos = 0;
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        !self.buffer.is_empty()
    }

    #[inline]
    pub fn write_position(&self) -> usize {
        self.write_pos
    }

    #[inline]
    pub fn read_position(&self) -> usize {
        self.read_pos
    }

    /// Append `elements` at the write cursor, converting each to `I`
    pub fn put<T>(&mut self, elements: &[T])
    where
        T: AsPrimitive<I>,
    {
        if !self.is_initialized() {
            return;
        }
        for &element in elements {
            self.buffer[self.write_pos] = element.as_();
            self.write_pos = (self.write_pos + 1) & self.mask;
        }
    }

    /// Fill `out` from the read cursor, converting each to `O`
    pub fn get(&mut self, out: &mut [O]) {
        if !self.is_initialized() {
            out.fill(O::zero());
            return;
        }
        for sample in out.iter_mut() {
            *sample = self.buffer[self.read_pos].as_();
            self.read_pos = (self.read_pos + 1) & self.mask;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_power_ceil() {
        assert_eq!(power_ceil(0), 1);
        assert_eq!(power_ceil(1), 1);
        assert_eq!(power_ceil(400), 512);
        assert_eq!(power_ceil(512), 512);
        assert_eq!(power_ceil(4097), 8192);
    }

    #[test]
    fn test_get_before_put_is_silent() {
        let mut ring = CircularBuffer::<f32, f64>::with_capacity(64);
        let mut out = vec![1.0_f64; 48];
        ring.get(&mut out);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_put_then_get_preserves_order() {
        let mut ring = CircularBuffer::<f32, f32>::with_capacity(16);
        let block = [0.1, 0.2, 0.3, 0.4, 0.5];
        ring.put(&block);

        let mut out = [0.0; 5];
        ring.get(&mut out);
        assert_eq!(out, block);
    }

    #[test]
    fn test_wraparound_keeps_order() {
        let mut ring = CircularBuffer::<f32, f32>::with_capacity(8);
        let mut scratch = [0.0; 6];
        ring.put(&[9.0; 6]);
        ring.get(&mut scratch);
        assert_eq!((ring.write_position(), ring.read_position()), (6, 6));

        ring.put(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let mut out = [0.0; 5];
        ring.get(&mut out);

        assert_eq!(out, [1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!((ring.write_position(), ring.read_position()), (3, 3));
    }

    #[test]
    fn test_converts_on_write_and_read() {
        let mut ring = CircularBuffer::<f32, f64>::with_capacity(4);
        ring.put(&[0.5_f64, -0.25_f64]);
        ring.put(&[3_i32]);

        let mut out = [0.0_f64; 3];
        ring.get(&mut out);
        assert_relative_eq!(out[0], 0.5);
        assert_relative_eq!(out[1], -0.25);
        assert_relative_eq!(out[2], 3.0);
    }

    #[test]
    fn test_uninitialized_ring_is_silent() {
        let mut ring = CircularBuffer::<f32, f32>::new();
        ring.put(&[1.0, 2.0]);
        let mut out = [7.0; 3];
        ring.get(&mut out);
        assert_eq!(out, [0.0; 3]);
        assert_eq!(ring.capacity(), 0);
    }

    #[test]
    fn test_initialize_rounds_and_resets() {
        let mut ring = CircularBuffer::<f32, f32>::with_capacity(4);
        ring.put(&[1.0, 2.0, 3.0]);
        ring.initialize(400);

        assert_eq!(ring.capacity(), 512);
        assert_eq!(ring.write_position(), 0);
        let mut out = [1.0; 3];
        ring.get(&mut out);
        assert_eq!(out, [0.0; 3]);
    }
}
