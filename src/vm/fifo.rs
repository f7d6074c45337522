use thiserror::Error;

/// Default depth of an instruction stream: the longest legal encoding plus
/// some room for redundant prefixes.
pub const DEFAULT_CAPACITY: usize = 16;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FifoError {
    #[error("fifo is full ({capacity} entries)")]
    Full { capacity: usize },
    #[error("fifo is empty")]
    Empty,
}

/// Bounded FIFO used to feed instruction bytes to the decoder.
///
/// Storage is allocated once at construction and never grows.
#[derive(Debug, Clone)]
pub struct Fifo<T> {
    buffer: Box<[T]>,
    head: usize,
    len: usize,
}

impl<T: Copy + Default> Fifo<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: vec![T::default(); capacity].into_boxed_slice(),
            head: 0,
            len: 0,
        }
    }

    pub fn push(&mut self, value: T) -> Result<(), FifoError> {
        if self.len == self.capacity() {
            return Err(FifoError::Full {
                capacity: self.capacity(),
            });
        }
        let tail = (self.head + self.len) % self.capacity();
        self.buffer[tail] = value;
        self.len += 1;
        Ok(())
    }

    pub fn pop(&mut self) -> Result<T, FifoError> {
        let value = self.peek()?;
        self.head = (self.head + 1) % self.capacity();
        self.len -= 1;
        Ok(value)
    }

    pub fn peek(&self) -> Result<T, FifoError> {
        if self.len == 0 {
            return Err(FifoError::Empty);
        }
        Ok(self.buffer[self.head])
    }

    pub fn extend_from_slice(&mut self, values: &[T]) -> Result<(), FifoError> {
        values.iter().try_for_each(|&value| self.push(value))
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }
}

impl<T: Copy + Default> Default for Fifo<T> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pops_in_push_order() {
        let mut fifo = Fifo::new(4);
        fifo.extend_from_slice(&[1u8, 2, 3]).unwrap();
        assert_eq!(fifo.pop(), Ok(1));
        assert_eq!(fifo.pop(), Ok(2));
        assert_eq!(fifo.pop(), Ok(3));
        assert_eq!(fifo.pop(), Err(FifoError::Empty));
    }

    #[test]
    fn push_past_capacity_fails() {
        let mut fifo = Fifo::new(2);
        fifo.push(0xAAu8).unwrap();
        fifo.push(0xBB).unwrap();
        assert_eq!(fifo.push(0xCC), Err(FifoError::Full { capacity: 2 }));
        assert_eq!(fifo.len(), 2);
    }

    #[test]
    fn wraps_around_the_ring() {
        let mut fifo = Fifo::new(3);
        for round in 0..10u8 {
            fifo.push(round).unwrap();
            fifo.push(round.wrapping_add(100)).unwrap();
            assert_eq!(fifo.pop(), Ok(round));
            assert_eq!(fifo.pop(), Ok(round.wrapping_add(100)));
        }
        assert!(fifo.is_empty());
    }

    #[test]
    fn peek_does_not_consume() {
        let mut fifo = Fifo::new(2);
        fifo.push(7u8).unwrap();
        fifo.push(8).unwrap();
        assert_eq!(fifo.peek(), Ok(7));
        assert_eq!(fifo.peek(), Ok(7));
        assert_eq!(fifo.pop(), Ok(7));
        assert_eq!(fifo.peek(), Ok(8));
    }

    #[test]
    fn clear_empties_the_stream() {
        let mut fifo: Fifo<u8> = Fifo::default();
        assert_eq!(fifo.capacity(), DEFAULT_CAPACITY);
        fifo.extend_from_slice(&[1, 2, 3]).unwrap();
        fifo.clear();
        assert!(fifo.is_empty());
        assert_eq!(fifo.peek(), Err(FifoError::Empty));
    }
}
