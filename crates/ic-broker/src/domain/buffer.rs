//! Fixed-capacity store for the last written payload.

use crate::error::BrokerError;

/// Holds the most recent write, up to `capacity` bytes.
#[derive(Debug, Clone)]
pub struct WriteBuffer {
    capacity: usize,
    contents: Option<StoredWrite>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct StoredWrite {
    sequence: u64,
    bytes: Vec<u8>,
}

impl WriteBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            contents: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Replace the stored payload.
    ///
    /// # Errors
    ///
    /// `BufferOverflow` if `payload` exceeds the capacity; nothing is stored.
    pub fn store(&mut self, sequence: u64, payload: &[u8]) -> Result<(), BrokerError> {
        if payload.len() > self.capacity {
            return Err(BrokerError::BufferOverflow {
                length: payload.len(),
                capacity: self.capacity,
            });
        }
        self.contents = Some(StoredWrite {
            sequence,
            bytes: payload.to_vec(),
        });
        Ok(())
    }

    /// Stored payload, `None` if nothing was ever written.
    pub fn contents(&self) -> Option<&[u8]> {
        self.contents.as_ref().map(|w| w.bytes.as_slice())
    }

    /// Sequence number of the stored payload.
    pub fn sequence(&self) -> Option<u64> {
        self.contents.as_ref().map(|w| w.sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_until_written() {
        let buffer = WriteBuffer::new(512);
        assert!(buffer.contents().is_none());
        assert_eq!(buffer.sequence(), None);
    }

    #[test]
    fn test_store_replaces_previous() {
        let mut buffer = WriteBuffer::new(512);
        buffer.store(1, b"first").unwrap();
        buffer.store(2, b"second").unwrap();
        assert_eq!(buffer.contents(), Some(&b"second"[..]));
        assert_eq!(buffer.sequence(), Some(2));
    }

    #[test]
    fn test_oversized_write_leaves_buffer_untouched() {
        let mut buffer = WriteBuffer::new(4);
        buffer.store(1, b"ok").unwrap();
        let err = buffer.store(2, b"too long").unwrap_err();
        assert_eq!(
            err,
            BrokerError::BufferOverflow {
                length: 8,
                capacity: 4
            }
        );
        assert_eq!(buffer.contents(), Some(&b"ok"[..]));
    }
}
