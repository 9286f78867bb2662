//! Byte ring carrying audio data between a client and a stream worker.

use ringbuf::{HeapConsumer, HeapProducer, HeapRb};

/// Producer side of the data ring.
pub struct DataWriter {
    producer: HeapProducer<u8>,
}

/// Consumer side of the data ring.
pub struct DataReader {
    consumer: HeapConsumer<u8>,
}

/// Creates a single-producer/single-consumer byte ring of `capacity` bytes.
pub fn data_queue(capacity: usize) -> (DataWriter, DataReader) {
    let rb = HeapRb::<u8>::new(capacity.max(1));
    let (producer, consumer) = rb.split();
    (DataWriter { producer }, DataReader { consumer })
}

impl DataWriter {
    pub fn available_to_write(&self) -> usize {
        self.producer.free_len()
    }

    pub fn capacity(&self) -> usize {
        self.producer.capacity()
    }

    /// Writes all of `bytes` or nothing.
    pub fn write(&mut self, bytes: &[u8]) -> bool {
        if bytes.len() > self.producer.free_len() {
            tracing::trace!(
                requested = bytes.len(),
                free = self.producer.free_len(),
                "data ring write refused"
            );
            return false;
        }
        self.producer.push_slice(bytes) == bytes.len()
    }

    /// Writes as much of `bytes` as fits and returns the count written.
    pub fn write_partial(&mut self, bytes: &[u8]) -> usize {
        self.producer.push_slice(bytes)
    }
}

impl DataReader {
    pub fn available_to_read(&self) -> usize {
        self.consumer.len()
    }

    pub fn capacity(&self) -> usize {
        self.consumer.capacity()
    }

    /// Fills all of `bytes` or reads nothing.
    pub fn read(&mut self, bytes: &mut [u8]) -> bool {
        if bytes.len() > self.consumer.len() {
            tracing::trace!(
                requested = bytes.len(),
                queued = self.consumer.len(),
                "data ring read refused"
            );
            return false;
        }
        self.consumer.pop_slice(bytes) == bytes.len()
    }

    /// Reads up to `bytes.len()` bytes and returns the count read.
    pub fn read_partial(&mut self, bytes: &mut [u8]) -> usize {
        self.consumer.pop_slice(bytes)
    }
}
