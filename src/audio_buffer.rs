/// Audio ring buffer for accumulating streamed PCM bytes
///
/// Fixed-capacity byte buffer sitting between the audio producer and the
/// detection loop. Sized by default for 3 seconds of 16kHz mono 16-bit PCM
/// (~96KB). Overflow policy is drop-oldest: the most recent speech is always
/// retained.

use cache_padded::CachePadded;
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::HeapRb;
use std::sync::Mutex;
use tracing::{debug, warn};

/// Buffer sizing: 3 seconds at 16kHz, 16-bit mono
pub const BUFFER_DURATION_SECS: usize = 3;
pub const SAMPLE_RATE: usize = 16000;
pub const BYTES_PER_SAMPLE: usize = 2;
pub const BUFFER_CAPACITY: usize = BUFFER_DURATION_SECS * SAMPLE_RATE * BYTES_PER_SAMPLE;

type RingBuffer = HeapRb<u8>;
type RingProducer = <RingBuffer as Split>::Prod;
type RingConsumer = <RingBuffer as Split>::Cons;

/// Byte ring buffer with separate producer and consumer locks, so a producer
/// can append while the detection loop drains.
pub struct AudioRingBuffer {
    producer: CachePadded<Mutex<RingProducer>>,
    consumer: CachePadded<Mutex<RingConsumer>>,
}

impl AudioRingBuffer {
    /// Create a buffer with the default 3-second capacity
    pub fn new() -> Self {
        Self::with_capacity(BUFFER_CAPACITY)
    }

    /// Create a buffer with custom capacity in bytes
    pub fn with_capacity(capacity: usize) -> Self {
        debug!("Creating audio ring buffer with capacity: {} bytes", capacity);

        let rb = HeapRb::<u8>::new(capacity);
        let (producer, consumer) = rb.split();

        Self {
            producer: CachePadded::new(Mutex::new(producer)),
            consumer: CachePadded::new(Mutex::new(consumer)),
        }
    }

    /// Append a chunk of audio bytes (non-blocking)
    ///
    /// If the buffer is full, the oldest bytes are dropped to make room.
    /// A chunk larger than the whole buffer keeps only its newest bytes.
    pub fn append(&self, chunk: &[u8]) {
        let mut producer = self.producer.lock().unwrap();

        let capacity = producer.capacity().get();
        // Oversized chunk: only the tail can ever fit
        let chunk = if chunk.len() > capacity {
            &chunk[chunk.len() - capacity..]
        } else {
            chunk
        };

        let vacant = producer.vacant_len();
        if chunk.len() > vacant {
            let to_drop = chunk.len() - vacant;
            let mut consumer = self.consumer.lock().unwrap();
            consumer.skip(to_drop);
            drop(consumer);

            warn!("Buffer full, dropping {} oldest bytes to make room", to_drop);
        }

        producer.push_slice(chunk);
    }

    /// Snapshot of everything currently buffered, oldest first
    ///
    /// Does not clear; clearing is a separate explicit operation so audio
    /// context keeps accumulating across failed checks.
    pub fn drain(&self) -> Vec<u8> {
        let consumer = self.consumer.lock().unwrap();
        let mut out = Vec::with_capacity(consumer.occupied_len());
        for byte in consumer.iter() {
            out.push(*byte);
        }
        out
    }

    /// Reset to empty without reallocating
    pub fn clear(&self) {
        let mut consumer = self.consumer.lock().unwrap();
        let occupied = consumer.occupied_len();
        consumer.skip(occupied);
        debug!("Cleared audio ring buffer");
    }

    /// Number of bytes currently buffered
    pub fn len(&self) -> usize {
        let consumer = self.consumer.lock().unwrap();
        consumer.occupied_len()
    }

    /// Check if the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Buffer capacity in bytes
    pub fn capacity(&self) -> usize {
        let consumer = self.consumer.lock().unwrap();
        consumer.capacity().get()
    }

    /// Free space in bytes
    pub fn free_space(&self) -> usize {
        let producer = self.producer.lock().unwrap();
        producer.vacant_len()
    }

    /// Duration of buffered audio in seconds
    pub fn duration_secs(&self) -> f32 {
        self.len() as f32 / (SAMPLE_RATE * BYTES_PER_SAMPLE) as f32
    }
}

impl Default for AudioRingBuffer {
    fn default() -> Self {
        Self::new()
    }
}
