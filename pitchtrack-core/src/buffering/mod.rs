//! Lock-free SPSC sample queue and the streaming frame assembler built on it.
//!
//! Uses `ringbuf::HeapRb<f32>` which provides a wait-free `push_slice`
//! safe to call from the real-time audio callback.

pub mod assembler;

pub use assembler::{
    frame_stream, AssemblerConfig, FinishHandle, FrameAssembler, FrameProducer, PullOutcome,
    StreamState,
};

use ringbuf::{traits::Split, HeapRb};

pub use ringbuf::traits::{Consumer, Observer, Producer};

/// Producer half, held by the audio callback thread.
pub type SampleProducer = ringbuf::HeapProd<f32>;

/// Consumer half, held by the analysis thread.
pub type SampleConsumer = ringbuf::HeapCons<f32>;

/// Create a matched producer/consumer pair backed by a heap-allocated ring buffer.
///
/// `capacity` is clamped to at least one sample.
pub fn create_sample_ring(capacity: usize) -> (SampleProducer, SampleConsumer) {
    HeapRb::<f32>::new(capacity.max(1)).split()
}
