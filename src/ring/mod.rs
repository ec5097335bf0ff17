// Event ring module
// Disruptor-style single-writer/multi-reader ring distributing ordered
// feature events to independent consumer stages

pub mod buffer;
pub mod wait;

pub use buffer::{spawn_stage, EventRing, Poll, RingConsumer, RingError, RingProducer, Stage};
pub use wait::WaitStrategy;
