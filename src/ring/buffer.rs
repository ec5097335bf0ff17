// Single-producer/multi-consumer event ring
// Preallocated slots, per-consumer cursors, producer gating on the slowest
// consumer. Every consumer observes every published event in sequence order.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use thiserror::Error;

use super::wait::{WaitStrategy, Waiter};

#[derive(Debug, Error)]
pub enum RingError {
    #[error("ring capacity must be non-zero")]
    ZeroCapacity,

    #[error("ring is closed")]
    Closed,
}

/// Cursors start one below the first sequence so that "consumed up to"
/// arithmetic needs no special empty case.
const INITIAL_SEQUENCE: i64 = -1;

struct RingCore<E> {
    slots: Box<[UnsafeCell<E>]>,
    mask: i64,
    capacity: i64,
    /// Highest published sequence; INITIAL_SEQUENCE before the first publish.
    cursor: AtomicI64,
    closed: AtomicBool,
    waiter: Waiter,
}

// Safety: a slot is written only by the single producer while no consumer
// may read it (gating), and read only after the publish store to `cursor`
// (Release) has been observed (Acquire). Consumers free a slot by advancing
// their own cursor, which the producer reads with Acquire before reusing it.
unsafe impl<E: Send> Send for RingCore<E> {}
unsafe impl<E: Send> Sync for RingCore<E> {}

impl<E> RingCore<E> {
    fn slot(&self, sequence: i64) -> *mut E {
        self.slots[(sequence & self.mask) as usize].get()
    }
}

/// Builder handle: subscribe consumers, then take the producer.
///
/// Consuming `self` in [`EventRing::producer`] makes late subscription a
/// compile error rather than a runtime one.
pub struct EventRing<E> {
    core: Arc<RingCore<E>>,
    gates: Vec<Arc<AtomicI64>>,
}

impl<E: Default + Clone + Send + Sync + 'static> EventRing<E> {
    /// Create a ring with the default (blocking) wait strategy. Capacity is
    /// rounded up to the next power of two.
    pub fn with_capacity(capacity: usize) -> Result<EventRing<E>, RingError> {
        Self::new(capacity, WaitStrategy::default())
    }

    pub fn new(capacity: usize, strategy: WaitStrategy) -> Result<EventRing<E>, RingError> {
        if capacity == 0 {
            return Err(RingError::ZeroCapacity);
        }
        let capacity = capacity.next_power_of_two();
        let slots: Box<[UnsafeCell<E>]> = (0..capacity)
            .map(|_| UnsafeCell::new(E::default()))
            .collect();

        Ok(EventRing {
            core: Arc::new(RingCore {
                slots,
                mask: capacity as i64 - 1,
                capacity: capacity as i64,
                cursor: AtomicI64::new(INITIAL_SEQUENCE),
                closed: AtomicBool::new(false),
                waiter: Waiter::new(strategy),
            }),
            gates: Vec::new(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.core.capacity as usize
    }

    /// Register a consumer. Each consumer gets its own cursor and will see
    /// every event published after the producer is taken.
    pub fn subscribe(&mut self, name: &str) -> RingConsumer<E> {
        let cursor = Arc::new(AtomicI64::new(INITIAL_SEQUENCE));
        self.gates.push(Arc::clone(&cursor));
        RingConsumer {
            core: Arc::clone(&self.core),
            cursor,
            name: name.to_string(),
        }
    }

    /// Seal subscriptions and hand over the single write handle.
    pub fn producer(self) -> RingProducer<E> {
        RingProducer {
            core: self.core,
            gates: self.gates,
            next: 0,
        }
    }
}

/// The single write handle. Dropping it closes the ring, letting consumers
/// drain what was published and then stop.
pub struct RingProducer<E> {
    core: Arc<RingCore<E>>,
    gates: Vec<Arc<AtomicI64>>,
    next: i64,
}

impl<E> RingProducer<E> {
    /// Publish one event, blocking (per wait strategy) while the slot for
    /// this sequence is still unconsumed by the slowest consumer.
    pub fn publish(&mut self, event: E) -> Result<u64, RingError> {
        if self.core.closed.load(Ordering::Acquire) {
            return Err(RingError::Closed);
        }

        let sequence = self.next;
        let wrap_point = sequence - self.core.capacity;
        if !self.gates.is_empty() && self.min_gate() < wrap_point {
            self.core.waiter.wait_until(|| self.min_gate() >= wrap_point);
        }

        // Safety: gating above guarantees no consumer can still read this
        // slot, and the producer is unique (we hold &mut self).
        unsafe {
            *self.core.slot(sequence) = event;
        }
        self.core.cursor.store(sequence, Ordering::Release);
        self.core.waiter.notify_all();
        self.next = sequence + 1;
        Ok(sequence as u64)
    }

    /// Sequence of the next publish.
    pub fn next_sequence(&self) -> u64 {
        self.next as u64
    }

    pub fn capacity(&self) -> usize {
        self.core.capacity as usize
    }

    /// Close the ring. Consumers finish draining published events, then
    /// their poll loops end.
    pub fn close(&mut self) {
        self.core.closed.store(true, Ordering::Release);
        self.core.waiter.notify_all();
    }

    fn min_gate(&self) -> i64 {
        self.gates
            .iter()
            .map(|gate| gate.load(Ordering::Acquire))
            .min()
            .unwrap_or(i64::MAX)
    }
}

impl<E> Drop for RingProducer<E> {
    fn drop(&mut self) {
        self.core.closed.store(true, Ordering::Release);
        self.core.waiter.notify_all();
    }
}

/// Outcome of one [`RingConsumer::poll`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Poll {
    /// Number of events handed to the handler in this batch.
    Processed(usize),
    /// The ring is closed and every published event has been consumed.
    Closed,
}

/// A registered consumer's read handle.
pub struct RingConsumer<E> {
    core: Arc<RingCore<E>>,
    cursor: Arc<AtomicI64>,
    name: String,
}

impl<E: Clone> RingConsumer<E> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wait for at least one unconsumed event, then hand the whole
    /// available batch to `handler` as `(event, sequence, end_of_batch)`.
    ///
    /// The consumer cursor advances only after the batch completes, so a
    /// handler that panics never marks events as consumed.
    pub fn poll<F>(&mut self, mut handler: F) -> Poll
    where
        F: FnMut(&E, u64, bool),
    {
        let next = self.cursor.load(Ordering::Relaxed) + 1;
        self.core.waiter.wait_until(|| {
            self.core.cursor.load(Ordering::Acquire) >= next
                || self.core.closed.load(Ordering::Acquire)
        });

        let published = self.core.cursor.load(Ordering::Acquire);
        if published < next {
            return Poll::Closed;
        }

        for sequence in next..=published {
            // Safety: `sequence <= published` was made visible by the
            // producer's Release store, and the producer cannot reuse the
            // slot until this cursor passes it.
            let event = unsafe { (*self.core.slot(sequence)).clone() };
            handler(&event, sequence as u64, sequence == published);
        }

        self.cursor.store(published, Ordering::Release);
        self.core.waiter.notify_all();
        Poll::Processed((published - next + 1) as usize)
    }
}

/// A consumer stage, the unit [`spawn_stage`] drives on its own thread.
pub trait Stage<E>: Send {
    fn on_event(&mut self, event: &E, sequence: u64, end_of_batch: bool);

    /// Called once after the ring closes and every event has been seen.
    fn on_close(&mut self) {}
}

/// Drive a stage on a dedicated thread until the ring closes.
pub fn spawn_stage<E, S>(mut consumer: RingConsumer<E>, mut stage: S) -> std::io::Result<JoinHandle<()>>
where
    E: Clone + Send + Sync + 'static,
    S: Stage<E> + 'static,
{
    let thread_name = format!("stage-{}", consumer.name());
    thread::Builder::new().name(thread_name).spawn(move || loop {
        match consumer.poll(|event, sequence, end_of_batch| {
            stage.on_event(event, sequence, end_of_batch)
        }) {
            Poll::Processed(_) => {}
            Poll::Closed => {
                stage.on_close();
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    struct Collect {
        seen: Arc<Mutex<Vec<u64>>>,
        closed: Arc<AtomicBool>,
    }

    impl Collect {
        fn new() -> (Self, Arc<Mutex<Vec<u64>>>, Arc<AtomicBool>) {
            let seen = Arc::new(Mutex::new(Vec::new()));
            let closed = Arc::new(AtomicBool::new(false));
            (
                Collect {
                    seen: Arc::clone(&seen),
                    closed: Arc::clone(&closed),
                },
                seen,
                closed,
            )
        }
    }

    impl Stage<u64> for Collect {
        fn on_event(&mut self, event: &u64, _sequence: u64, _end_of_batch: bool) {
            self.seen.lock().unwrap().push(*event);
        }

        fn on_close(&mut self) {
            self.closed.store(true, Ordering::Release);
        }
    }

    #[test]
    fn capacity_rounds_up_to_power_of_two() {
        let ring = EventRing::<u64>::with_capacity(100).unwrap();
        assert_eq!(ring.capacity(), 128);
        assert!(EventRing::<u64>::with_capacity(0).is_err());
    }

    #[test]
    fn single_consumer_sees_all_events_in_order() {
        let mut ring = EventRing::<u64>::with_capacity(8).unwrap();
        let consumer = ring.subscribe("collect");
        let (stage, seen, closed) = Collect::new();
        let handle = spawn_stage(consumer, stage).unwrap();

        let mut producer = ring.producer();
        for value in 0..100u64 {
            producer.publish(value).unwrap();
        }
        drop(producer);
        handle.join().unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 100);
        assert!(seen.windows(2).all(|w| w[1] == w[0] + 1));
        assert!(closed.load(Ordering::Acquire));
    }

    #[test]
    fn every_consumer_sees_every_event() {
        let mut ring = EventRing::<u64>::with_capacity(16).unwrap();
        let consumer_a = ring.subscribe("a");
        let consumer_b = ring.subscribe("b");
        let (stage_a, seen_a, _) = Collect::new();
        let (stage_b, seen_b, _) = Collect::new();
        let handle_a = spawn_stage(consumer_a, stage_a).unwrap();
        let handle_b = spawn_stage(consumer_b, stage_b).unwrap();

        let mut producer = ring.producer();
        for value in 0..64u64 {
            producer.publish(value).unwrap();
        }
        drop(producer);
        handle_a.join().unwrap();
        handle_b.join().unwrap();

        let expected: Vec<u64> = (0..64).collect();
        assert_eq!(*seen_a.lock().unwrap(), expected);
        assert_eq!(*seen_b.lock().unwrap(), expected);
    }

    #[test]
    fn producer_gates_on_slow_consumer() {
        struct Slow {
            seen: Arc<Mutex<Vec<u64>>>,
        }
        impl Stage<u64> for Slow {
            fn on_event(&mut self, event: &u64, _s: u64, _e: bool) {
                thread::sleep(Duration::from_millis(1));
                self.seen.lock().unwrap().push(*event);
            }
        }

        let mut ring = EventRing::<u64>::with_capacity(4).unwrap();
        let consumer = ring.subscribe("slow");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let handle = spawn_stage(
            consumer,
            Slow {
                seen: Arc::clone(&seen),
            },
        )
        .unwrap();

        let mut producer = ring.producer();
        for value in 0..64u64 {
            producer.publish(value).unwrap();
        }
        drop(producer);
        handle.join().unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(*seen, (0..64).collect::<Vec<u64>>());
    }

    #[test]
    fn consumers_drain_after_close() {
        let mut ring = EventRing::<u64>::with_capacity(16).unwrap();
        let consumer = ring.subscribe("late");

        let mut producer = ring.producer();
        for value in 0..10u64 {
            producer.publish(value).unwrap();
        }
        producer.close();
        assert!(matches!(producer.publish(11), Err(RingError::Closed)));
        drop(producer);

        // Consumer starts only after the ring closed; it must still drain.
        let (stage, seen, _) = Collect::new();
        let handle = spawn_stage(consumer, stage).unwrap();
        handle.join().unwrap();
        assert_eq!(*seen.lock().unwrap(), (0..10).collect::<Vec<u64>>());
    }

    #[test]
    fn busy_spin_delivers() {
        let mut ring = EventRing::<u64>::new(8, WaitStrategy::BusySpin).unwrap();
        let consumer = ring.subscribe("spin");
        let (stage, seen, _) = Collect::new();
        let handle = spawn_stage(consumer, stage).unwrap();

        let mut producer = ring.producer();
        for value in 0..32u64 {
            producer.publish(value).unwrap();
        }
        drop(producer);
        handle.join().unwrap();
        assert_eq!(seen.lock().unwrap().len(), 32);
    }

    #[test]
    fn sequences_are_contiguous() {
        let mut ring = EventRing::<u64>::with_capacity(8).unwrap();
        let mut consumer = ring.subscribe("seq");
        let mut producer = ring.producer();

        for value in 0..5u64 {
            let sequence = producer.publish(value * 10).unwrap();
            assert_eq!(sequence, value);
        }
        drop(producer);

        let mut pairs = Vec::new();
        loop {
            match consumer.poll(|event, sequence, _| pairs.push((*event, sequence))) {
                Poll::Processed(_) => {}
                Poll::Closed => break,
            }
        }
        assert_eq!(pairs, vec![(0, 0), (10, 1), (20, 2), (30, 3), (40, 4)]);
    }
}
