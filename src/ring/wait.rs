// Wait strategies for the event ring
// Blocking parks on a condvar; BusySpin trades CPU for latency.

use serde::{Deserialize, Serialize};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// How a stalled producer or consumer waits for the ring to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitStrategy {
    /// Park on a condvar until the cursor moves. Default; friendly to
    /// consumers that also touch disk (persistence, tracing).
    Blocking,
    /// Spin with `hint::spin_loop`, yielding periodically. Lowest handoff
    /// latency, burns a core per waiter.
    BusySpin,
}

impl Default for WaitStrategy {
    fn default() -> Self {
        WaitStrategy::Blocking
    }
}

/// Shared wake-up primitive for one ring.
///
/// The condvar timeout bounds how long a missed wake-up can stall a
/// blocking waiter; correctness only depends on `ready` re-checks.
pub(crate) struct Waiter {
    strategy: WaitStrategy,
    lock: Mutex<()>,
    condvar: Condvar,
}

const BLOCKING_RECHECK: Duration = Duration::from_millis(50);
const SPINS_PER_YIELD: u32 = 1 << 10;

impl Waiter {
    pub fn new(strategy: WaitStrategy) -> Self {
        Waiter {
            strategy,
            lock: Mutex::new(()),
            condvar: Condvar::new(),
        }
    }

    /// Block the calling thread until `ready()` observes true.
    pub fn wait_until<F: Fn() -> bool>(&self, ready: F) {
        match self.strategy {
            WaitStrategy::Blocking => loop {
                if ready() {
                    return;
                }
                let guard = self.lock.lock().unwrap();
                if ready() {
                    return;
                }
                let _ = self.condvar.wait_timeout(guard, BLOCKING_RECHECK).unwrap();
            },
            WaitStrategy::BusySpin => {
                let mut spins = 0u32;
                loop {
                    if ready() {
                        return;
                    }
                    spins = spins.wrapping_add(1);
                    if spins % SPINS_PER_YIELD == 0 {
                        std::thread::yield_now();
                    } else {
                        std::hint::spin_loop();
                    }
                }
            }
        }
    }

    /// Wake every parked waiter. No-op under BusySpin.
    pub fn notify_all(&self) {
        if self.strategy == WaitStrategy::Blocking {
            let _guard = self.lock.lock().unwrap();
            self.condvar.notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn blocking_wait_observes_flag() {
        let waiter = Arc::new(Waiter::new(WaitStrategy::Blocking));
        let flag = Arc::new(AtomicBool::new(false));

        let handle = {
            let waiter = Arc::clone(&waiter);
            let flag = Arc::clone(&flag);
            std::thread::spawn(move || {
                waiter.wait_until(|| flag.load(Ordering::Acquire));
            })
        };

        std::thread::sleep(Duration::from_millis(10));
        flag.store(true, Ordering::Release);
        waiter.notify_all();
        handle.join().unwrap();
    }

    #[test]
    fn busy_spin_wait_observes_flag() {
        let waiter = Arc::new(Waiter::new(WaitStrategy::BusySpin));
        let flag = Arc::new(AtomicBool::new(false));

        let handle = {
            let waiter = Arc::clone(&waiter);
            let flag = Arc::clone(&flag);
            std::thread::spawn(move || {
                waiter.wait_until(|| flag.load(Ordering::Acquire));
            })
        };

        flag.store(true, Ordering::Release);
        handle.join().unwrap();
    }

    #[test]
    fn ready_wait_returns_immediately() {
        let waiter = Waiter::new(WaitStrategy::Blocking);
        waiter.wait_until(|| true);
    }
}
