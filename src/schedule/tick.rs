use std::cell::RefCell;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// One iteration of a scheduled callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tick {
    /// 1-based sequence number within the source.
    pub seq: u64,
    /// Host time at which the tick was due.
    pub at: Duration,
}

pub type TickCallback = Box<dyn FnMut(Tick)>;

/// Cancellation flag shared between a subscription and its owner.
///
/// Cancelling is idempotent. Every loop checks the flag at the top of each iteration, so a tick
/// that was already queued when `cancel` ran becomes a no-op.
#[derive(Clone, Debug, Default)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Underlying token, for async work that wants to `select!` on cancellation.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

/// Something that invokes callbacks once per tick until they are cancelled.
pub trait TickSource {
    fn subscribe(&self, callback: TickCallback) -> CancelHandle;
}

struct Subscriber {
    cancel: CancelHandle,
    callback: TickCallback,
}

#[derive(Default)]
struct Inner {
    subscribers: Vec<Subscriber>,
    seq: u64,
}

/// Tick source fired explicitly by its owner.
///
/// Single-threaded: callbacks run synchronously inside [`ManualTickSource::fire`]. Callbacks may
/// subscribe or cancel other subscriptions while running.
#[derive(Default)]
pub struct ManualTickSource {
    inner: RefCell<Inner>,
}

impl ManualTickSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run one tick. Returns how many callbacks were invoked.
    pub fn fire(&self, at: Duration) -> usize {
        let (mut subs, tick) = {
            let mut inner = self.inner.borrow_mut();
            inner.seq += 1;
            let tick = Tick { seq: inner.seq, at };
            (std::mem::take(&mut inner.subscribers), tick)
        };

        let mut fired = 0;
        for sub in subs.iter_mut() {
            if sub.cancel.is_cancelled() {
                continue;
            }
            (sub.callback)(tick);
            fired += 1;
        }
        subs.retain(|s| !s.cancel.is_cancelled());

        let mut inner = self.inner.borrow_mut();
        let added = std::mem::take(&mut inner.subscribers);
        subs.extend(added);
        inner.subscribers = subs;
        fired
    }

    /// Live (not yet cancelled) subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .borrow()
            .subscribers
            .iter()
            .filter(|s| !s.cancel.is_cancelled())
            .count()
    }
}

impl TickSource for ManualTickSource {
    fn subscribe(&self, callback: TickCallback) -> CancelHandle {
        let cancel = CancelHandle::new();
        self.inner.borrow_mut().subscribers.push(Subscriber {
            cancel: cancel.clone(),
            callback,
        });
        cancel
    }
}

/// What a [`FixedRateDriver`] does when the host polls late.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MissedTickPolicy {
    /// Fire every missed tick (wall-clock counters).
    Burst,
    /// Fire once and realign to the current time (render loops).
    Skip,
}

/// Turns polled host time into ticks on a [`ManualTickSource`] at a fixed interval.
#[derive(Debug, Clone)]
pub struct FixedRateDriver {
    interval: Duration,
    next_due: Duration,
    policy: MissedTickPolicy,
}

impl FixedRateDriver {
    /// First tick is due one `interval` after `start`.
    pub fn new(interval: Duration, start: Duration, policy: MissedTickPolicy) -> Self {
        Self {
            interval,
            next_due: start + interval,
            policy,
        }
    }

    pub fn next_due(&self) -> Duration {
        self.next_due
    }

    /// Fire every tick due at `now`. Returns the number of ticks fired.
    pub fn poll(&mut self, source: &ManualTickSource, now: Duration) -> u64 {
        if self.interval.is_zero() {
            return 0;
        }
        let mut fired = 0u64;
        while now >= self.next_due {
            source.fire(self.next_due);
            fired += 1;
            self.next_due += self.interval;
            if self.policy == MissedTickPolicy::Skip && now >= self.next_due {
                self.next_due = now + self.interval;
            }
        }
        fired
    }
}

#[cfg(test)]
#[path = "../../tests/unit/schedule/tick.rs"]
mod tests;
