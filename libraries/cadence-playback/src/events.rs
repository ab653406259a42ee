//! Player events
//!
//! The player pushes events into a bounded FIFO queue; any number of
//! consumers can poll, wait or peek. Consumers block on a condition variable
//! of their own and never touch the player's state lock.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::trace;

/// Events emitted by the player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlayerEvent {
    /// The item under the play head changed
    NowPlaying,
    /// The output needed audio before the decoder produced any
    BufferUnderrun,
}

#[derive(Debug)]
struct Queue {
    events: VecDeque<PlayerEvent>,
    capacity: usize,
    closed: bool,
    dropped: u64,
}

/// Cloneable handle to a player's event queue
#[derive(Debug, Clone)]
pub struct EventChannel {
    inner: Arc<(Mutex<Queue>, Condvar)>,
}

impl EventChannel {
    /// Create a queue holding at most `capacity` events
    ///
    /// When full, the oldest event is dropped to make room.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new((
                Mutex::new(Queue {
                    events: VecDeque::with_capacity(capacity.min(1024)),
                    capacity: capacity.max(1),
                    closed: false,
                    dropped: 0,
                }),
                Condvar::new(),
            )),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Queue> {
        self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue an event and wake every blocked consumer
    pub fn push(&self, event: PlayerEvent) {
        let mut queue = self.lock();
        if queue.closed {
            return;
        }
        if queue.events.len() >= queue.capacity {
            queue.events.pop_front();
            queue.dropped += 1;
        }
        queue.events.push_back(event);
        trace!(?event, queued = queue.events.len(), "Event pushed");
        drop(queue);
        self.inner.1.notify_all();
    }

    /// Take the oldest event without blocking
    pub fn poll(&self) -> Option<PlayerEvent> {
        self.lock().events.pop_front()
    }

    /// Block until an event is available and take it
    ///
    /// Returns `None` only once the channel is closed and drained.
    pub fn wait(&self) -> Option<PlayerEvent> {
        let mut queue = self.lock();
        loop {
            if let Some(event) = queue.events.pop_front() {
                return Some(event);
            }
            if queue.closed {
                return None;
            }
            queue = self
                .inner
                .1
                .wait(queue)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like `wait`, giving up after `timeout`
    pub fn wait_timeout(&self, timeout: Duration) -> Option<PlayerEvent> {
        let deadline = Instant::now() + timeout;
        let mut queue = self.lock();
        loop {
            if let Some(event) = queue.events.pop_front() {
                return Some(event);
            }
            let now = Instant::now();
            if queue.closed || now >= deadline {
                return None;
            }
            queue = self
                .inner
                .1
                .wait_timeout(queue, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Report whether an event is ready without taking it
    ///
    /// With `block`, waits until one is ready; returns `false` only if the
    /// channel is closed while empty.
    pub fn peek(&self, block: bool) -> bool {
        let mut queue = self.lock();
        loop {
            if !queue.events.is_empty() {
                return true;
            }
            if !block || queue.closed {
                return false;
            }
            queue = self
                .inner
                .1
                .wait(queue)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Number of queued events
    pub fn len(&self) -> usize {
        self.lock().events.len()
    }

    /// Whether no event is queued
    pub fn is_empty(&self) -> bool {
        self.lock().events.is_empty()
    }

    /// Events discarded because the queue was full
    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }

    /// Stop accepting events and release every blocked consumer
    pub fn close(&self) {
        self.lock().closed = true;
        self.inner.1.notify_all();
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn fifo_across_poll_and_peek() {
        let channel = EventChannel::new(8);
        channel.push(PlayerEvent::NowPlaying);
        channel.push(PlayerEvent::BufferUnderrun);

        assert!(channel.peek(false));
        assert_eq!(channel.len(), 2);
        assert_eq!(channel.poll(), Some(PlayerEvent::NowPlaying));
        assert!(channel.peek(true));
        assert_eq!(channel.wait(), Some(PlayerEvent::BufferUnderrun));
        assert_eq!(channel.poll(), None);
        assert!(!channel.peek(false));
    }

    #[test]
    fn full_queue_drops_oldest() {
        let channel = EventChannel::new(2);
        channel.push(PlayerEvent::BufferUnderrun);
        channel.push(PlayerEvent::NowPlaying);
        channel.push(PlayerEvent::BufferUnderrun);

        assert_eq!(channel.dropped(), 1);
        assert_eq!(channel.poll(), Some(PlayerEvent::NowPlaying));
        assert_eq!(channel.poll(), Some(PlayerEvent::BufferUnderrun));
    }

    #[test]
    fn wait_blocks_until_push() {
        let channel = EventChannel::new(4);
        let consumer = {
            let channel = channel.clone();
            thread::spawn(move || channel.wait())
        };
        thread::sleep(Duration::from_millis(20));
        channel.push(PlayerEvent::NowPlaying);
        assert_eq!(consumer.join().unwrap(), Some(PlayerEvent::NowPlaying));
    }

    #[test]
    fn close_releases_blocked_consumers() {
        let channel = EventChannel::new(4);
        let peeker = {
            let channel = channel.clone();
            thread::spawn(move || channel.peek(true))
        };
        let waiter = {
            let channel = channel.clone();
            thread::spawn(move || channel.wait())
        };
        thread::sleep(Duration::from_millis(20));
        channel.close();

        assert!(!peeker.join().unwrap());
        assert_eq!(waiter.join().unwrap(), None);
        channel.push(PlayerEvent::NowPlaying);
        assert!(channel.is_empty());
    }

    #[test]
    fn wait_timeout_expires() {
        let channel = EventChannel::new(4);
        assert_eq!(channel.wait_timeout(Duration::from_millis(10)), None);
    }
}
