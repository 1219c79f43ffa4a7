//! Deferred delivery used to inject artificial latency
//!
//! A [`DelayQueue`] holds items together with their release instant. The
//! async [`delay_line`] wraps one in a pump task so that producers push into
//! a channel and consumers receive each item once its delay has elapsed.
//! Neither the producer nor the consumer ever sleeps on behalf of an item.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};

/// FIFO of items waiting for a fixed delay to elapse
///
/// The delay is constant for the lifetime of the queue, so push order equals
/// release order and a deque is enough.
#[derive(Debug)]
pub struct DelayQueue<T> {
    delay: Duration,
    pending: VecDeque<(Instant, T)>,
}

impl<T> DelayQueue<T> {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: VecDeque::new(),
        }
    }

    /// Schedules `item` for release at `now + delay`
    pub fn push(&mut self, now: Instant, item: T) {
        self.pending.push_back((now + self.delay, item));
    }

    /// Removes and returns every item whose release instant is at or before `now`
    pub fn pop_ready(&mut self, now: Instant) -> Vec<T> {
        let mut ready = Vec::new();
        while let Some((release_at, _)) = self.pending.front() {
            if *release_at > now {
                break;
            }
            if let Some((_, item)) = self.pending.pop_front() {
                ready.push(item);
            }
        }
        ready
    }

    pub fn next_release(&self) -> Option<Instant> {
        self.pending.front().map(|(release_at, _)| *release_at)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Producer half of a delay line
#[derive(Debug)]
pub struct DelaySender<T> {
    tx: mpsc::UnboundedSender<T>,
}

impl<T> Clone for DelaySender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> DelaySender<T> {
    /// Schedules `item` for delivery; returns false once the consumer is gone
    pub fn push(&self, item: T) -> bool {
        self.tx.send(item).is_ok()
    }
}

/// Creates a channel whose items arrive `delay` after they were pushed
///
/// A zero delay skips the pump task entirely. Must be called from within a
/// tokio runtime.
pub fn delay_line<T: Send + 'static>(
    delay: Duration,
) -> (DelaySender<T>, mpsc::UnboundedReceiver<T>) {
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    if delay.is_zero() {
        return (DelaySender { tx: out_tx }, out_rx);
    }

    let (in_tx, in_rx) = mpsc::unbounded_channel();
    tokio::spawn(pump(DelayQueue::new(delay), in_rx, out_tx));
    (DelaySender { tx: in_tx }, out_rx)
}

async fn pump<T>(
    mut queue: DelayQueue<T>,
    mut input: mpsc::UnboundedReceiver<T>,
    output: mpsc::UnboundedSender<T>,
) {
    let mut input_open = true;

    loop {
        let next_release = queue.next_release();
        if !input_open && next_release.is_none() {
            break;
        }

        tokio::select! {
            item = input.recv(), if input_open => match item {
                Some(item) => queue.push(Instant::now(), item),
                None => input_open = false,
            },
            _ = sleep_until(next_release.unwrap_or_else(Instant::now)), if next_release.is_some() => {
                for item in queue.pop_ready(Instant::now()) {
                    if output.send(item).is_err() {
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_releases_in_push_order() {
        let start = Instant::now();
        let mut queue = DelayQueue::new(Duration::from_millis(100));

        queue.push(start, 1);
        queue.push(start + Duration::from_millis(10), 2);
        queue.push(start + Duration::from_millis(20), 3);

        assert!(queue.pop_ready(start + Duration::from_millis(99)).is_empty());
        assert_eq!(queue.pop_ready(start + Duration::from_millis(110)), vec![1, 2]);
        assert_eq!(queue.len(), 1);
        assert_eq!(
            queue.next_release(),
            Some(start + Duration::from_millis(120))
        );
        assert_eq!(queue.pop_ready(start + Duration::from_secs(1)), vec![3]);
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_line_holds_items_for_the_delay() {
        let (tx, mut rx) = delay_line(Duration::from_millis(100));
        let sent_at = Instant::now();

        assert!(tx.push("intent"));
        assert!(rx.try_recv().is_err());

        assert_eq!(rx.recv().await, Some("intent"));
        assert!(sent_at.elapsed() >= Duration::from_millis(100));
        assert!(sent_at.elapsed() < Duration::from_millis(110));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_line_does_not_serialize_delays() {
        let (tx, mut rx) = delay_line(Duration::from_millis(100));
        let sent_at = Instant::now();

        for i in 0..10 {
            tx.push(i);
        }

        for i in 0..10 {
            assert_eq!(rx.recv().await, Some(i));
        }
        // Ten items still arrive after one delay, not ten.
        assert!(sent_at.elapsed() < Duration::from_millis(150));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_line_flushes_after_sender_drops() {
        let (tx, mut rx) = delay_line(Duration::from_millis(50));
        tx.push(7u32);
        drop(tx);

        assert_eq!(rx.recv().await, Some(7));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_receiver_stays_pending_until_release() {
        let (tx, mut rx) = delay_line(Duration::from_millis(100));
        tx.push(1u32);

        let mut recv = tokio_test::task::spawn(rx.recv());
        tokio_test::assert_pending!(recv.poll());

        tokio::time::sleep(Duration::from_millis(110)).await;
        assert!(recv.is_woken());
        tokio_test::assert_ready_eq!(recv.poll(), Some(1));
    }

    #[tokio::test]
    async fn test_zero_delay_is_immediate() {
        let (tx, mut rx) = delay_line(Duration::ZERO);
        tx.push(3u8);
        assert_eq!(rx.try_recv().ok(), Some(3));
    }
}
