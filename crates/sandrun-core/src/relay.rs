//! Output relay: the bounded, ordered channel between the workflow driver and
//! a live consumer.
//!
//! Lines travel in production order and end with an explicit end-of-stream
//! frame. Publishing blocks on a full channel up to a configured timeout;
//! after that the sender detaches from the live stream so teardown and
//! promise resolution are never held hostage by a consumer that stopped
//! reading. A detached publish is reported to the caller and logged, never
//! swallowed.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tracing::warn;

use crate::domain::OutputLine;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Frame {
    Line(OutputLine),
    End,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PublishError {
    /// The consumer dropped its receiver; nobody will read this line.
    #[error("output relay consumer is gone")]
    ConsumerGone,

    /// The channel stayed full past the publish timeout. The relay is now
    /// detached: later publishes fail fast with `ConsumerGone`.
    #[error("output relay stalled: consumer not draining")]
    Stalled,
}

/// Producer half. Clonable; all clones share the close/detach state.
#[derive(Clone)]
pub struct RelaySender {
    tx: mpsc::Sender<Frame>,
    publish_timeout: Duration,
    closed: Arc<AtomicBool>,
    detached: Arc<AtomicBool>,
}

/// Consumer half: a lazy, finite, non-restartable sequence of lines.
pub struct RelayReceiver {
    rx: mpsc::Receiver<Frame>,
    done: bool,
}

/// Build a connected relay pair.
pub fn relay(capacity: usize, publish_timeout: Duration) -> (RelaySender, RelayReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        RelaySender {
            tx,
            publish_timeout,
            closed: Arc::new(AtomicBool::new(false)),
            detached: Arc::new(AtomicBool::new(false)),
        },
        RelayReceiver { rx, done: false },
    )
}

impl RelaySender {
    /// Enqueue one line, waiting for capacity up to the publish timeout.
    pub async fn publish(&self, line: OutputLine) -> Result<(), PublishError> {
        if self.detached.load(Ordering::Acquire) {
            return Err(PublishError::ConsumerGone);
        }
        match self
            .tx
            .send_timeout(Frame::Line(line), self.publish_timeout)
            .await
        {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Closed(_)) => {
                self.detached.store(true, Ordering::Release);
                Err(PublishError::ConsumerGone)
            }
            Err(SendTimeoutError::Timeout(_)) => {
                self.detached.store(true, Ordering::Release);
                warn!("output relay stalled; remaining lines will not be streamed");
                Err(PublishError::Stalled)
            }
        }
    }

    /// Send the end-of-stream frame exactly once. Safe to call repeatedly.
    ///
    /// When the relay is detached the frame is attempted without waiting; a
    /// consumer that resumes reading still sees end-of-stream because the
    /// receiver also treats a closed channel as the end.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if self.detached.load(Ordering::Acquire) {
            let _ = self.tx.try_send(Frame::End);
            return;
        }
        if self
            .tx
            .send_timeout(Frame::End, self.publish_timeout)
            .await
            .is_err()
        {
            self.detached.store(true, Ordering::Release);
        }
    }
}

impl RelayReceiver {
    /// Next line, or `None` once the stream has ended. After the first
    /// `None`, every later call returns `None` immediately.
    pub async fn recv(&mut self) -> Option<OutputLine> {
        if self.done {
            return None;
        }
        match self.rx.recv().await {
            Some(Frame::Line(line)) => Some(line),
            // A dropped producer counts as end-of-stream too, so a consumer
            // can never hang on a driver that died before closing.
            Some(Frame::End) | None => {
                self.done = true;
                None
            }
        }
    }

    /// Drain every remaining line into a vector.
    pub async fn collect_lines(&mut self) -> Vec<OutputLine> {
        let mut lines = Vec::new();
        while let Some(line) = self.recv().await {
            lines.push(line);
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FOREVER: Duration = Duration::from_secs(60);

    fn line(n: usize) -> OutputLine {
        OutputLine::stdout("run", format!("line {n}"))
    }

    #[tokio::test]
    async fn delivers_lines_in_production_order() {
        let (tx, mut rx) = relay(16, FOREVER);
        for n in 0..5 {
            tx.publish(line(n)).await.unwrap();
        }
        tx.close().await;
        let lines = rx.collect_lines().await;
        assert_eq!(lines, (0..5).map(line).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn end_of_stream_is_seen_exactly_once_then_sticks() {
        let (tx, mut rx) = relay(4, FOREVER);
        tx.publish(line(0)).await.unwrap();
        tx.close().await;
        tx.close().await; // idempotent
        assert_eq!(rx.recv().await, Some(line(0)));
        assert_eq!(rx.recv().await, None);
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn consume_is_independent_of_a_finished_producer() {
        let (tx, mut rx) = relay(8, FOREVER);
        tx.publish(line(0)).await.unwrap();
        tx.publish(line(1)).await.unwrap();
        tx.close().await;
        drop(tx);
        // Producer long gone; the consumer still sees everything.
        assert_eq!(rx.recv().await, Some(line(0)));
        assert_eq!(rx.recv().await, Some(line(1)));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn dropped_receiver_reports_consumer_gone() {
        let (tx, rx) = relay(4, FOREVER);
        drop(rx);
        assert_eq!(tx.publish(line(0)).await, Err(PublishError::ConsumerGone));
        // Close must not hang either.
        tx.close().await;
    }

    #[tokio::test]
    async fn full_channel_detaches_after_timeout_instead_of_blocking() {
        let (tx, _rx) = relay(1, Duration::from_millis(20));
        tx.publish(line(0)).await.unwrap();
        assert_eq!(tx.publish(line(1)).await, Err(PublishError::Stalled));
        // Once detached, publishes fail fast.
        assert_eq!(tx.publish(line(2)).await, Err(PublishError::ConsumerGone));
        tx.close().await;
    }

    #[tokio::test]
    async fn dropped_producer_without_close_still_ends_the_stream() {
        let (tx, mut rx) = relay(4, FOREVER);
        tx.publish(line(0)).await.unwrap();
        drop(tx);
        assert_eq!(rx.recv().await, Some(line(0)));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn clones_share_close_state() {
        let (tx, mut rx) = relay(4, FOREVER);
        let tx2 = tx.clone();
        tx.close().await;
        tx2.close().await; // second close through the clone is a no-op
        drop(tx);
        drop(tx2);
        assert_eq!(rx.recv().await, None);
    }
}
