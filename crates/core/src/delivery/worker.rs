//! Per-sink delivery actor.
//!
//! Each sink gets one task that owns its FIFO queue. Messages are posted one
//! at a time and in order. A rate-limit answer puts the message back at the
//! head of the queue and parks the worker until the server's delay has
//! passed; messages arriving meanwhile are appended behind it.

use std::collections::VecDeque;
use std::sync::Arc;

use log::{debug, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use super::sink::Sink;
use super::transport::{DeliveryOutcome, DEFAULT_RETRY_AFTER, MAX_RETRY_AFTER};
use crate::errors::RetryClass;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum WorkerState {
    Ready,
    Throttled { until: Instant },
}

/// Sending side of a sink worker.
#[derive(Clone)]
pub struct SinkHandle {
    sink: Arc<dyn Sink>,
    tx: mpsc::UnboundedSender<String>,
}

impl SinkHandle {
    pub fn sink(&self) -> &Arc<dyn Sink> {
        &self.sink
    }

    /// Queue a rendered message. Returns `false` once the worker is gone.
    pub fn enqueue(&self, text: String) -> bool {
        self.tx.send(text).is_ok()
    }
}

struct SinkWorker {
    site: String,
    sink: Arc<dyn Sink>,
    queue: VecDeque<String>,
    state: WorkerState,
}

impl SinkWorker {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<String>) {
        let mut open = true;

        loop {
            match self.state {
                WorkerState::Ready => {
                    if let Some(text) = self.queue.pop_front() {
                        self.deliver(text).await;
                        continue;
                    }
                    if !open {
                        break;
                    }
                    match rx.recv().await {
                        Some(text) => self.queue.push_back(text),
                        None => open = false,
                    }
                }
                WorkerState::Throttled { until } => {
                    tokio::select! {
                        _ = sleep_until(until) => {
                            debug!("[{}] {} throttle lifted, {} queued", self.site, self.sink.id(), self.queue.len());
                            self.state = WorkerState::Ready;
                        }
                        received = rx.recv(), if open => match received {
                            Some(text) => self.queue.push_back(text),
                            None => open = false,
                        },
                    }
                }
            }
        }

        debug!("[{}] {} worker stopped", self.site, self.sink.id());
    }

    async fn deliver(&mut self, text: String) {
        match self.sink.deliver(&text).await {
            Ok(DeliveryOutcome::Delivered) => {}
            Ok(DeliveryOutcome::RateLimited { retry_after }) => self.throttle(text, retry_after),
            Err(e) if e.retry_class() == RetryClass::Requeue => {
                self.throttle(text, DEFAULT_RETRY_AFTER)
            }
            Err(e) => warn!(
                "[{}] Dropping message for {}: {}",
                self.site,
                self.sink.id(),
                e
            ),
        }
    }

    fn throttle(&mut self, text: String, retry_after: std::time::Duration) {
        warn!(
            "[{}] {} rate limited, retrying in {:?}",
            self.site,
            self.sink.id(),
            retry_after
        );
        self.queue.push_front(text);
        let now = Instant::now();
        let until = now
            .checked_add(retry_after.min(MAX_RETRY_AFTER))
            .unwrap_or(now);
        self.state = WorkerState::Throttled { until };
    }
}

/// Spawn the worker task of one sink.
pub fn spawn_worker(site: &str, sink: Arc<dyn Sink>) -> (SinkHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let worker = SinkWorker {
        site: site.to_string(),
        sink: sink.clone(),
        queue: VecDeque::new(),
        state: WorkerState::Ready,
    };
    let join = tokio::spawn(worker.run(rx));
    (SinkHandle { sink, tx }, join)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::sink::fake::FakeTransport;
    use crate::delivery::sink::SlackSink;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_keeps_order() {
        let transport = Arc::new(FakeTransport::new());
        transport.deliver_next();
        transport.rate_limit_next(Duration::from_secs(2));
        let sink = Arc::new(SlackSink::new("https://hooks/x", transport.clone()));
        let (handle, join) = spawn_worker("dev", sink);

        for text in ["A", "B", "C"] {
            assert!(handle.enqueue(text.to_string()));
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(transport.texts(), vec!["A", "B"]);

        assert!(handle.enqueue("D".to_string()));
        tokio::time::sleep(Duration::from_secs(3)).await;

        drop(handle);
        join.await.unwrap();
        assert_eq!(transport.texts(), vec!["A", "B", "B", "C", "D"]);
    }

    #[tokio::test]
    async fn test_failed_message_is_dropped() {
        let transport = Arc::new(FakeTransport::new());
        transport.fail_next();
        let sink = Arc::new(SlackSink::new("https://hooks/x", transport.clone()));
        let (handle, join) = spawn_worker("dev", sink);

        handle.enqueue("lost".to_string());
        handle.enqueue("kept".to_string());
        drop(handle);
        join.await.unwrap();

        assert_eq!(transport.texts(), vec!["lost", "kept"]);
        assert_eq!(transport.posts.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_while_throttled_still_flushes() {
        let transport = Arc::new(FakeTransport::new());
        transport.rate_limit_next(Duration::from_secs(5));
        let sink = Arc::new(SlackSink::new("https://hooks/x", transport.clone()));
        let (handle, join) = spawn_worker("dev", sink);

        handle.enqueue("A".to_string());
        handle.enqueue("B".to_string());
        drop(handle);
        join.await.unwrap();

        assert_eq!(transport.texts(), vec!["A", "A", "B"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_delay_keeps_worker_alive() {
        let transport = Arc::new(FakeTransport::new());
        transport.rate_limit_next(Duration::MAX);
        let sink = Arc::new(SlackSink::new("https://hooks/x", transport.clone()));
        let (handle, join) = spawn_worker("dev", sink);

        assert!(handle.enqueue("A".to_string()));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(handle.enqueue("B".to_string()));

        tokio::time::sleep(MAX_RETRY_AFTER + Duration::from_secs(1)).await;
        assert_eq!(transport.texts(), vec!["A", "A", "B"]);

        drop(handle);
        join.await.unwrap();
    }
}
