use std::{future::Future, sync::Arc};

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Bounded worker pool for one action category.
///
/// A fixed set of workers pulls from a shared queue, so in-flight work for
/// the category can never exceed the ceiling. Pools are independent of each
/// other; a slow pool never throttles a sibling.
pub struct ConcurrencyPool {
    name: &'static str,
    workers: usize,
}

impl ConcurrencyPool {
    pub fn new(name: &'static str, workers: usize) -> Self {
        Self {
            name,
            workers: workers.max(1),
        }
    }

    /// Run every item through `run`, at most `workers` at a time. Returns
    /// only after each dispatched item has produced terminal output.
    ///
    /// Cancellation stops dispatch; items already running finish normally,
    /// items never pulled are simply not attempted.
    pub async fn run_all<T, R, F, Fut>(
        &self,
        items: Vec<T>,
        cancel: &CancellationToken,
        run: F,
    ) -> Vec<R>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
    {
        if items.is_empty() {
            return Vec::new();
        }

        let (tx, rx) = mpsc::channel(items.len());
        for item in items {
            // Capacity equals the item count, so this cannot fail.
            let _ = tx.try_send(item);
        }
        drop(tx);

        self.run_stream(rx, cancel, run).await
    }

    /// Like `run_all`, but items arrive over a channel. This lets one pool
    /// feed another (history completions feeding the leave queue) without a
    /// barrier between the categories.
    pub async fn run_stream<T, R, F, Fut>(
        &self,
        rx: mpsc::Receiver<T>,
        cancel: &CancellationToken,
        run: F,
    ) -> Vec<R>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
    {
        let rx = Arc::new(Mutex::new(rx));
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<R>();

        let mut handles = Vec::with_capacity(self.workers);
        for _ in 0..self.workers {
            let rx = Arc::clone(&rx);
            let out = out_tx.clone();
            let run = run.clone();
            let cancel = cancel.clone();

            handles.push(tokio::spawn(async move {
                loop {
                    let item = {
                        let mut queue = rx.lock().await;
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => None,
                            next = queue.recv() => next,
                        }
                    };
                    let Some(item) = item else {
                        break;
                    };
                    let result = run(item).await;
                    let _ = out.send(result);
                }
            }));
        }
        drop(out_tx);

        for handle in handles {
            let _ = handle.await;
        }

        let mut results = Vec::new();
        while let Ok(r) = out_rx.try_recv() {
            results.push(r);
        }

        debug!(pool = self.name, completed = results.len(), "pool drained");
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn in_flight_never_exceeds_the_ceiling() {
        let pool = ConcurrencyPool::new("test", 3);
        let cancel = CancellationToken::new();

        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let results = {
            let current = Arc::clone(&current);
            let peak = Arc::clone(&peak);
            pool.run_all((0..10).collect(), &cancel, move |i: usize| {
                let current = Arc::clone(&current);
                let peak = Arc::clone(&peak);
                async move {
                    let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    current.fetch_sub(1, Ordering::SeqCst);
                    i
                }
            })
            .await
        };

        assert_eq!(results.len(), 10);
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn every_item_produces_terminal_output() {
        let pool = ConcurrencyPool::new("test", 2);
        let cancel = CancellationToken::new();

        let mut results = pool
            .run_all(vec![1, 2, 3, 4, 5], &cancel, |i: i32| async move { i * 2 })
            .await;
        results.sort();
        assert_eq!(results, vec![2, 4, 6, 8, 10]);
    }

    #[tokio::test]
    async fn cancellation_stops_dispatch_but_not_in_flight_work() {
        let pool = ConcurrencyPool::new("test", 1);
        let cancel = CancellationToken::new();

        let results = {
            let cancel_inside = cancel.clone();
            pool.run_all((0..5).collect(), &cancel, move |i: usize| {
                let cancel_inside = cancel_inside.clone();
                async move {
                    if i == 1 {
                        cancel_inside.cancel();
                    }
                    i
                }
            })
            .await
        };

        // Items 0 and 1 ran; the worker saw the cancellation before pulling 2.
        assert_eq!(results, vec![0, 1]);
    }

    #[tokio::test]
    async fn run_stream_drains_a_fed_channel() {
        let pool = ConcurrencyPool::new("test", 2);
        let cancel = CancellationToken::new();

        let (tx, rx) = mpsc::channel(8);
        let feeder = tokio::spawn(async move {
            for i in 0..6 {
                tx.send(i).await.unwrap();
            }
        });

        let mut results = pool.run_stream(rx, &cancel, |i: i32| async move { i }).await;
        feeder.await.unwrap();
        results.sort();
        assert_eq!(results, vec![0, 1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn empty_input_completes_immediately() {
        let pool = ConcurrencyPool::new("test", 4);
        let cancel = CancellationToken::new();
        let results: Vec<i32> = pool.run_all(Vec::new(), &cancel, |i| async move { i }).await;
        assert!(results.is_empty());
    }
}
