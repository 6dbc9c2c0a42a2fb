//! Ordered two-phase task queue.
//!
//! Each task is a `{prepare, commit}` pair. Prepares start the moment the
//! task is enqueued and may settle in any order; commits run strictly in
//! enqueue order, one at a time, each finishing before the next starts.
//! This is what lets synthesis race ahead while playback stays serialized,
//! and it is also why no extra lock guards the audio device: the commit
//! chain itself is the exclusion mechanism.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::future::BoxFuture;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::warn;

use crate::error::PipelineError;

type CommitFn<T> = Box<dyn FnOnce(T) -> BoxFuture<'static, Result<(), PipelineError>> + Send>;

struct Task<T> {
    index: u64,
    prepared: JoinHandle<Result<T, PipelineError>>,
    commit: CommitFn<T>,
}

enum Message<T> {
    Task(Task<T>),
    Drain(oneshot::Sender<()>),
}

/// Serializes commit phases of concurrently prepared tasks.
///
/// A failed prepare skips its commit; a failed commit is logged; neither
/// stalls the tasks behind it, so `drain` always resolves.
pub struct SequencedQueue<T> {
    tx: mpsc::UnboundedSender<Message<T>>,
    next_index: AtomicU64,
}

impl<T: Send + 'static> SequencedQueue<T> {
    /// Create the queue and spawn its commit loop. Must be called from
    /// within a tokio runtime.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_commits(rx));
        Self {
            tx,
            next_index: AtomicU64::new(0),
        }
    }

    /// Append a task and return its sequence index without blocking.
    ///
    /// `prepare` is spawned immediately, independent of queue position.
    /// The commit is held back until every earlier task's commit has
    /// settled, regardless of when this task's prepare finishes.
    pub fn enqueue<P, C, Fut>(&self, prepare: P, commit: C) -> u64
    where
        P: Future<Output = Result<T, PipelineError>> + Send + 'static,
        C: FnOnce(T) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), PipelineError>> + Send + 'static,
    {
        let index = self.next_index.fetch_add(1, Ordering::Relaxed);
        let task = Task {
            index,
            prepared: tokio::spawn(prepare),
            commit: Box::new(move |value| Box::pin(commit(value))),
        };
        // send only fails once the commit loop is gone, i.e. at shutdown
        let _ = self.tx.send(Message::Task(task));
        index
    }

    /// Resolve once every task enqueued before this call has committed
    /// (or been skipped after a failed prepare).
    pub async fn drain(&self) -> Result<(), PipelineError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(Message::Drain(ack_tx))
            .map_err(|_| PipelineError::QueueClosed)?;
        ack_rx.await.map_err(|_| PipelineError::QueueClosed)
    }
}

async fn run_commits<T: Send + 'static>(mut rx: mpsc::UnboundedReceiver<Message<T>>) {
    while let Some(message) = rx.recv().await {
        match message {
            Message::Task(task) => match task.prepared.await {
                Ok(Ok(value)) => {
                    if let Err(e) = (task.commit)(value).await {
                        warn!(index = task.index, error = %e, "commit failed, continuing with later tasks");
                    }
                }
                Ok(Err(e)) => {
                    warn!(index = task.index, error = %e, "prepare failed, skipping commit");
                }
                Err(e) => {
                    warn!(index = task.index, error = %e, "prepare task aborted");
                }
            },
            // every task sent before this marker has already committed
            Message::Drain(ack) => {
                let _ = ack.send(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn boom() -> PipelineError {
        PipelineError::TextSource(anyhow::anyhow!("prepare exploded"))
    }

    #[tokio::test]
    async fn commits_follow_enqueue_order_despite_reversed_prepares() {
        let queue = SequencedQueue::new();
        let order: Arc<Mutex<Vec<u64>>> = Arc::new(Mutex::new(Vec::new()));

        // later tasks prepare faster, so prepares settle 3, 2, 1
        for (value, delay_ms) in [(1u64, 60u64), (2, 40), (3, 20)] {
            let order = Arc::clone(&order);
            queue.enqueue(
                async move {
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    Ok(value)
                },
                move |value| async move {
                    order.lock().unwrap().push(value);
                    Ok(())
                },
            );
        }

        queue.drain().await.unwrap();
        assert_eq!(*order.lock().unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn commits_do_not_overlap() {
        let queue = SequencedQueue::new();
        let active = Arc::new(Mutex::new(0u32));
        let max_active = Arc::new(Mutex::new(0u32));

        for value in 0u64..5 {
            let active = Arc::clone(&active);
            let max_active = Arc::clone(&max_active);
            queue.enqueue(
                async move { Ok(value) },
                move |_| async move {
                    {
                        let mut a = active.lock().unwrap();
                        *a += 1;
                        let mut m = max_active.lock().unwrap();
                        *m = (*m).max(*a);
                    }
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    *active.lock().unwrap() -= 1;
                    Ok(())
                },
            );
        }

        queue.drain().await.unwrap();
        assert_eq!(*max_active.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn failed_prepare_skips_commit_but_does_not_block_later_tasks() {
        let queue = SequencedQueue::new();
        let order: Arc<Mutex<Vec<u64>>> = Arc::new(Mutex::new(Vec::new()));

        for value in [1u64, 2, 3] {
            let order = Arc::clone(&order);
            queue.enqueue(
                async move {
                    if value == 2 {
                        Err(boom())
                    } else {
                        Ok(value)
                    }
                },
                move |value| async move {
                    order.lock().unwrap().push(value);
                    Ok(())
                },
            );
        }

        queue.drain().await.unwrap();
        assert_eq!(*order.lock().unwrap(), vec![1, 3]);
    }

    #[tokio::test]
    async fn failed_commit_does_not_stop_the_chain() {
        let queue = SequencedQueue::new();
        let order: Arc<Mutex<Vec<u64>>> = Arc::new(Mutex::new(Vec::new()));

        for value in [1u64, 2, 3] {
            let order = Arc::clone(&order);
            queue.enqueue(
                async move { Ok(value) },
                move |value| async move {
                    order.lock().unwrap().push(value);
                    if value == 1 {
                        Err(boom())
                    } else {
                        Ok(())
                    }
                },
            );
        }

        queue.drain().await.unwrap();
        assert_eq!(*order.lock().unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn drain_on_empty_queue_resolves_immediately() {
        let queue: SequencedQueue<u64> = SequencedQueue::new();
        queue.drain().await.unwrap();
    }

    #[tokio::test]
    async fn enqueue_returns_monotonic_indices() {
        let queue: SequencedQueue<u64> = SequencedQueue::new();
        let a = queue.enqueue(async { Ok(0) }, |_| async { Ok(()) });
        let b = queue.enqueue(async { Ok(0) }, |_| async { Ok(()) });
        assert_eq!((a, b), (0, 1));
        queue.drain().await.unwrap();
    }
}
