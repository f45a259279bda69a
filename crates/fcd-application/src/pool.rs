//! Shared embedding worker pool
//!
//! # Overview
//! A bounded pool of N workers shared by every folder. Producers submit
//! batches and block cooperatively while the queue is full; workers pull
//! by `(priority, age)` order. Fairness: a folder already holding its
//! share of in-flight slots is passed over while other folders have
//! pending work. A removed folder's pending batches are cancelled before
//! dispatch; its in-flight batches complete and their results are
//! discarded by the dropped receiver.

use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Notify, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use fcd_domain::Error;
use fcd_domain::error::Result;
use fcd_domain::ids::FolderId;
use fcd_domain::ports::EmbeddingProvider;
use std::sync::Arc;

/// Pool sizing and batching limits
#[derive(Debug, Clone)]
pub struct PoolLimits {
    /// Worker task count
    pub workers: usize,
    /// Queue capacity in batches
    pub queue_capacity: usize,
    /// Fraction of in-flight slots one folder may hold while others wait
    pub folder_inflight_fraction: f32,
}

impl Default for PoolLimits {
    fn default() -> Self {
        Self {
            workers: 2,
            queue_capacity: 64,
            folder_inflight_fraction: 0.75,
        }
    }
}

/// One batch of chunk texts to embed
pub struct EmbedBatch {
    /// Folder the batch belongs to
    pub folder: FolderId,
    /// Lower value dispatches first
    pub priority: u8,
    /// Provider the batch runs on (folders may use different models)
    pub provider: Arc<dyn EmbeddingProvider>,
    /// Chunk texts, order preserved in the reply
    pub texts: Vec<String>,
}

struct QueuedBatch {
    batch: EmbedBatch,
    seq: u64,
    reply: oneshot::Sender<Result<Vec<Vec<f32>>>>,
}

impl PartialEq for QueuedBatch {
    fn eq(&self, other: &Self) -> bool {
        self.batch.priority == other.batch.priority && self.seq == other.seq
    }
}
impl Eq for QueuedBatch {}
impl PartialOrd for QueuedBatch {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for QueuedBatch {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // BinaryHeap is a max-heap; invert so lower (priority, seq) pops first
        (other.batch.priority, other.seq).cmp(&(self.batch.priority, self.seq))
    }
}

struct PoolInner {
    queue: Mutex<BinaryHeap<QueuedBatch>>,
    in_flight: Mutex<HashMap<FolderId, usize>>,
    cancelled: Mutex<HashSet<FolderId>>,
    space: Notify,
    work: Notify,
    seq: AtomicU64,
    queue_capacity: usize,
    per_folder_cap: usize,
    shutdown: CancellationToken,
}

/// The shared pool handle
pub struct EmbeddingPool {
    inner: Arc<PoolInner>,
    workers: Vec<tokio::task::JoinHandle<()>>,
}

impl EmbeddingPool {
    /// Start the pool with `limits`
    #[must_use]
    pub fn start(limits: &PoolLimits) -> Self {
        let workers_n = limits.workers.max(1);
        let per_folder_cap = ((workers_n as f32) * limits.folder_inflight_fraction)
            .floor()
            .max(1.0) as usize;
        let inner = Arc::new(PoolInner {
            queue: Mutex::new(BinaryHeap::new()),
            in_flight: Mutex::new(HashMap::new()),
            cancelled: Mutex::new(HashSet::new()),
            space: Notify::new(),
            work: Notify::new(),
            seq: AtomicU64::new(0),
            queue_capacity: limits.queue_capacity.max(1),
            per_folder_cap,
            shutdown: CancellationToken::new(),
        });

        let workers = (0..workers_n)
            .map(|worker_id| {
                let inner = Arc::clone(&inner);
                tokio::spawn(worker_loop(inner, worker_id))
            })
            .collect();

        Self { inner, workers }
    }

    /// Submit a batch, waiting cooperatively while the queue is full.
    /// Resolves to the batch's vectors once a worker has run it.
    ///
    /// # Errors
    ///
    /// `Cancelled` when the folder was removed, `Inference` when the
    /// provider failed after the pool's single retry.
    pub async fn submit(&self, batch: EmbedBatch) -> Result<Vec<Vec<f32>>> {
        let rx = self.enqueue(batch).await?;
        rx.await
            .map_err(|_| Error::cancelled("embedding batch dropped"))?
    }

    async fn enqueue(
        &self,
        batch: EmbedBatch,
    ) -> Result<oneshot::Receiver<Result<Vec<Vec<f32>>>>> {
        loop {
            if self.inner.shutdown.is_cancelled() {
                return Err(Error::cancelled("embedding pool shut down"));
            }
            if self
                .inner
                .cancelled
                .lock()
                .map_err(|_| Error::internal("pool lock poisoned"))?
                .contains(&batch.folder)
            {
                return Err(Error::cancelled(format!(
                    "folder {} removed",
                    batch.folder
                )));
            }
            {
                let mut queue = self
                    .inner
                    .queue
                    .lock()
                    .map_err(|_| Error::internal("pool lock poisoned"))?;
                if queue.len() < self.inner.queue_capacity {
                    let (tx, rx) = oneshot::channel();
                    queue.push(QueuedBatch {
                        batch,
                        seq: self.inner.seq.fetch_add(1, Ordering::Relaxed),
                        reply: tx,
                    });
                    drop(queue);
                    self.inner.work.notify_one();
                    return Ok(rx);
                }
            }
            trace!("embedding queue full; producer waiting");
            self.inner.space.notified().await;
        }
    }

    /// Cancel everything a folder still has queued. In-flight batches run
    /// to completion; their receivers are gone, so results are discarded.
    pub fn cancel_folder(&self, folder: &FolderId) {
        if let Ok(mut cancelled) = self.inner.cancelled.lock() {
            cancelled.insert(folder.clone());
        }
        let mut dropped = 0usize;
        if let Ok(mut queue) = self.inner.queue.lock() {
            let kept: Vec<QueuedBatch> = queue
                .drain()
                .filter_map(|qb| {
                    if qb.batch.folder == *folder {
                        dropped += 1;
                        let _ = qb
                            .reply
                            .send(Err(Error::cancelled(format!("folder {folder} removed"))));
                        None
                    } else {
                        Some(qb)
                    }
                })
                .collect();
            queue.extend(kept);
        }
        if dropped > 0 {
            debug!(%folder, dropped, "pending batches cancelled");
            self.inner.space.notify_waiters();
        }
    }

    /// Allow a previously cancelled folder to submit again (re-add)
    pub fn reinstate_folder(&self, folder: &FolderId) {
        if let Ok(mut cancelled) = self.inner.cancelled.lock() {
            cancelled.remove(folder);
        }
    }

    /// Stop workers; queued batches resolve as cancelled
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
        self.inner.work.notify_waiters();
        self.inner.space.notify_waiters();
        if let Ok(mut queue) = self.inner.queue.lock() {
            for qb in queue.drain() {
                let _ = qb.reply.send(Err(Error::cancelled("embedding pool shut down")));
            }
        }
        for worker in &self.workers {
            worker.abort();
        }
    }
}

impl Drop for EmbeddingPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn worker_loop(inner: Arc<PoolInner>, worker_id: usize) {
    loop {
        if inner.shutdown.is_cancelled() {
            return;
        }
        let claimed = claim(&inner);
        let Some(qb) = claimed else {
            tokio::select! {
                () = inner.shutdown.cancelled() => return,
                () = inner.work.notified() => continue,
            }
        };

        let folder = qb.batch.folder.clone();
        inner.space.notify_one();
        trace!(worker = worker_id, %folder, texts = qb.batch.texts.len(), "batch dispatched");

        let result = run_batch(&qb.batch).await;
        let _ = qb.reply.send(result);

        if let Ok(mut in_flight) = inner.in_flight.lock() {
            if let Some(count) = in_flight.get_mut(&folder) {
                *count = count.saturating_sub(1);
                if *count == 0 {
                    in_flight.remove(&folder);
                }
            }
        }
        // A slot freed up; another batch of the same folder may now be eligible
        inner.work.notify_one();
    }
}

/// Pop the best eligible batch, honoring cancellation and the per-folder
/// in-flight cap. Ineligible batches are reinserted.
fn claim(inner: &Arc<PoolInner>) -> Option<QueuedBatch> {
    let mut queue = inner.queue.lock().ok()?;
    let mut in_flight = inner.in_flight.lock().ok()?;
    let cancelled = inner.cancelled.lock().ok()?;

    let mut skipped: Vec<QueuedBatch> = Vec::new();
    let mut claimed: Option<QueuedBatch> = None;

    while let Some(qb) = queue.pop() {
        if cancelled.contains(&qb.batch.folder) {
            let folder = qb.batch.folder.clone();
            let _ = qb
                .reply
                .send(Err(Error::cancelled(format!("folder {folder} removed"))));
            inner.space.notify_one();
            continue;
        }
        let folder_load = in_flight.get(&qb.batch.folder).copied().unwrap_or(0);
        let others_pending = skipped
            .iter()
            .any(|s| s.batch.folder != qb.batch.folder)
            || queue.iter().any(|s| s.batch.folder != qb.batch.folder);
        if folder_load >= inner.per_folder_cap && others_pending {
            // Fair scheduling: this folder is saturated and someone else
            // is waiting
            skipped.push(qb);
            continue;
        }
        *in_flight.entry(qb.batch.folder.clone()).or_insert(0) += 1;
        claimed = Some(qb);
        break;
    }

    // Skipped batches go back; they become eligible when a slot frees
    queue.extend(skipped);
    claimed
}

async fn run_batch(batch: &EmbedBatch) -> Result<Vec<Vec<f32>>> {
    match batch.provider.embed(&batch.texts).await {
        Ok(vectors) => Ok(vectors),
        Err(first) => {
            warn!(folder = %batch.folder, error = %first, "batch inference failed; retrying once");
            batch.provider.embed(&batch.texts).await.map_err(|second| {
                Error::inference(format!(
                    "batch failed twice: first: {first}; retry: {second}"
                ))
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use fcd_domain::entities::ExecutionBackend;
    use std::path::Path;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct CountingProvider {
        calls: AtomicUsize,
        fail_first: AtomicUsize,
        delay: Duration,
    }

    impl CountingProvider {
        fn new(delay: Duration) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_first: AtomicUsize::new(0),
                delay,
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for CountingProvider {
        async fn ensure_ready(&self) -> Result<()> {
            Ok(())
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_first.load(Ordering::SeqCst) > 0 {
                self.fail_first.fetch_sub(1, Ordering::SeqCst);
                return Err(Error::inference("synthetic failure"));
            }
            tokio::time::sleep(self.delay).await;
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
        fn dimensions(&self) -> usize {
            2
        }
        fn model_id(&self) -> &str {
            "counting"
        }
        fn active_backend(&self) -> ExecutionBackend {
            ExecutionBackend::Cpu
        }
        fn is_cached(&self) -> bool {
            true
        }
    }

    fn folder(name: &str) -> FolderId {
        FolderId::from_canonical(Path::new(&format!("/tmp/{name}")))
    }

    #[tokio::test]
    async fn submits_and_resolves() {
        let pool = EmbeddingPool::start(&PoolLimits::default());
        let provider = Arc::new(CountingProvider::new(Duration::ZERO));
        let vectors = pool
            .submit(EmbedBatch {
                folder: folder("a"),
                priority: 1,
                provider,
                texts: vec!["one".to_owned(), "two".to_owned()],
            })
            .await
            .expect("submit");
        assert_eq!(vectors.len(), 2);
    }

    #[tokio::test]
    async fn retries_once_then_fails() {
        let pool = EmbeddingPool::start(&PoolLimits::default());
        let provider = Arc::new(CountingProvider::new(Duration::ZERO));
        provider.fail_first.store(2, Ordering::SeqCst);

        let result = pool
            .submit(EmbedBatch {
                folder: folder("a"),
                priority: 1,
                provider: Arc::clone(&provider) as Arc<dyn EmbeddingProvider>,
                texts: vec!["x".to_owned()],
            })
            .await;
        assert!(result.is_err());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn single_failure_recovers_on_retry() {
        let pool = EmbeddingPool::start(&PoolLimits::default());
        let provider = Arc::new(CountingProvider::new(Duration::ZERO));
        provider.fail_first.store(1, Ordering::SeqCst);

        let vectors = pool
            .submit(EmbedBatch {
                folder: folder("a"),
                priority: 1,
                provider: Arc::clone(&provider) as Arc<dyn EmbeddingProvider>,
                texts: vec!["x".to_owned()],
            })
            .await
            .expect("retry succeeds");
        assert_eq!(vectors.len(), 1);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn cancelled_folder_is_rejected() {
        let pool = EmbeddingPool::start(&PoolLimits::default());
        let target = folder("doomed");
        pool.cancel_folder(&target);

        let provider = Arc::new(CountingProvider::new(Duration::ZERO));
        let result = pool
            .submit(EmbedBatch {
                folder: target,
                priority: 1,
                provider,
                texts: vec!["x".to_owned()],
            })
            .await;
        assert!(matches!(result, Err(Error::Cancelled { .. })));
    }

    #[tokio::test]
    async fn lower_priority_value_dispatches_first() {
        // Single worker so ordering is observable
        let pool = EmbeddingPool::start(&PoolLimits {
            workers: 1,
            queue_capacity: 16,
            folder_inflight_fraction: 1.0,
        });
        let provider = Arc::new(CountingProvider::new(Duration::from_millis(30)));

        // Occupy the worker so both test batches sit queued together
        let blocker = pool.submit(EmbedBatch {
            folder: folder("block"),
            priority: 0,
            provider: Arc::clone(&provider) as Arc<dyn EmbeddingProvider>,
            texts: vec!["b".to_owned()],
        });
        let slow = pool.enqueue(EmbedBatch {
            folder: folder("slow"),
            priority: 9,
            provider: Arc::clone(&provider) as Arc<dyn EmbeddingProvider>,
            texts: vec!["s".to_owned()],
        });
        let fast = pool.enqueue(EmbedBatch {
            folder: folder("fast"),
            priority: 1,
            provider: Arc::clone(&provider) as Arc<dyn EmbeddingProvider>,
            texts: vec!["f".to_owned()],
        });

        let (blocker_done, slow_rx, fast_rx) = tokio::join!(blocker, slow, fast);
        blocker_done.expect("blocker");
        let slow_rx = slow_rx.expect("slow enqueued");
        let fast_rx = fast_rx.expect("fast enqueued");

        // fast (priority 1) must resolve before slow (priority 9)
        let fast_first = tokio::select! {
            biased;
            _ = fast_rx => true,
            _ = slow_rx => false,
        };
        assert!(fast_first, "priority order violated");
    }
}
