//! Bounded parallel conversion.
//!
//! Jobs go into a FIFO queue sized to hold all of them. A fixed set of
//! workers each pull the next job, run the optional normalizer and then the
//! converter, and send the outcome back over a channel. Outcomes arrive in
//! completion order; every outcome carries the job's sequence number.

use async_stream::stream;
use futures::Stream;
use offload_card::FileRecord;
use offload_tools::error::Error as ToolError;
use offload_tools::{Converter, Normalizer};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;

/// Upper bound on automatically chosen workers. Each converter process can
/// use 1-2 GB of memory.
pub const DEFAULT_MAX_WORKERS: usize = 4;

#[derive(Debug, Clone)]
pub struct ConversionJob {
    /// Zero-based position in the submitted list.
    pub sequence: usize,
    pub source: FileRecord,
}

#[derive(Debug)]
pub struct ConversionOutcome {
    pub sequence: usize,
    pub source: FileRecord,
    /// The converted JPEG, or why there isn't one.
    pub result: Result<PathBuf, ToolError>,
    /// The normalizer's output, when that step ran and succeeded. Present even
    /// if the conversion that followed failed, so it can be cleaned up.
    pub intermediate: Option<PathBuf>,
    /// Wall time of both steps together.
    pub elapsed: Duration,
}

/// Progress events emitted by [`WorkerPool::run`].
///
/// Events follow a strict ordering:
/// 1. [`Started`](Self::Started) exactly once.
/// 2. [`Converted`](Self::Converted) once per job.
/// 3. [`Complete`](Self::Complete) exactly once, after which the stream ends.
#[derive(Debug)]
pub enum PoolEvent {
    Started { jobs: usize, workers: usize },
    Converted(Box<ConversionOutcome>),
    Complete,
}

/// `max(1, min(configured or min(cores, DEFAULT_MAX_WORKERS), jobs))`.
pub fn worker_count(configured: Option<usize>, jobs: usize) -> usize {
    let preferred = configured.filter(|n| *n > 0).unwrap_or_else(|| {
        std::thread::available_parallelism().map(usize::from).unwrap_or(1).min(DEFAULT_MAX_WORKERS)
    });
    preferred.min(jobs).max(1)
}

#[derive(Clone)]
pub struct WorkerPool {
    converter: Arc<dyn Converter>,
    normalizer: Option<Arc<dyn Normalizer>>,
    workers: Option<usize>,
}

impl WorkerPool {
    /// `workers` of `None` picks a count from the available cores.
    pub fn new(converter: Arc<dyn Converter>, normalizer: Option<Arc<dyn Normalizer>>, workers: Option<usize>) -> Self {
        Self { converter, normalizer, workers }
    }

    /// Convert every job, streaming outcomes as they finish.
    ///
    /// One job failing has no effect on the others. Must be polled inside a
    /// Tokio runtime; workers are spawned as tasks when the stream is first
    /// polled.
    pub fn run(&self, jobs: Vec<ConversionJob>) -> impl Stream<Item = PoolEvent> + Send + 'static {
        let pool = self.clone();
        // `rustfmt` does not format macros that use braces. Wrap in parentheses!
        stream!({
            let total = jobs.len();
            let workers = worker_count(pool.workers, total);
            yield PoolEvent::Started { jobs: total, workers };
            if total == 0 {
                yield PoolEvent::Complete;
                return;
            }

            let (job_tx, job_rx) = mpsc::channel(total);
            for job in jobs {
                // Capacity is the job count, so this never waits.
                if job_tx.send(job).await.is_err() {
                    break;
                }
            }
            drop(job_tx);
            let job_rx = Arc::new(Mutex::new(job_rx));

            let (outcome_tx, mut outcome_rx) = mpsc::channel(total);
            let mut running = JoinSet::new();
            for id in 0..workers {
                running.spawn(worker(id, pool.clone(), Arc::clone(&job_rx), outcome_tx.clone()));
            }
            // The watcher holds the last sender, so the outcome channel closes
            // only once every worker has finished.
            tokio::spawn(async move {
                while let Some(joined) = running.join_next().await {
                    if let Err(e) = joined {
                        tracing::error!(error = %e, "Conversion worker died; its current file has no outcome");
                    }
                }
                drop(outcome_tx);
            });

            while let Some(outcome) = outcome_rx.recv().await {
                yield PoolEvent::Converted(Box::new(outcome));
            }
            yield PoolEvent::Complete;
        })
    }
}

async fn worker(
    id: usize,
    pool: WorkerPool,
    jobs: Arc<Mutex<mpsc::Receiver<ConversionJob>>>,
    outcomes: mpsc::Sender<ConversionOutcome>,
) {
    loop {
        // The queue is fully loaded before any worker starts, so holding the
        // lock across `recv` never blocks on a producer.
        let Some(job) = jobs.lock().await.recv().await else { break };
        tracing::debug!(worker = id, sequence = job.sequence, file = %job.source.name, "Converting");
        let outcome = pool.process(job).await;
        if outcomes.send(outcome).await.is_err() {
            // Nobody is listening any more.
            break;
        }
    }
}

impl WorkerPool {
    async fn process(&self, job: ConversionJob) -> ConversionOutcome {
        let started = Instant::now();
        let mut intermediate = None;
        let input = match &self.normalizer {
            None => Ok(job.source.path.clone()),
            Some(normalizer) => normalizer.normalize(&job.source.path).await.inspect(|path| {
                intermediate = Some(path.clone());
            }),
        };
        let result = match input {
            Ok(input) => self.converter.convert(&input).await,
            Err(e) => Err(e),
        };
        ConversionOutcome { sequence: job.sequence, source: job.source, result, intermediate, elapsed: started.elapsed() }
    }
}
