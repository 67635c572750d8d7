use frameline_cache::Cache;
use frameline_common::ResourceKey;
use frameline_sync::{ConcurrentQueue, Future, LoadError, channel};
use parking_lot::{Condvar, Mutex};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::config::EngineConfig;
use crate::engine::EngineHandle;
use crate::error::{EngineError, EngineResult, panic_message};

type LoadJob = Box<dyn FnOnce(&EngineHandle) + Send + 'static>;

#[derive(Debug, Default)]
struct JobCounters {
    requested: u64,
    finished: u64,
}

struct LoaderShared {
    jobs: ConcurrentQueue<LoadJob>,
    counters: Mutex<JobCounters>,
    all_finished: Condvar,
}

impl LoaderShared {
    fn finish_one(&self) {
        let mut c = self.counters.lock();
        // A reset while jobs were in flight must not push finished past requested.
        if c.finished < c.requested {
            c.finished += 1;
        }
        if c.finished == c.requested {
            self.all_finished.notify_all();
        }
    }
}

/// Background decoding service.
///
/// Owns `loader_threads` workers that pop jobs in FIFO order. Each job gets
/// the engine handle so it can queue GPU-side finalization after decoding.
pub struct ResourceLoader {
    shared: Arc<LoaderShared>,
    workers: Vec<JoinHandle<()>>,
    engine: EngineHandle,
}

impl ResourceLoader {
    pub fn new(config: &EngineConfig, engine: EngineHandle) -> EngineResult<Self> {
        config.validate()?;
        let shared = Arc::new(LoaderShared {
            jobs: ConcurrentQueue::with_capacity(config.job_queue_capacity),
            counters: Mutex::new(JobCounters::default()),
            all_finished: Condvar::new(),
        });

        let mut loader = Self {
            shared,
            workers: Vec::with_capacity(config.loader_threads),
            engine,
        };
        for i in 0..config.loader_threads {
            let shared = Arc::clone(&loader.shared);
            let engine = loader.engine.clone();
            let worker = thread::Builder::new()
                .name(format!("resource-loader-{i}"))
                .spawn(move || worker_loop(&shared, &engine))
                .map_err(|e| EngineError::Spawn(e.to_string()))?;
            loader.workers.push(worker);
        }
        tracing::info!(workers = config.loader_threads, "resource loader started");
        Ok(loader)
    }

    /// Queue `job` on a worker and return the future of its result.
    ///
    /// Blocks only when the job queue is bounded and full. A panicking job
    /// resolves its future with [`LoadError::Panicked`].
    pub fn enqueue<T, F>(&self, job: F) -> EngineResult<Future<T>>
    where
        T: Send + 'static,
        F: FnOnce(&EngineHandle) -> Result<T, LoadError> + Send + 'static,
    {
        let (promise, future) = channel();
        let wrapped: LoadJob = Box::new(move |engine| {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| job(engine)))
                .unwrap_or_else(|payload| {
                    let reason = panic_message(payload.as_ref());
                    tracing::error!(%reason, "loader job panicked");
                    Err(LoadError::Panicked(reason))
                });
            // Only this job holds the promise.
            let _ = promise.complete(outcome);
        });

        self.shared.counters.lock().requested += 1;
        if self.shared.jobs.push(wrapped).is_err() {
            let mut c = self.shared.counters.lock();
            c.requested = c.requested.saturating_sub(1);
            tracing::warn!("loader job rejected: loader is shut down");
            return Err(EngineError::Closed);
        }
        Ok(future)
    }

    /// Return the cached share for `key`, or decode it on a worker and
    /// publish it as a shared cache entry.
    ///
    /// If another loader publishes the same key first, the future resolves
    /// to the resident entry and the fresh decode is discarded.
    pub fn load_shared<T, F>(
        &self,
        cache: &Arc<Cache<T>>,
        key: ResourceKey,
        decode: F,
    ) -> EngineResult<Future<Arc<T>>>
    where
        T: Send + Sync + 'static,
        F: FnOnce(&EngineHandle) -> Result<T, LoadError> + Send + 'static,
    {
        if let Ok(hit) = cache.share(&key) {
            tracing::debug!(%key, "load served from cache");
            return Ok(Future::ready(hit));
        }
        let cache = Arc::clone(cache);
        self.enqueue(move |engine| {
            let fresh = Arc::new(decode(engine)?);
            match cache.insert_shared(key, Arc::clone(&fresh)) {
                Ok(()) => Ok(fresh),
                // Lost the race: drop our decode and serve the resident entry.
                Err(_rejected) => cache
                    .share(&key)
                    .map_err(|e| LoadError::msg(e.to_string())),
            }
        })
    }

    pub fn requested_jobs(&self) -> u64 {
        self.shared.counters.lock().requested
    }

    pub fn finished_jobs(&self) -> u64 {
        self.shared.counters.lock().finished
    }

    pub fn reset_job_counter(&self) {
        let mut c = self.shared.counters.lock();
        c.requested = 0;
        c.finished = 0;
    }

    /// Block until every requested job has finished.
    pub fn wait_till_all_jobs_finished(&self) {
        let mut c = self.shared.counters.lock();
        while c.finished < c.requested {
            self.shared.all_finished.wait(&mut c);
        }
    }

    /// Like [`wait_till_all_jobs_finished`](Self::wait_till_all_jobs_finished)
    /// with an upper bound. Returns whether everything finished.
    pub fn wait_till_all_jobs_finished_for(&self, timeout: Duration) -> bool {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            self.wait_till_all_jobs_finished();
            return true;
        };
        let mut c = self.shared.counters.lock();
        while c.finished < c.requested {
            if self.shared.all_finished.wait_until(&mut c, deadline).timed_out() {
                return c.finished >= c.requested;
            }
        }
        true
    }

    pub fn queued_jobs(&self) -> usize {
        self.shared.jobs.len()
    }

    pub fn engine(&self) -> &EngineHandle {
        &self.engine
    }

    /// Stop accepting jobs, let workers finish what is queued, and join them.
    pub fn shutdown(&mut self) {
        if self.workers.is_empty() {
            return;
        }
        self.shared.jobs.close();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                tracing::error!("resource loader worker terminated abnormally");
            }
        }
        tracing::info!("resource loader shut down");
    }
}

impl Drop for ResourceLoader {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(shared: &LoaderShared, engine: &EngineHandle) {
    tracing::debug!("loader worker started");
    while let Some(job) = shared.jobs.pop(Duration::MAX) {
        job(engine);
        shared.finish_one();
    }
    tracing::debug!("loader worker stopped");
}
