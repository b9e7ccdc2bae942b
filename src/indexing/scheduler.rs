//! Batch execution for per-file stage work.
//!
//! A stage builds one job per path and hands the whole batch to a
//! scheduler. `run_batch` returns only after every job has finished, which
//! is the barrier between pipeline stages. Jobs of one batch never depend
//! on each other.

use std::panic::{AssertUnwindSafe, catch_unwind};

pub type Job<'a> = Box<dyn FnOnce() + Send + 'a>;

pub trait JobScheduler: Send + Sync {
    /// Run every job and return once all of them are done.
    ///
    /// A panicking job is logged and does not stop the rest of the batch.
    /// Returns the number of jobs that completed normally.
    fn run_batch<'a>(&self, label: &str, jobs: Vec<Job<'a>>) -> usize;

    /// Whether jobs may run concurrently.
    fn is_concurrent(&self) -> bool;
}

fn run_isolated(label: &str, job: Job<'_>) -> bool {
    match catch_unwind(AssertUnwindSafe(job)) {
        Ok(()) => true,
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!("[scheduler] job in '{label}' panicked: {reason}");
            false
        }
    }
}

/// Runs jobs on the calling thread in submission order.
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineScheduler;

impl JobScheduler for InlineScheduler {
    fn run_batch<'a>(&self, label: &str, jobs: Vec<Job<'a>>) -> usize {
        jobs.into_iter()
            .map(|job| run_isolated(label, job))
            .filter(|ok| *ok)
            .count()
    }

    fn is_concurrent(&self) -> bool {
        false
    }
}

/// Runs jobs on a dedicated rayon pool; the scope is the join barrier.
pub struct PoolScheduler {
    pool: rayon::ThreadPool,
}

impl PoolScheduler {
    /// Build a pool with `threads` workers.
    pub fn new(threads: usize) -> Result<Self, rayon::ThreadPoolBuildError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|i| format!("hdlindex-worker-{i}"))
            .build()?;
        Ok(Self { pool })
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl JobScheduler for PoolScheduler {
    fn run_batch<'a>(&self, label: &str, jobs: Vec<Job<'a>>) -> usize {
        let completed = std::sync::atomic::AtomicUsize::new(0);
        let completed_ref = &completed;
        self.pool.scope(|scope| {
            for job in jobs {
                scope.spawn(move |_| {
                    if run_isolated(label, job) {
                        completed_ref.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    }
                });
            }
        });
        completed.into_inner()
    }

    fn is_concurrent(&self) -> bool {
        true
    }
}

/// Scheduler for the given concurrency setting.
pub fn scheduler_for(enable_threads: bool, threads: usize) -> Box<dyn JobScheduler> {
    if !enable_threads || threads <= 1 {
        return Box::new(InlineScheduler);
    }
    match PoolScheduler::new(threads) {
        Ok(pool) => Box::new(pool),
        Err(e) => {
            tracing::warn!("[scheduler] worker pool unavailable, running inline: {e}");
            Box::new(InlineScheduler)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_inline_runs_in_order() {
        let order = Mutex::new(Vec::new());
        let jobs: Vec<Job<'_>> = (0..5)
            .map(|i| {
                let order = &order;
                Box::new(move || order.lock().push(i)) as Job<'_>
            })
            .collect();

        assert_eq!(InlineScheduler.run_batch("order", jobs), 5);
        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_pool_joins_before_returning() {
        let scheduler = PoolScheduler::new(4).unwrap();
        let counter = AtomicUsize::new(0);
        let jobs: Vec<Job<'_>> = (0..64)
            .map(|_| {
                let counter = &counter;
                Box::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }) as Job<'_>
            })
            .collect();

        assert_eq!(scheduler.run_batch("count", jobs), 64);
        assert_eq!(counter.load(Ordering::SeqCst), 64);
    }

    fn counting_jobs_with_panic(counter: &AtomicUsize) -> Vec<Job<'_>> {
        vec![
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }) as Job<'_>,
            Box::new(|| -> () { panic!("boom") }) as Job<'_>,
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }) as Job<'_>,
        ]
    }

    #[test]
    fn test_panicking_job_does_not_abort_batch() {
        let counter = AtomicUsize::new(0);

        assert_eq!(InlineScheduler.run_batch("panic", counting_jobs_with_panic(&counter)), 2);
        let pool = PoolScheduler::new(2).unwrap();
        assert_eq!(pool.run_batch("panic", counting_jobs_with_panic(&counter)), 2);
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_scheduler_selection() {
        assert!(!scheduler_for(false, 8).is_concurrent());
        assert!(!scheduler_for(true, 1).is_concurrent());
        assert!(scheduler_for(true, 2).is_concurrent());
    }
}
