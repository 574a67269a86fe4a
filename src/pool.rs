use rayon::prelude::*;

/// Order-preserving parallel map over independent work items.
///
/// The pool holds no state between calls, so one pool may serve any number
/// of concurrent solves.
pub trait WorkerPool {
    fn run<I, O, F>(&self, items: Vec<I>, work: F) -> Vec<O>
    where
        I: Send,
        O: Send,
        F: Fn(I) -> O + Sync + Send;
}

/// Runs every item on the calling thread.
pub struct Serial;

impl WorkerPool for Serial {
    fn run<I, O, F>(&self, items: Vec<I>, work: F) -> Vec<O>
    where
        I: Send,
        O: Send,
        F: Fn(I) -> O + Sync + Send,
    {
        items.into_iter().map(work).collect()
    }
}

/// Fans items out over rayon worker threads.
pub struct Threaded {
    pool: Option<rayon::ThreadPool>,
}

impl Threaded {
    /// Uses the global rayon pool.
    pub fn new() -> Self {
        Self { pool: None }
    }

    /// Uses a dedicated pool with the given thread count.
    pub fn with_threads(threads: usize) -> Result<Self, rayon::ThreadPoolBuildError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()?;

        Ok(Self { pool: Some(pool) })
    }
}

impl Default for Threaded {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerPool for Threaded {
    fn run<I, O, F>(&self, items: Vec<I>, work: F) -> Vec<O>
    where
        I: Send,
        O: Send,
        F: Fn(I) -> O + Sync + Send,
    {
        match &self.pool {
            Some(pool) => pool.install(|| items.into_par_iter().map(&work).collect()),
            None => items.into_par_iter().map(&work).collect(),
        }
    }
}
