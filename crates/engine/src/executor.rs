//! Where deferred work runs.
//!
//! The engine never spawns threads itself. Work such as a COW reset pipeline
//! is handed to an [`Executor`] chosen by the application.

/// Runs jobs, possibly on another thread.
pub trait Executor {
    fn execute<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static;
}

/// Runs every job on the calling thread before returning.
#[derive(Clone, Copy, Debug, Default)]
pub struct Immediate;

impl Executor for Immediate {
    fn execute<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        job();
    }
}

impl Executor for rayon::ThreadPool {
    fn execute<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.spawn(job);
    }
}
