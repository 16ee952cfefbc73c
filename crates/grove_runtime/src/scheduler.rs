//! Cooperative job scheduling with depth-ordered draining of deferred values.
//!
//! Execution never recurses through the selection tree natively. Each
//! selection is a job on a FIFO queue; each deferred value is a job parked in
//! a bucket keyed by the depth of the result node it will write into. The
//! drain loop runs the queue to quiescence, then releases the shallowest
//! bucket, and repeats. Every deferred value at one depth is therefore
//! registered before any of them is forced, which lets a batch loader fetch
//! a whole level of the tree at once.

use crate::dataloader::BatchSource;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

/// A unit of work run against the host.
pub type Job<'a, H> = Box<dyn FnOnce(&mut H) + 'a>;

/// Job queue and depth buckets.
pub struct Scheduler<'a, H> {
    queue: VecDeque<Job<'a, H>>,
    lazies: BTreeMap<usize, Vec<Job<'a, H>>>,
    sources: Vec<Rc<dyn BatchSource>>,
}

impl<'a, H> Default for Scheduler<'a, H> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl<'a, H> Scheduler<'a, H> {
    /// Creates a scheduler that resets `sources` on [`Scheduler::clear_cache`].
    pub fn new(sources: Vec<Rc<dyn BatchSource>>) -> Self {
        Self {
            queue: VecDeque::new(),
            lazies: BTreeMap::new(),
            sources,
        }
    }

    /// Queues a job behind the already queued ones.
    pub fn append_job(&mut self, job: impl FnOnce(&mut H) + 'a) {
        self.queue.push_back(Box::new(job));
    }

    /// Parks a job until the bucket for `depth` is drained.
    pub fn defer(&mut self, depth: usize, job: impl FnOnce(&mut H) + 'a) {
        self.lazies.entry(depth).or_default().push(Box::new(job));
    }

    /// Clears the caches of every registered batch source.
    pub fn clear_cache(&self) {
        for source in &self.sources {
            source.clear_cache();
        }
    }

    pub fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.lazies.is_empty()
    }

    /// Number of jobs parked in depth buckets.
    pub fn pending_lazies(&self) -> usize {
        self.lazies.values().map(Vec::len).sum()
    }

    /// Drops every queued and parked job.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.lazies.clear();
    }

    fn next_job(&mut self) -> Option<Job<'a, H>> {
        self.queue.pop_front()
    }

    fn release_shallowest(&mut self) -> Option<usize> {
        let (depth, jobs) = self.lazies.pop_first()?;
        tracing::debug!(depth, lazies = jobs.len(), "forcing deferred values");
        self.queue.extend(jobs);
        Some(depth)
    }
}

/// The state jobs run against.
pub trait JobHost<'a>: Sized + 'a {
    fn scheduler(&mut self) -> &mut Scheduler<'a, Self>;

    /// Once true, remaining jobs are dropped without running.
    fn is_halted(&self) -> bool;
}

/// Runs queued jobs, including the ones they enqueue, until the queue is
/// empty. Parked jobs stay parked.
pub fn run<'a, H: JobHost<'a>>(host: &mut H) {
    loop {
        if host.is_halted() {
            host.scheduler().clear();
            return;
        }
        let Some(job) = host.scheduler().next_job() else {
            return;
        };
        job(host);
    }
}

/// Runs the queue to quiescence, then releases parked jobs one depth at a
/// time, shallowest first, until nothing is left.
pub fn drain_by_depth<'a, H: JobHost<'a>>(host: &mut H) {
    loop {
        run(host);
        if host.is_halted() || host.scheduler().release_shallowest().is_none() {
            return;
        }
    }
}

/// Runs `job` and everything it causes, including parked jobs, before
/// returning to the work that was pending when it was called.
pub fn run_isolated<'a, H: JobHost<'a>>(host: &mut H, job: impl FnOnce(&mut H) + 'a) {
    let scheduler = host.scheduler();
    let queue = std::mem::take(&mut scheduler.queue);
    let lazies = std::mem::take(&mut scheduler.lazies);
    scheduler.append_job(job);
    drain_by_depth(host);
    // A halt drops the saved work along with everything else.
    if !host.is_halted() {
        let scheduler = host.scheduler();
        scheduler.queue = queue;
        scheduler.lazies = lazies;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Default)]
    struct Host {
        log: Vec<String>,
        halted: bool,
        scheduler: Scheduler<'static, Host>,
    }

    impl JobHost<'static> for Host {
        fn scheduler(&mut self) -> &mut Scheduler<'static, Self> {
            &mut self.scheduler
        }

        fn is_halted(&self) -> bool {
            self.halted
        }
    }

    #[test]
    fn test_run_is_fifo() {
        let mut host = Host::default();
        host.scheduler.append_job(|h: &mut Host| {
            h.log.push("a".into());
            h.scheduler.append_job(|h: &mut Host| h.log.push("c".into()));
        });
        host.scheduler.append_job(|h: &mut Host| h.log.push("b".into()));
        run(&mut host);
        assert_eq!(host.log, ["a", "b", "c"]);
        assert!(host.scheduler.is_idle());
    }

    #[test]
    fn test_drain_releases_shallowest_first() {
        let mut host = Host::default();
        host.scheduler.defer(3, |h: &mut Host| h.log.push("depth 3".into()));
        host.scheduler.defer(2, |h: &mut Host| {
            h.log.push("depth 2".into());
            // Re-registering at the same depth runs before deeper buckets.
            h.scheduler.defer(2, |h: &mut Host| h.log.push("depth 2 again".into()));
        });
        host.scheduler.append_job(|h: &mut Host| h.log.push("queued".into()));
        assert_eq!(host.scheduler.pending_lazies(), 2);

        drain_by_depth(&mut host);
        assert_eq!(host.log, ["queued", "depth 2", "depth 2 again", "depth 3"]);
    }

    #[test]
    fn test_run_isolated_finishes_before_pending_work() {
        let mut host = Host::default();
        host.scheduler.append_job(|h: &mut Host| h.log.push("outer".into()));
        host.scheduler.defer(1, |h: &mut Host| h.log.push("outer lazy".into()));

        run_isolated(&mut host, |h: &mut Host| {
            h.log.push("isolated".into());
            h.scheduler.defer(4, |h: &mut Host| h.log.push("isolated lazy".into()));
        });
        assert_eq!(host.log, ["isolated", "isolated lazy"]);

        drain_by_depth(&mut host);
        assert_eq!(host.log, ["isolated", "isolated lazy", "outer", "outer lazy"]);
    }

    #[test]
    fn test_halt_drops_remaining_jobs() {
        let mut host = Host::default();
        host.scheduler.append_job(|h: &mut Host| h.halted = true);
        host.scheduler.append_job(|h: &mut Host| h.log.push("never".into()));
        host.scheduler.defer(1, |h: &mut Host| h.log.push("never".into()));
        drain_by_depth(&mut host);
        assert!(host.log.is_empty());
        assert!(host.scheduler.is_idle());
    }

    struct Counting(Rc<Cell<usize>>);

    impl BatchSource for Counting {
        fn clear_cache(&self) {
            self.0.set(self.0.get() + 1);
        }

        fn pending(&self) -> usize {
            0
        }
    }

    #[test]
    fn test_clear_cache_resets_sources() {
        let cleared = Rc::new(Cell::new(0));
        let scheduler: Scheduler<'static, Host> =
            Scheduler::new(vec![Rc::new(Counting(Rc::clone(&cleared)))]);
        scheduler.clear_cache();
        scheduler.clear_cache();
        assert_eq!(cleared.get(), 2);
    }
}
