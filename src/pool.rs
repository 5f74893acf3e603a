
//! A pool of worker threads for per-tile jobs.
//!
//! Jobs are independent closures, one per tile. Results come back indexed
//! by the position of the job in the submitted batch, no matter in which
//! order the workers finish. A pool created with one thread runs every job
//! inline on the calling thread and produces bit-identical results to any
//! other thread count.

use crate::error::{Error, Result};


/// Upper bound of worker threads, including autodetected counts.
pub const MAX_THREADS: usize = 64;


pub struct TilePool {
    threads: usize,
    workers: Option<threadpool::ThreadPool>,
}

impl TilePool {

    /// Create a pool with the given number of worker threads.
    /// Zero selects the available hardware parallelism.
    /// The count is capped at [`MAX_THREADS`].
    pub fn new(threads: usize) -> Self {
        let threads = match threads {
            0 => std::thread::available_parallelism().map(|count| count.get()).unwrap_or(1),
            count => count,
        }.min(MAX_THREADS);

        TilePool {
            threads,
            workers: if threads > 1 { Some(threadpool::ThreadPool::new(threads)) } else { None },
        }
    }

    pub fn thread_count(&self) -> usize { self.threads }

    /// Run all jobs and return their results in submission order.
    /// Returns only after every job has finished. A failing job
    /// never disturbs the result of any other job.
    pub fn process<T, Job>(&self, jobs: Vec<Job>) -> Vec<Result<T>>
        where T: Send + 'static, Job: FnOnce() -> Result<T> + Send + 'static
    {
        match &self.workers {
            None => jobs.into_iter().map(|job| job()).collect(),

            Some(workers) => {
                let (sender, receiver) = flume::unbounded();

                let job_count = jobs.len();
                for (index, job) in jobs.into_iter().enumerate() {
                    let sender = sender.clone();
                    workers.execute(move || { let _ = sender.send((index, job())); });
                }

                drop(sender);

                let mut results: Vec<Option<Result<T>>> =
                    (0 .. job_count).map(|_| None).collect();

                // the channel closes when the last worker is done
                for (index, result) in receiver.iter() {
                    results[index] = Some(result);
                }

                results.into_iter()
                    .map(|slot| slot.unwrap_or_else(|| Err(Error::invalid("a tile worker vanished"))))
                    .collect()
            },
        }
    }
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn results_keep_submission_order(){
        let pool = TilePool::new(8);

        let jobs: Vec<_> = (0 .. 100_usize).map(|index| move || {
            // make late indices finish first
            std::thread::sleep(std::time::Duration::from_micros((100 - index as u64) * 10));
            Ok(index)
        }).collect();

        let results = pool.process(jobs);
        for (index, result) in results.into_iter().enumerate() {
            assert_eq!(result.unwrap(), index);
        }
    }

    #[test]
    fn inline_and_threaded_agree(){
        let make_jobs = || (0 .. 50_u32)
            .map(|index| move || Ok(index.wrapping_mul(2654435761)))
            .collect::<Vec<_>>();

        let inline: Vec<_> = TilePool::new(1).process(make_jobs())
            .into_iter().map(|result| result.unwrap()).collect();

        let threaded: Vec<_> = TilePool::new(8).process(make_jobs())
            .into_iter().map(|result| result.unwrap()).collect();

        assert_eq!(inline, threaded);
    }

    #[test]
    fn one_failure_leaves_other_results_alone(){
        let pool = TilePool::new(4);

        let jobs: Vec<_> = (0 .. 10_usize).map(|index| move || {
            if index == 3 { Err(Error::invalid("broken tile")) } else { Ok(index) }
        }).collect();

        let results = pool.process(jobs);
        assert!(results[3].is_err());

        for (index, result) in results.into_iter().enumerate() {
            if index != 3 { assert_eq!(result.unwrap(), index); }
        }
    }

    #[test]
    fn zero_threads_autodetects(){
        let pool = TilePool::new(0);
        assert!(pool.thread_count() >= 1);
        assert!(pool.thread_count() <= MAX_THREADS);
    }
}
