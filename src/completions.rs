//! Worker pool for producer promise completions.
//!
//! Promise completions run off the loop thread: a woken producer may call
//! `write_async` again, and doing that inline would re-enter the output lock
//! on the loop thread.

use std::thread;

use crate::config::Config;
use crate::error::Error;
use crate::handler::{CompletionTask, Completions};

/// Pool of named worker threads draining completion tasks.
pub struct CompletionPool {
    tx: Option<crossbeam_channel::Sender<CompletionTask>>,
    workers: Vec<thread::JoinHandle<()>>,
}

impl CompletionPool {
    /// Spawn `config.completion_threads` workers.
    pub fn new(config: &Config) -> Result<Self, Error> {
        config.validate()?;
        let (tx, rx) = crossbeam_channel::unbounded::<CompletionTask>();
        let mut workers = Vec::with_capacity(config.completion_threads);
        for i in 0..config.completion_threads {
            let rx = rx.clone();
            let worker = thread::Builder::new()
                .name(format!("flowline-completion-{i}"))
                .spawn(move || {
                    for task in rx.iter() {
                        task();
                    }
                })
                .map_err(Error::Io)?;
            workers.push(worker);
        }
        Ok(CompletionPool {
            tx: Some(tx),
            workers,
        })
    }
}

impl Completions for CompletionPool {
    fn dispatch(&self, task: CompletionTask) {
        match &self.tx {
            Some(tx) => {
                if let Err(e) = tx.send(task) {
                    // Workers are gone (pool shutting down); run inline so
                    // the promise still resolves. Re-entrancy is moot here.
                    e.into_inner()();
                }
            }
            None => task(),
        }
    }
}

impl Drop for CompletionPool {
    fn drop(&mut self) {
        self.tx.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn pool(threads: usize) -> CompletionPool {
        CompletionPool::new(&Config {
            completion_threads: threads,
            ..Config::default()
        })
        .unwrap()
    }

    #[test]
    fn dispatched_tasks_run() {
        let pool = pool(2);
        let count = Arc::new(AtomicU32::new(0));

        for _ in 0..100 {
            let count = count.clone();
            pool.dispatch(Box::new(move || {
                count.fetch_add(1, Ordering::SeqCst);
            }));
        }

        drop(pool); // joins workers
        assert_eq!(count.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn tasks_run_off_caller_thread() {
        let pool = pool(1);
        let caller = thread::current().id();
        let (tx, rx) = crossbeam_channel::bounded(1);

        pool.dispatch(Box::new(move || {
            tx.send(thread::current().id()).unwrap();
        }));

        let worker = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_ne!(worker, caller);
    }

    #[test]
    fn invalid_config_rejected() {
        let config = Config {
            completion_threads: 0,
            ..Config::default()
        };
        assert!(CompletionPool::new(&config).is_err());
    }
}
