//! A dedicated event-loop thread driven by posted tasks.
//!
//! This is the crate-provided realization of the [`Dispatcher`] contract:
//! one named thread draining a channel of [`LoopTask`]s in post order. A
//! real server embeds its own loop and implements [`Dispatcher`] on it; the
//! integration tests and small deployments use this one.

use std::thread;

use crate::error::Error;
use crate::handler::{Dispatcher, LoopTask};

enum Msg {
    Run(LoopTask),
    Stop,
}

/// Cheap handle for posting tasks to a [`LoopThread`].
#[derive(Clone)]
pub struct LoopHandle {
    tx: crossbeam_channel::Sender<Msg>,
}

impl Dispatcher for LoopHandle {
    fn post(&self, task: LoopTask) -> Result<(), Error> {
        self.tx
            .send(Msg::Run(task))
            .map_err(|_| Error::LoopUnavailable)
    }
}

/// Owner of the loop thread. Tasks run in post order; the first task error
/// stops the loop and surfaces from [`join`](Self::join).
pub struct LoopThread {
    handle: LoopHandle,
    join: thread::JoinHandle<Result<(), Error>>,
}

impl LoopThread {
    /// Spawn the loop thread.
    pub fn spawn() -> Result<Self, Error> {
        let (tx, rx) = crossbeam_channel::unbounded::<Msg>();
        let join = thread::Builder::new()
            .name("flowline-loop".to_string())
            .spawn(move || run(rx))
            .map_err(Error::Io)?;
        Ok(LoopThread {
            handle: LoopHandle { tx },
            join,
        })
    }

    /// Get a posting handle.
    pub fn handle(&self) -> LoopHandle {
        self.handle.clone()
    }

    /// Stop after all already-posted tasks have run and return the loop's
    /// result.
    pub fn join(self) -> Result<(), Error> {
        // Ignore send failure: the loop already stopped on a task error.
        let _ = self.handle.tx.send(Msg::Stop);
        match self.join.join() {
            Ok(result) => result,
            Err(_) => Err(Error::LoopPanicked),
        }
    }
}

fn run(rx: crossbeam_channel::Receiver<Msg>) -> Result<(), Error> {
    for msg in rx.iter() {
        match msg {
            Msg::Run(task) => task()?,
            Msg::Stop => break,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn tasks_run_in_post_order() {
        let lt = LoopThread::spawn().unwrap();
        let handle = lt.handle();
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

        for i in 0..10 {
            let order = order.clone();
            handle
                .post(Box::new(move || {
                    order.lock().push(i);
                    Ok(())
                }))
                .unwrap();
        }
        lt.join().unwrap();
        assert_eq!(*order.lock(), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn task_error_stops_loop() {
        let lt = LoopThread::spawn().unwrap();
        let handle = lt.handle();
        let ran = Arc::new(AtomicU32::new(0));

        let r = ran.clone();
        handle
            .post(Box::new(move || {
                r.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }))
            .unwrap();
        handle
            .post(Box::new(|| Err(Error::Submit("boom".into()))))
            .unwrap();
        let r = ran.clone();
        handle
            .post(Box::new(move || {
                r.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }))
            .unwrap();

        match lt.join() {
            Err(Error::Submit(msg)) => assert_eq!(msg, "boom"),
            other => panic!("unexpected join result: {other:?}"),
        }
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn post_after_join_fails() {
        let lt = LoopThread::spawn().unwrap();
        let handle = lt.handle();
        lt.join().unwrap();

        match handle.post(Box::new(|| Ok(()))) {
            Err(Error::LoopUnavailable) => {}
            other => panic!("unexpected post result: {other:?}"),
        }
    }
}
