//! Lightweight worker pool for parsing input files in parallel.

use std::sync::{mpsc, Arc, Mutex};
use std::thread::{self, JoinHandle};

use tracing::warn;

use crate::common::error::{TrainError, TrainResult};

type Job = Box<dyn FnOnce() + Send + 'static>;

pub struct Pool {
    tx: Option<mpsc::Sender<Job>>,
    handles: Vec<JoinHandle<()>>,
}

impl Pool {
    pub fn new(size: usize) -> Self {
        let (tx, rx) = mpsc::channel::<Job>();
        let shared_rx = Arc::new(Mutex::new(rx));

        let handles = (0..size.max(1))
            .map(|_| {
                let rx = shared_rx.clone();
                thread::spawn(move || loop {
                    let job = match rx.lock() {
                        Ok(guard) => guard.recv(),
                        Err(_) => break,
                    };

                    match job {
                        Ok(job) => job(),
                        Err(_) => break,
                    }
                })
            })
            .collect();

        Self {
            tx: Some(tx),
            handles,
        }
    }

    pub fn submit<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Some(tx) = &self.tx {
            let _ = tx.send(Box::new(job));
        }
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        // Closing the channel lets every worker fall out of its loop.
        self.tx.take();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                warn!("parse worker panicked");
            }
        }
    }
}

/// Apply `parse` to every item on `threads` workers, preserving input order.
///
/// Fails when a chunk never comes back, e.g. because its job panicked.
pub fn map_chunks<T, R, F>(items: Vec<T>, threads: usize, parse: F) -> TrainResult<Vec<R>>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> R + Send + Sync + 'static,
{
    let threads = threads.max(1);
    let chunk_len = items.len().div_ceil(threads).max(1);
    let parse = Arc::new(parse);
    let (tx, rx) = mpsc::channel::<(usize, Vec<R>)>();

    let mut chunks = 0;
    {
        let pool = Pool::new(threads);
        let mut items = items.into_iter().peekable();
        while items.peek().is_some() {
            let chunk: Vec<T> = items.by_ref().take(chunk_len).collect();
            let tx = tx.clone();
            let parse = parse.clone();
            let idx = chunks;
            pool.submit(move || {
                let out = chunk.into_iter().map(|item| parse(item)).collect();
                let _ = tx.send((idx, out));
            });
            chunks += 1;
        }
    }
    drop(tx);

    let mut parts: Vec<(usize, Vec<R>)> = rx.iter().take(chunks).collect();
    if parts.len() != chunks {
        return Err(TrainError::training(format!(
            "{} of {chunks} parse chunks were lost",
            chunks - parts.len()
        )));
    }
    parts.sort_by_key(|(idx, _)| *idx);
    Ok(parts.into_iter().flat_map(|(_, out)| out).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserves_order_across_workers() {
        let items: Vec<u32> = (0..103).collect();
        let out = map_chunks(items, 4, |x| x * 2).unwrap();
        assert_eq!(out, (0..103).map(|x| x * 2).collect::<Vec<_>>());
    }

    #[test]
    fn empty_input_yields_nothing() {
        let out: Vec<u32> = map_chunks(Vec::<u32>::new(), 3, |x| x).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn panicking_job_is_reported() {
        let items: Vec<u32> = (0..40).collect();
        let err = map_chunks(items, 4, |x| {
            if x == 17 {
                panic!("bad record");
            }
            x
        })
        .unwrap_err();
        assert_eq!(err.code(), crate::common::error::ExitCode::Training);
    }

    #[test]
    fn dropping_pool_runs_pending_jobs() {
        let (tx, rx) = mpsc::channel();
        {
            let pool = Pool::new(2);
            for i in 0..10 {
                let tx = tx.clone();
                pool.submit(move || {
                    let _ = tx.send(i);
                });
            }
        }
        drop(tx);
        assert_eq!(rx.iter().count(), 10);
    }
}
