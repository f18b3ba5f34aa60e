//! Bounded pool of worker threads for per-file operations.
//!
//! All jobs are queued up front on a request channel; `width` workers pull
//! from it and send `(index, result)` pairs back on a response channel.
//! `run_pool` returns only after every worker has finished, with results in
//! submission order.

use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex};
use std::thread;
use tracing::{debug, error};

/// A queued unit of work.
struct JobRequest<T> {
    index: usize,
    item: T,
}

/// Run `work` over `items` with at most `width` concurrent calls.
pub fn run_pool<T, R, F>(width: usize, items: Vec<T>, work: F) -> Vec<R>
where
    T: Send,
    R: Send,
    F: Fn(T) -> R + Sync,
{
    let total = items.len();
    if total == 0 {
        return Vec::new();
    }
    let width = width.clamp(1, total);

    let (request_tx, request_rx) = mpsc::channel::<JobRequest<T>>();
    for (index, item) in items.into_iter().enumerate() {
        // The receiver is alive until the scope below ends
        let _ = request_tx.send(JobRequest { index, item });
    }
    drop(request_tx);

    let request_rx = Arc::new(Mutex::new(request_rx));
    let (response_tx, response_rx) = mpsc::channel::<(usize, R)>();

    thread::scope(|scope| {
        for worker in 0..width {
            let request_rx = Arc::clone(&request_rx);
            let response_tx = response_tx.clone();
            let work = &work;

            scope.spawn(move || {
                debug!("Worker {} started", worker);
                while let Some(request) = next_request(&request_rx) {
                    let result = work(request.item);
                    if response_tx.send((request.index, result)).is_err() {
                        error!("Worker {} lost its response channel", worker);
                        break;
                    }
                }
                debug!("Worker {} shut down", worker);
            });
        }
    });
    drop(response_tx);

    let mut results: Vec<(usize, R)> = response_rx.into_iter().collect();
    results.sort_by_key(|(index, _)| *index);
    results.into_iter().map(|(_, result)| result).collect()
}

fn next_request<T>(request_rx: &Mutex<Receiver<JobRequest<T>>>) -> Option<JobRequest<T>> {
    let guard = match request_rx.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    guard.recv().ok()
}
