// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Execution backends for admitted jobs.
//!
//! The scheduler is written once against [`Executor`]; the backend only
//! decides which OS thread a blocking job runs on.

use crossbeam_channel::{Receiver, Sender};
use std::thread::{self, JoinHandle};
use tessera_core::ExecutorKind;
use thiserror::Error;

/// A unit of blocking work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Failure to hand a task to an executor.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// An OS thread could not be started.
    #[error("failed to start thread: {0}")]
    Spawn(#[from] std::io::Error),
    /// The executor has already been joined.
    #[error("executor is shut down")]
    ShutDown,
}

/// Runs blocking tasks somewhere other than the calling thread.
pub trait Executor: Send {
    /// Queues a task. Tasks start in submission order.
    fn execute(&mut self, task: Task) -> Result<(), ExecutorError>;

    /// Waits for every submitted task to finish. No tasks may be submitted
    /// afterwards.
    fn join(&mut self);
}

/// A fixed pool of worker threads fed from a FIFO queue.
pub struct WorkerPool {
    queue: Option<Sender<Task>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Starts `size` worker threads (at least one).
    pub fn new(size: usize) -> Result<Self, ExecutorError> {
        let (queue, tasks) = crossbeam_channel::unbounded::<Task>();
        let mut pool = Self {
            queue: Some(queue),
            workers: Vec::with_capacity(size.max(1)),
        };
        for index in 0..size.max(1) {
            let tasks: Receiver<Task> = tasks.clone();
            let worker = thread::Builder::new()
                .name(format!("tessera-worker-{index}"))
                .spawn(move || {
                    for task in tasks.iter() {
                        task();
                    }
                })?;
            pool.workers.push(worker);
        }
        log::debug!("Worker pool started with {} threads", pool.workers.len());
        Ok(pool)
    }
}

impl Executor for WorkerPool {
    fn execute(&mut self, task: Task) -> Result<(), ExecutorError> {
        let queue = self.queue.as_ref().ok_or(ExecutorError::ShutDown)?;
        queue.send(task).map_err(|_| ExecutorError::ShutDown)
    }

    fn join(&mut self) {
        self.queue.take();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                log::error!("A worker thread panicked");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.join();
    }
}

/// One dedicated thread per submitted task.
///
/// Tasks park on the admission gate rather than in a queue, so the number of
/// threads follows the number of dispatched jobs while the gate bounds how
/// many do real work.
#[derive(Default)]
pub struct ThreadPerJob {
    threads: Vec<JoinHandle<()>>,
    shut_down: bool,
}

impl ThreadPerJob {
    /// Creates an executor with no threads yet.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Executor for ThreadPerJob {
    fn execute(&mut self, task: Task) -> Result<(), ExecutorError> {
        if self.shut_down {
            return Err(ExecutorError::ShutDown);
        }
        let handle = thread::Builder::new()
            .name(format!("tessera-job-{}", self.threads.len()))
            .spawn(task)?;
        self.threads.push(handle);
        Ok(())
    }

    fn join(&mut self) {
        self.shut_down = true;
        for thread in self.threads.drain(..) {
            if thread.join().is_err() {
                log::error!("A job thread panicked");
            }
        }
    }
}

impl Drop for ThreadPerJob {
    fn drop(&mut self) {
        self.join();
    }
}

/// Builds the executor for a scheduling model.
pub fn executor_for(kind: ExecutorKind, workers: usize) -> Result<Box<dyn Executor>, ExecutorError> {
    Ok(match kind {
        ExecutorKind::Pool => Box::new(WorkerPool::new(workers)?),
        ExecutorKind::Threads => Box::new(ThreadPerJob::new()),
    })
}
