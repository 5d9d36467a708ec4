//! # Pool de Threads
//! src/threadpool/mod.rs
//!
//! N workers de larga vida drenando una cola FIFO acotada. La cola se
//! protege con un mutex y se cuenta con un semáforo; `append` nunca bloquea
//! al thread del reactor: con la cola llena simplemente rechaza la tarea.
//!
//! Cada worker toma un préstamo del `ResourcePool` mientras procesa una
//! tarea y lo devuelve siempre, también si la tarea entra en pánico.

use crate::error::{Result, ServerError};
use crate::pool::{ResourcePool, Semaphore};
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

/// Unidad de trabajo ejecutada por un worker con un recurso prestado
pub trait Task: Send + 'static {
    type Resource: Send + 'static;

    fn run(self, resource: &mut Self::Resource);
}

struct Shared<T: Task> {
    queue: Mutex<VecDeque<T>>,
    queued: Semaphore,
    stop: AtomicBool,
    resources: Arc<ResourcePool<T::Resource>>,
}

pub struct ThreadPool<T: Task> {
    shared: Arc<Shared<T>>,
    workers: Vec<JoinHandle<()>>,
    max_requests: usize,
}

impl<T: Task> ThreadPool<T> {
    /// Arranca `threads` workers con una cola de como mucho `max_requests`
    pub fn new(
        threads: usize,
        max_requests: usize,
        resources: Arc<ResourcePool<T::Resource>>,
    ) -> Result<Self> {
        if threads == 0 || max_requests == 0 {
            return Err(ServerError::Config(
                "thread pool needs at least one thread and one queue slot".to_string(),
            ));
        }

        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            queued: Semaphore::new(0),
            stop: AtomicBool::new(false),
            resources,
        });

        let mut pool = Self {
            shared,
            workers: Vec::with_capacity(threads),
            max_requests,
        };

        for id in 0..threads {
            let shared = Arc::clone(&pool.shared);
            let handle = thread::Builder::new()
                .name(format!("worker-{}", id))
                .spawn(move || worker_loop(id, shared))?;
            pool.workers.push(handle);
        }

        tracing::debug!(threads, max_requests, "thread pool started");
        Ok(pool)
    }

    /// Encola una tarea. Retorna `false` sin bloquear si la cola está llena.
    pub fn append(&self, task: T) -> bool {
        {
            let mut queue = self.shared.queue.lock().unwrap_or_else(|e| e.into_inner());
            if queue.len() >= self.max_requests {
                return false;
            }
            queue.push_back(task);
        }
        self.shared.queued.post();
        true
    }

    /// Tareas en cola aún no tomadas por un worker
    pub fn pending(&self) -> usize {
        self.shared.queue.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn threads(&self) -> usize {
        self.workers.len()
    }

    pub fn max_requests(&self) -> usize {
        self.max_requests
    }
}

fn worker_loop<T: Task>(id: usize, shared: Arc<Shared<T>>) {
    tracing::trace!(worker = id, "worker started");
    loop {
        shared.queued.wait();
        if shared.stop.load(Ordering::Acquire) {
            break;
        }

        let task = shared.queue.lock().unwrap_or_else(|e| e.into_inner()).pop_front();
        let Some(task) = task else {
            continue;
        };

        let mut lease = shared.resources.lease();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| task.run(&mut lease)));
        drop(lease);

        if outcome.is_err() {
            tracing::error!(worker = id, "task panicked, worker keeps running");
        }
    }
    tracing::trace!(worker = id, "worker stopped");
}

impl<T: Task> Drop for ThreadPool<T> {
    fn drop(&mut self) {
        self.shared.stop.store(true, Ordering::Release);
        self.shared.queued.post_many(self.workers.len());
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}
