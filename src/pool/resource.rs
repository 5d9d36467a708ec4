//! # Pool de Recursos Acotado
//! src/pool/resource.rs
//!
//! Lista libre de handles protegida por mutex y contada por un semáforo
//! inicializado a la capacidad. El pool agotado no es un error: `acquire`
//! bloquea hasta que otro thread devuelva un handle, lo que limita la carga
//! sobre el backend a la capacidad fija del pool.

use super::semaphore::Semaphore;
use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::Mutex;

pub struct ResourcePool<R> {
    free: Mutex<VecDeque<R>>,
    sem: Semaphore,
    capacity: usize,
}

impl<R> ResourcePool<R> {
    /// Crea el pool con todos los handles libres
    pub fn new(resources: Vec<R>) -> Self {
        let capacity = resources.len();
        Self {
            free: Mutex::new(resources.into_iter().collect()),
            sem: Semaphore::new(capacity),
            capacity,
        }
    }

    /// Toma un handle, bloqueando mientras no haya ninguno libre
    pub fn acquire(&self) -> R {
        loop {
            self.sem.wait();
            if let Some(resource) = self.lock_free().pop_front() {
                return resource;
            }
        }
    }

    /// Devuelve un handle al pool
    pub fn release(&self, resource: R) {
        {
            let mut free = self.lock_free();
            debug_assert!(free.len() < self.capacity, "pool release over capacity");
            free.push_back(resource);
        }
        self.sem.post();
    }

    /// Préstamo con alcance: el handle vuelve al pool al soltar el `Lease`
    pub fn lease(&self) -> Lease<'_, R> {
        Lease {
            pool: self,
            resource: Some(self.acquire()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn free_count(&self) -> usize {
        self.lock_free().len()
    }

    pub fn in_use(&self) -> usize {
        self.capacity - self.free_count()
    }

    fn lock_free(&self) -> std::sync::MutexGuard<'_, VecDeque<R>> {
        self.free.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Handle prestado por un `ResourcePool`
pub struct Lease<'a, R> {
    pool: &'a ResourcePool<R>,
    resource: Option<R>,
}

impl<R> Deref for Lease<'_, R> {
    type Target = R;

    fn deref(&self) -> &R {
        // Solo es None dentro de drop
        match &self.resource {
            Some(r) => r,
            None => unreachable!("lease used after release"),
        }
    }
}

impl<R> DerefMut for Lease<'_, R> {
    fn deref_mut(&mut self) -> &mut R {
        match &mut self.resource {
            Some(r) => r,
            None => unreachable!("lease used after release"),
        }
    }
}

impl<R> Drop for Lease<'_, R> {
    fn drop(&mut self) {
        if let Some(resource) = self.resource.take() {
            self.pool.release(resource);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_acquire_release_counts() {
        let pool = ResourcePool::new(vec![1, 2, 3]);
        assert_eq!(pool.capacity(), 3);
        assert_eq!(pool.free_count(), 3);

        let a = pool.acquire();
        let b = pool.acquire();
        assert_ne!(a, b);
        assert_eq!(pool.in_use(), 2);
        assert_eq!(pool.free_count() + pool.in_use(), pool.capacity());

        pool.release(a);
        pool.release(b);
        assert_eq!(pool.free_count(), 3);
    }

    #[test]
    fn test_lease_releases_on_early_return() {
        fn fails(pool: &ResourcePool<String>) -> Result<(), String> {
            let conn = pool.lease();
            if conn.starts_with("db") {
                return Err("early".to_string());
            }
            Ok(())
        }

        let pool = ResourcePool::new(vec!["db-0".to_string()]);
        assert!(fails(&pool).is_err());
        assert_eq!(pool.free_count(), 1);

        let mut lease = pool.lease();
        lease.push_str("-touched");
        drop(lease);
        assert_eq!(pool.acquire(), "db-0-touched");
    }

    #[test]
    fn test_exhausted_pool_blocks_until_release() {
        let pool = Arc::new(ResourcePool::new(vec![0u8]));
        let held = pool.acquire();

        let acquired = Arc::new(AtomicUsize::new(0));
        let waiter = {
            let pool = Arc::clone(&pool);
            let acquired = Arc::clone(&acquired);
            thread::spawn(move || {
                let _lease = pool.lease();
                acquired.fetch_add(1, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert_eq!(acquired.load(Ordering::SeqCst), 0);

        pool.release(held);
        waiter.join().unwrap();
        assert_eq!(acquired.load(Ordering::SeqCst), 1);
        assert_eq!(pool.free_count(), 1);
    }

    #[test]
    fn test_no_handle_leased_twice() {
        let pool = Arc::new(ResourcePool::new((0..4).collect::<Vec<u32>>()));
        let leased = Arc::new(std::sync::Mutex::new(HashSet::new()));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let pool = Arc::clone(&pool);
                let leased = Arc::clone(&leased);
                thread::spawn(move || {
                    for _ in 0..200 {
                        let lease = pool.lease();
                        assert!(leased.lock().unwrap().insert(*lease), "handle leased twice");
                        assert!(pool.in_use() <= pool.capacity());
                        leased.lock().unwrap().remove(&*lease);
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(pool.free_count(), pool.capacity());
    }
}
