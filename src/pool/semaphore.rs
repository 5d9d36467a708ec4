//! # Semáforo Contador
//! src/pool/semaphore.rs

use std::sync::{Condvar, Mutex};

/// Semáforo contador sobre `Mutex` + `Condvar`
pub struct Semaphore {
    permits: Mutex<usize>,
    condvar: Condvar,
}

impl Semaphore {
    pub fn new(permits: usize) -> Self {
        Self {
            permits: Mutex::new(permits),
            condvar: Condvar::new(),
        }
    }

    /// Bloquea hasta obtener un permiso
    pub fn wait(&self) {
        let mut permits = self.permits.lock().unwrap_or_else(|e| e.into_inner());
        while *permits == 0 {
            permits = self.condvar.wait(permits).unwrap_or_else(|e| e.into_inner());
        }
        *permits -= 1;
    }

    /// Devuelve un permiso y despierta a un thread en espera
    pub fn post(&self) {
        let mut permits = self.permits.lock().unwrap_or_else(|e| e.into_inner());
        *permits += 1;
        self.condvar.notify_one();
    }

    /// Despierta a todos los que esperan, sumando `n` permisos
    pub fn post_many(&self, n: usize) {
        let mut permits = self.permits.lock().unwrap_or_else(|e| e.into_inner());
        *permits += n;
        self.condvar.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn spawn_waiter(sem: &Arc<Semaphore>) -> mpsc::Receiver<()> {
        let (tx, rx) = mpsc::channel();
        let sem = Arc::clone(sem);
        thread::spawn(move || {
            sem.wait();
            let _ = tx.send(());
        });
        rx
    }

    #[test]
    fn test_wait_blocks_without_permits() {
        let sem = Arc::new(Semaphore::new(2));
        sem.wait();
        sem.wait();

        let done = spawn_waiter(&sem);
        assert!(done.recv_timeout(Duration::from_millis(50)).is_err());
        sem.post();
        assert!(done.recv_timeout(Duration::from_secs(1)).is_ok());
    }

    #[test]
    fn test_post_many_wakes_all() {
        let sem = Arc::new(Semaphore::new(0));
        let waiters: Vec<_> = (0..3).map(|_| spawn_waiter(&sem)).collect();
        thread::sleep(Duration::from_millis(20));
        sem.post_many(3);
        for done in waiters {
            assert!(done.recv_timeout(Duration::from_secs(1)).is_ok());
        }
    }
}
