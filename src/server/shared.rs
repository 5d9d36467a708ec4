//! # Estado Compartido de Conexiones
//! src/server/shared.rs
//!
//! Tabla de slots indexada por descriptor, compartida entre el reactor,
//! los workers y los callbacks de los timers. Cada slot lleva un número de
//! generación que cambia en cada `open`: una tarea o un timer que apunta a
//! una generación vieja no puede tocar a la conexión que reutiliza el fd.

use crate::db::DbConnection;
use crate::error::{Result, ServerError};
use crate::http::{HttpConn, ProcessOutcome, Site};
use crate::metrics::{CloseReason, MetricsCollector};
use crate::sys::{Epoll, Interest};
use crate::threadpool::Task;
use std::io;
use std::net::{SocketAddr, TcpStream};
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
pub struct ConnSlot {
    pub generation: u64,
    pub conn: HttpConn,
}

pub struct ConnShared {
    slots: Vec<Mutex<ConnSlot>>,
    epoll: Epoll,
    /// Conexiones vivas
    live: AtomicUsize,
    site: Site,
    metrics: MetricsCollector,
}

impl ConnShared {
    pub fn new(max_fds: usize, epoll: Epoll, site: Site, metrics: MetricsCollector) -> Self {
        let slots = (0..max_fds).map(|_| Mutex::new(ConnSlot::default())).collect();
        Self {
            slots,
            epoll,
            live: AtomicUsize::new(0),
            site,
            metrics,
        }
    }

    /// Tamaño de la tabla de slots
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn live_count(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    pub fn epoll(&self) -> &Epoll {
        &self.epoll
    }

    pub fn site(&self) -> &Site {
        &self.site
    }

    pub fn slot(&self, fd: RawFd) -> Option<MutexGuard<'_, ConnSlot>> {
        let index = usize::try_from(fd).ok()?;
        let slot = self.slots.get(index)?;
        Some(slot.lock().unwrap_or_else(|e| e.into_inner()))
    }

    /// Inicializa el slot de `fd` y lo registra para lectura one-shot.
    ///
    /// Retorna la generación asignada.
    pub fn open(&self, fd: RawFd, stream: TcpStream, peer: SocketAddr) -> Result<u64> {
        let Some(mut slot) = self.slot(fd) else {
            return Err(ServerError::SlotTableFull);
        };

        slot.generation += 1;
        slot.conn.init(stream, peer);
        if let Err(e) = self.epoll.add_oneshot(fd, fd as u64, Interest::Read) {
            slot.conn.close();
            return Err(e.into());
        }

        self.live.fetch_add(1, Ordering::AcqRel);
        self.metrics.record_accept();
        Ok(slot.generation)
    }

    /// Cierra la conexión de `fd`. Con `generation`, solo si el slot sigue
    /// perteneciendo a esa conexión.
    ///
    /// Retorna `true` si la conexión estaba viva y se cerró.
    pub fn close(&self, fd: RawFd, generation: Option<u64>, reason: CloseReason) -> bool {
        let Some(mut slot) = self.slot(fd) else {
            return false;
        };
        if generation.is_some_and(|g| g != slot.generation) || !slot.conn.is_live() {
            return false;
        }

        if let Err(e) = self.epoll.delete(fd) {
            tracing::warn!(fd, error = %e, "epoll delete failed");
        }
        slot.conn.close();
        self.live.fetch_sub(1, Ordering::AcqRel);
        self.metrics.record_close(reason);
        tracing::debug!(fd, ?reason, live = self.live_count(), "connection closed");
        true
    }

    pub fn rearm(&self, fd: RawFd, interest: Interest) -> io::Result<()> {
        self.epoll.rearm(fd, fd as u64, interest)
    }
}

/// Tarea encolada por el reactor: procesar el request de un slot
pub struct ConnTask {
    shared: Arc<ConnShared>,
    fd: RawFd,
    generation: u64,
}

impl ConnTask {
    pub fn new(shared: Arc<ConnShared>, fd: RawFd, generation: u64) -> Self {
        Self {
            shared,
            fd,
            generation,
        }
    }
}

impl Task for ConnTask {
    type Resource = DbConnection;

    fn run(self, db: &mut DbConnection) {
        let Some(mut slot) = self.shared.slot(self.fd) else {
            return;
        };
        if slot.generation != self.generation || !slot.conn.is_live() {
            tracing::trace!(fd = self.fd, "stale task skipped");
            return;
        }

        let interest = match slot.conn.process(self.shared.site(), db) {
            ProcessOutcome::NeedInput => Interest::Read,
            ProcessOutcome::ReadyToWrite => Interest::Write,
            ProcessOutcome::Abort => {
                // El cierre lo hace el reactor al ver el hang-up
                tracing::warn!(fd = self.fd, "could not build response, shutting socket down");
                slot.conn.shutdown();
                Interest::Read
            }
        };

        if let Err(e) = self.shared.rearm(self.fd, interest) {
            tracing::warn!(fd = self.fd, error = %e, "rearm failed");
            slot.conn.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::CredentialStore;
    use std::net::TcpListener;

    fn shared(max_fds: usize) -> ConnShared {
        let site = Site::new("/nonexistent", Arc::new(CredentialStore::new()));
        ConnShared::new(max_fds, Epoll::new().unwrap(), site, MetricsCollector::new())
    }

    fn pair() -> (TcpStream, TcpStream, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, peer) = listener.accept().unwrap();
        (client, server, peer)
    }

    #[test]
    fn test_open_close_with_generation() {
        use std::os::unix::io::AsRawFd;

        let shared = shared(4096);
        let (_client, server, peer) = pair();
        let fd = server.as_raw_fd();

        let generation = shared.open(fd, server, peer).unwrap();
        assert_eq!(shared.live_count(), 1);

        // Generación vieja: no cierra
        assert!(!shared.close(fd, Some(generation + 1), CloseReason::Idle));
        assert_eq!(shared.live_count(), 1);

        assert!(shared.close(fd, Some(generation), CloseReason::Idle));
        assert!(!shared.close(fd, None, CloseReason::PeerClosed));
        assert_eq!(shared.live_count(), 0);
        assert!(!shared.slot(fd).unwrap().conn.is_live());
    }

    #[test]
    fn test_fd_outside_table() {
        let shared = shared(1);
        let (_client, server, peer) = pair();
        assert!(matches!(
            shared.open(1000, server, peer),
            Err(ServerError::SlotTableFull)
        ));
        assert!(shared.slot(-1).is_none());
        assert_eq!(shared.live_count(), 0);
    }
}
