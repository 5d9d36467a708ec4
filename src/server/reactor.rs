//! # Reactor
//! src/server/reactor.rs
//!
//! Thread único de E/S. Dueño del epoll, del listener, del self-pipe de
//! señales y del heap de timers. Por cada lote de eventos clasifica cada
//! descriptor, en este orden:
//!
//! 1. listener: aceptar hasta `WouldBlock`
//! 2. self-pipe: `SIGALRM` marca un barrido de timers, `SIGTERM` la parada
//! 3. hang-up / error: cerrar la conexión
//! 4. lectible: drenar el socket y encolar el slot en el pool de workers
//! 5. escribible: escribir la respuesta aquí mismo
//!
//! Los workers nunca cierran descriptores: todo cierre pasa por este thread
//! (o por un callback de timer, que también corre aquí).

use super::shared::{ConnShared, ConnTask};
use crate::config::Config;
use crate::db::{ConnectionPool, CredentialStore, Database, DbConnection};
use crate::error::Result;
use crate::http::{Site, WriteOutcome};
use crate::metrics::{CloseReason, MetricsCollector};
use crate::pool::ResourcePool;
use crate::sys::{self, Epoll, Interest, ShutdownHandle, Signal, SignalPipe};
use crate::threadpool::ThreadPool;
use crate::timer::{TimerHeap, TimerId};
use std::io::{self, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Eventos por llamada a `epoll_wait`
const MAX_EVENT_NUMBER: usize = 10000;

const LISTENER_TOKEN: u64 = u64::MAX;
const SIGNAL_TOKEN: u64 = u64::MAX - 1;

/// Respuesta cruda a una conexión rechazada por ocupación
const BUSY_MESSAGE: &[u8] = b"Internal server busy";

/// Datos de usuario del timer de una conexión
#[derive(Debug, Clone, Copy)]
pub struct ClientData {
    pub fd: RawFd,
    pub generation: u64,
    pub peer: SocketAddr,
}

pub struct Server {
    config: Config,
    listener: TcpListener,
    signals: SignalPipe,
    shared: Arc<ConnShared>,
    workers: ThreadPool<ConnTask>,
    db_pool: Arc<ResourcePool<DbConnection>>,
    timers: TimerHeap<ClientData>,
    /// Timer vigente de cada descriptor
    timer_ids: Vec<Option<TimerId>>,
    metrics: MetricsCollector,
    stop: bool,
}

impl Server {
    /// Prepara todo lo necesario para correr: listener, epoll, señales,
    /// backend, credenciales y workers
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let listener = sys::bind_listener(&config.address(), sys::LISTEN_BACKLOG)?;
        let epoll = Epoll::new()?;
        epoll.add(listener.as_raw_fd(), LISTENER_TOKEN, Interest::Read)?;

        let signals = SignalPipe::install()?;
        epoll.add(signals.read_fd(), SIGNAL_TOKEN, Interest::Read)?;

        let db = Arc::new(Database::open(&config.db_path)?);
        let db_pool = Arc::new(ConnectionPool::init(db, config.db_pool_size)?);

        let credentials = Arc::new(CredentialStore::new());
        credentials.preload(&db_pool.lease());

        let metrics = MetricsCollector::new();
        let site = Site::new(config.doc_root.clone(), credentials);
        let shared = Arc::new(ConnShared::new(config.max_fds, epoll, site, metrics.clone()));

        let workers = ThreadPool::new(config.threads, config.max_requests, Arc::clone(&db_pool))?;

        Ok(Self {
            timer_ids: vec![None; config.max_fds],
            config,
            listener,
            signals,
            shared,
            workers,
            db_pool,
            timers: TimerHeap::new(64),
            metrics,
            stop: false,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Handle para pedir la parada (o forzar un tick) desde otro thread
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.signals.notifier()
    }

    pub fn metrics(&self) -> MetricsCollector {
        self.metrics.clone()
    }

    /// Loop de eventos. Retorna al recibir `SIGTERM`/`SIGINT` o ante un
    /// fallo fatal de `epoll_wait`.
    pub fn run(&mut self) -> Result<()> {
        let addr = self.local_addr()?;
        tracing::info!(%addr, workers = self.workers.threads(), "server listening");

        sys::schedule_alarm(self.config.timeslot_secs);

        let mut raw = sys::event_buffer(MAX_EVENT_NUMBER);
        let mut events = Vec::with_capacity(MAX_EVENT_NUMBER);

        while !self.stop {
            if let Err(e) = self.shared.epoll().wait(&mut raw, &mut events) {
                tracing::error!(error = %e, "epoll failure");
                return Err(e.into());
            }

            let mut timeout = false;
            for event in &events {
                match event.token {
                    LISTENER_TOKEN => self.accept_all(),
                    SIGNAL_TOKEN => self.handle_signals(&mut timeout),
                    token => {
                        let fd = token as RawFd;
                        if event.is_error() {
                            self.close_conn(fd, CloseReason::PeerClosed);
                        } else if event.is_readable() {
                            self.handle_read(fd);
                        } else if event.is_writable() {
                            self.handle_write(fd);
                        }
                    }
                }
            }

            // Los timers se atienden después de la E/S del lote
            if timeout {
                self.sweep_timers();
            }
        }

        let closed = self.close_all(CloseReason::Shutdown);
        tracing::info!(
            closed,
            metrics = %self.metrics.to_json(),
            "server stopped"
        );
        Ok(())
    }

    fn accept_all(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => self.admit(stream, peer),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    break;
                }
            }
        }
    }

    fn admit(&mut self, stream: TcpStream, peer: SocketAddr) {
        let fd = stream.as_raw_fd();
        let index = fd as usize;
        if index >= self.shared.capacity() || self.shared.live_count() >= self.config.max_fds {
            tracing::warn!(fd, %peer, live = self.shared.live_count(), "server busy");
            let _ = (&stream).write_all(BUSY_MESSAGE);
            self.metrics.record_busy();
            return;
        }

        if let Err(e) = stream.set_nonblocking(true) {
            tracing::warn!(fd, error = %e, "cannot set non-blocking");
            return;
        }

        let generation = match self.shared.open(fd, stream, peer) {
            Ok(generation) => generation,
            Err(e) => {
                tracing::warn!(fd, %peer, error = %e, "cannot register connection");
                return;
            }
        };

        let shared = Arc::clone(&self.shared);
        let expire = Instant::now() + self.config.idle_timeout();
        let id = self.timers.add_timer(
            expire,
            ClientData {
                fd,
                generation,
                peer,
            },
            Box::new(move |client: &ClientData| {
                if shared.close(client.fd, Some(client.generation), CloseReason::Idle) {
                    tracing::info!(fd = client.fd, peer = %client.peer, "idle connection evicted");
                }
            }),
        );
        self.timer_ids[index] = Some(id);

        tracing::debug!(fd, %peer, live = self.shared.live_count(), "connection accepted");
    }

    fn handle_signals(&mut self, timeout: &mut bool) {
        let signals = match self.signals.drain() {
            Ok(signals) => signals,
            Err(e) => {
                tracing::warn!(error = %e, "signal pipe read failed");
                return;
            }
        };
        for signal in signals {
            match signal {
                Signal::Alarm => *timeout = true,
                Signal::Terminate => {
                    tracing::info!("shutdown requested");
                    self.stop = true;
                }
            }
        }
    }

    fn handle_read(&mut self, fd: RawFd) {
        let (ok, generation) = match self.shared.slot(fd) {
            Some(mut slot) => (slot.conn.read_once(), slot.generation),
            None => return,
        };
        if !ok {
            self.close_conn(fd, CloseReason::PeerClosed);
            return;
        }

        let task = ConnTask::new(Arc::clone(&self.shared), fd, generation);
        if !self.workers.append(task) {
            tracing::warn!(
                fd,
                pending = self.workers.pending(),
                max = self.workers.max_requests(),
                "work queue full"
            );
            self.close_conn(fd, CloseReason::QueueFull);
            return;
        }
        self.adjust_timer(fd);
    }

    fn handle_write(&mut self, fd: RawFd) {
        let outcome = match self.shared.slot(fd) {
            Some(mut slot) => slot.conn.write(),
            None => return,
        };

        match outcome {
            WriteOutcome::Pending => {
                if self.rearm_or_close(fd, Interest::Write) {
                    self.adjust_timer(fd);
                }
            }
            WriteOutcome::Complete(summary) => {
                if let Some(status) = summary.status {
                    self.metrics
                        .record_response(status.as_u16(), summary.bytes, summary.latency);
                }
                if summary.keep_alive {
                    if self.rearm_or_close(fd, Interest::Read) {
                        self.adjust_timer(fd);
                    }
                } else {
                    self.close_conn(fd, CloseReason::Completed);
                }
            }
            WriteOutcome::Failed => {
                self.close_conn(fd, CloseReason::WriteFailed);
            }
        }
    }

    fn rearm_or_close(&mut self, fd: RawFd, interest: Interest) -> bool {
        match self.shared.rearm(fd, interest) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(fd, error = %e, "rearm failed");
                self.close_conn(fd, CloseReason::PeerClosed);
                false
            }
        }
    }

    /// Cierra la conexión y anula su timer de forma perezosa
    fn close_conn(&mut self, fd: RawFd, reason: CloseReason) -> bool {
        if let Some(id) = usize::try_from(fd)
            .ok()
            .and_then(|i| self.timer_ids.get_mut(i))
            .and_then(Option::take)
        {
            self.timers.del_timer(id);
        }
        self.shared.close(fd, None, reason)
    }

    /// Cierra todas las conexiones que siguen vivas. Retorna cuántas cerró.
    fn close_all(&mut self, reason: CloseReason) -> usize {
        let tracked: Vec<RawFd> = self
            .timer_ids
            .iter()
            .enumerate()
            .filter(|(_, id)| id.is_some())
            .filter_map(|(fd, _)| RawFd::try_from(fd).ok())
            .collect();

        tracked
            .into_iter()
            .filter(|&fd| self.close_conn(fd, reason))
            .count()
    }

    /// Hubo actividad: el presupuesto de inactividad vuelve a empezar
    fn adjust_timer(&mut self, fd: RawFd) {
        let Some(Some(id)) = usize::try_from(fd).ok().and_then(|i| self.timer_ids.get(i)) else {
            return;
        };
        let expire = Instant::now() + self.config.idle_timeout();
        if self.timers.adjust(*id, expire) {
            tracing::trace!(fd, "timer adjusted");
        }
    }

    /// Dispara los timers vencidos y programa el próximo tick para cuando
    /// venza la nueva raíz
    fn sweep_timers(&mut self) {
        let now = Instant::now();
        let fired = self.timers.tick(now);
        if fired > 0 {
            tracing::debug!(fired, live = self.shared.live_count(), "timer sweep");
        }

        let next = self
            .timers
            .next_timeout(now)
            .map(ceil_secs)
            .unwrap_or(self.config.timeslot_secs)
            .clamp(1, self.config.timeslot_secs.max(1));
        sys::schedule_alarm(next);
    }

    /// Handles del backend libres en este momento
    pub fn free_db_handles(&self) -> usize {
        self.db_pool.free_count()
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        sys::cancel_alarm();
    }
}

fn ceil_secs(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(dir: &std::path::Path) -> Config {
        Config {
            host: "127.0.0.1".to_string(),
            port: 0,
            doc_root: dir.join("root"),
            max_fds: 64,
            db_path: dir.join("users.json"),
            db_pool_size: 3,
            ..Config::default()
        }
    }

    #[test]
    fn test_new_returns_preload_handle() {
        let dir = tempfile::TempDir::new().unwrap();
        let server = Server::new(config(dir.path())).unwrap();
        assert_eq!(server.free_db_handles(), 3);
        assert_ne!(server.local_addr().unwrap().port(), 0);
        assert_eq!(server.timer_ids.len(), 64);
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut bad = config(dir.path());
        bad.threads = 0;
        assert!(matches!(Server::new(bad), Err(crate::ServerError::Config(_))));
    }

    #[test]
    fn test_ceil_secs() {
        assert_eq!(ceil_secs(Duration::from_secs(3)), 3);
        assert_eq!(ceil_secs(Duration::from_millis(3001)), 4);
        assert_eq!(ceil_secs(Duration::ZERO), 0);
    }
}
