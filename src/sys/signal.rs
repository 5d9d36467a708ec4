//! # Self-pipe de Señales
//! src/sys/signal.rs
//!
//! Las señales que consume el reactor (`SIGALRM` para el tick de timers,
//! `SIGTERM`/`SIGINT` para parar) se convierten en bytes dentro de un par de
//! sockets Unix. El handler solo hace un `send` de un byte; toda la lógica
//! corre en el loop de eventos al drenar el extremo de lectura.

use signal_hook::consts::{SIGALRM, SIGINT, SIGTERM};
use signal_hook::SigId;
use std::io::{self, Read, Write};
use std::os::unix::io::{AsRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::sync::Arc;

/// Señal recibida por el loop de eventos
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Tick periódico: barrer timers vencidos
    Alarm,
    /// Parada ordenada
    Terminate,
}

impl Signal {
    fn from_byte(byte: u8) -> Option<Self> {
        match byte as i32 {
            SIGALRM => Some(Signal::Alarm),
            SIGTERM | SIGINT => Some(Signal::Terminate),
            _ => None,
        }
    }
}

pub struct SignalPipe {
    reader: UnixStream,
    writer: Arc<UnixStream>,
    registrations: Vec<SigId>,
}

impl SignalPipe {
    /// Crea el par de sockets y registra los handlers
    pub fn install() -> io::Result<Self> {
        let (reader, writer) = UnixStream::pair()?;
        reader.set_nonblocking(true)?;
        writer.set_nonblocking(true)?;

        let write_fd = writer.as_raw_fd();
        let mut registrations = Vec::with_capacity(3);
        for signal in [SIGALRM, SIGTERM, SIGINT] {
            // SAFETY: la acción solo llama a send(2), que es async-signal-safe
            let id = unsafe {
                signal_hook::low_level::register(signal, move || {
                    let byte = signal as u8;
                    libc::send(
                        write_fd,
                        &byte as *const u8 as *const libc::c_void,
                        1,
                        libc::MSG_DONTWAIT,
                    );
                })
            }?;
            registrations.push(id);
        }

        Ok(Self {
            reader,
            writer: Arc::new(writer),
            registrations,
        })
    }

    /// Descriptor a registrar en epoll
    pub fn read_fd(&self) -> RawFd {
        self.reader.as_raw_fd()
    }

    /// Lee todos los bytes pendientes y los traduce a señales
    pub fn drain(&mut self) -> io::Result<Vec<Signal>> {
        let mut signals = Vec::new();
        let mut buf = [0u8; 64];
        loop {
            match self.reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => signals.extend(buf[..n].iter().filter_map(|b| Signal::from_byte(*b))),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(signals)
    }

    /// Handle para pedir la parada desde otro thread
    pub fn notifier(&self) -> ShutdownHandle {
        ShutdownHandle {
            writer: Arc::clone(&self.writer),
        }
    }
}

impl Drop for SignalPipe {
    fn drop(&mut self) {
        // Los handlers usan el fd de escritura: se quitan antes de cerrarlo
        for id in self.registrations.drain(..) {
            signal_hook::low_level::unregister(id);
        }
    }
}

/// Inyecta bytes de señal en el self-pipe sin pasar por el kernel de señales
#[derive(Clone)]
pub struct ShutdownHandle {
    writer: Arc<UnixStream>,
}

impl ShutdownHandle {
    /// Pide al reactor que termine tras el lote de eventos actual
    pub fn shutdown(&self) -> io::Result<()> {
        (&*self.writer).write_all(&[SIGTERM as u8])
    }

    /// Fuerza un barrido de timers como si hubiera llegado `SIGALRM`
    pub fn tick(&self) -> io::Result<()> {
        (&*self.writer).write_all(&[SIGALRM as u8])
    }
}

/// Programa el próximo `SIGALRM` (mínimo un segundo)
pub fn schedule_alarm(secs: u64) {
    let secs = secs.clamp(1, u32::MAX as u64) as libc::c_uint;
    unsafe {
        libc::alarm(secs);
    }
}

/// Cancela el `SIGALRM` pendiente, si lo hay
pub fn cancel_alarm() {
    unsafe {
        libc::alarm(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shutdown_handle_reaches_pipe() {
        let mut pipe = SignalPipe::install().unwrap();
        let handle = pipe.notifier();
        handle.tick().unwrap();
        handle.shutdown().unwrap();

        let signals = pipe.drain().unwrap();
        assert_eq!(signals, vec![Signal::Alarm, Signal::Terminate]);
        assert!(pipe.drain().unwrap().is_empty());
    }

    #[test]
    fn test_unknown_bytes_are_ignored() {
        assert_eq!(Signal::from_byte(SIGINT as u8), Some(Signal::Terminate));
        assert_eq!(Signal::from_byte(0), None);
    }
}
