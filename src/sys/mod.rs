//! # Plumbing del Sistema Operativo
//! src/sys/mod.rs
//!
//! Envoltorios finos sobre las syscalls que el reactor necesita:
//! - `epoll`: multiplexación edge-triggered con re-armado one-shot
//! - `socket`: socket de escucha y escritura scatter (`writev`)
//! - `signal`: self-pipe para `SIGALRM`/`SIGTERM` y `alarm(2)`

pub mod epoll;
pub mod signal;
pub mod socket;

pub use epoll::{event_buffer, Epoll, Event, Interest};
pub use signal::{cancel_alarm, schedule_alarm, ShutdownHandle, Signal, SignalPipe};
pub use socket::{bind_listener, writev, LISTEN_BACKLOG};
