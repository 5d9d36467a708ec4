//! # Módulo del Servidor HTTP
//! src/server/mod.rs
//!
//! El servidor se arma con tres piezas:
//! 1. `reactor`: el thread de E/S con epoll, accept, lecturas y escrituras
//! 2. `shared`: la tabla de slots por descriptor, compartida con los workers
//! 3. `ConnTask`: la tarea que un worker ejecuta para parsear y responder

pub mod reactor;
pub mod shared;

// Re-exportar para facilitar el uso
pub use reactor::{ClientData, Server};
pub use shared::{ConnShared, ConnSlot, ConnTask};
