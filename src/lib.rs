//! # Tiny Webserver
//! src/lib.rs
//!
//! Servidor HTTP/1.1 de un solo proceso construido alrededor de un reactor
//! epoll edge-triggered. Demuestra conceptos de sistemas operativos:
//! multiplexación de E/S, concurrencia productor/consumidor, sincronización
//! con semáforos y admisión acotada de recursos.
//!
//! ## Arquitectura
//!
//! El servidor está dividido en módulos especializados:
//! - `server`: reactor, tabla de slots por descriptor y tarea de los workers
//! - `http`: máquina de estados incremental por conexión
//! - `threadpool`: workers con cola FIFO acotada
//! - `timer`: heap mínimo de timers para desalojar conexiones inactivas
//! - `pool`: pool genérico de recursos con préstamos con alcance
//! - `db`: tabla de usuarios, pool de handles y caché de credenciales
//! - `sys`: epoll, sockets, self-pipe de señales
//! - `metrics`: contadores y observabilidad
//! - `config`, `error`, `logging`: configuración, errores y logs
//!
//! ## Ejemplo de uso
//!
//! ```no_run
//! use tiny_webserver::config::Config;
//! use tiny_webserver::server::Server;
//!
//! let config = Config::default();
//! let mut server = Server::new(config).expect("Error al crear servidor");
//! server.run().expect("Error fatal del reactor");
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod logging;
pub mod metrics;
pub mod pool;
pub mod server;
pub mod sys;
pub mod threadpool;
pub mod timer;

pub use config::Config;
pub use error::{Result, ServerError};
pub use server::Server;
