//! # Configuración del Servidor
//! src/config.rs
//!
//! Este módulo define la configuración del servidor HTTP con soporte completo
//! para argumentos CLI y variables de entorno.
//!
//! ## Ejemplos de uso
//!
//! ### CLI
//! ```bash
//! ./tiny_webserver --port 9006 \
//!   --doc-root /srv/www \
//!   --threads 8 \
//!   --timeslot 5
//! ```
//!
//! ### Variables de entorno
//! ```bash
//! SERVER_PORT=9006 DOC_ROOT=/srv/www ./tiny_webserver
//! ```

use crate::error::{Result, ServerError};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Configuración del servidor HTTP/1.1
#[derive(Debug, Clone, Parser)]
#[command(name = "tiny_webserver")]
#[command(about = "Servidor HTTP/1.1 con reactor epoll, pool de workers y heap de timers")]
#[command(version = "0.1.0")]
pub struct Config {
    /// Puerto en el que escucha el servidor
    #[arg(short, long, default_value = "9006", env = "SERVER_PORT")]
    pub port: u16,

    /// Interfaz IPv4 en la que escucha (todas por defecto)
    #[arg(long, default_value = "0.0.0.0", env = "SERVER_HOST")]
    pub host: String,

    /// Raíz de documentos estáticos
    #[arg(long = "doc-root", default_value = "./root", env = "DOC_ROOT")]
    pub doc_root: PathBuf,

    // === Workers ===

    /// Número de threads del pool de workers
    #[arg(long, default_value = "8", env = "WORKER_THREADS")]
    pub threads: usize,

    /// Máximo de conexiones pendientes en la cola de trabajo
    #[arg(long = "max-requests", default_value = "10000", env = "MAX_REQUESTS")]
    pub max_requests: usize,

    // === Conexiones ===

    /// Tamaño de la tabla de slots y techo de conexiones vivas
    #[arg(long = "max-fds", default_value = "65536", env = "MAX_FDS")]
    pub max_fds: usize,

    /// Intervalo del tick de timers en segundos (el presupuesto de
    /// inactividad es 3 ticks)
    #[arg(long = "timeslot", default_value = "5", env = "TIMESLOT")]
    pub timeslot_secs: u64,

    // === Backend ===

    /// Archivo de la tabla de usuarios
    #[arg(long = "db-path", default_value = "./data/users.json", env = "DB_PATH")]
    pub db_path: PathBuf,

    /// Número de conexiones del pool del backend
    #[arg(long = "db-pool-size", default_value = "8", env = "DB_POOL_SIZE")]
    pub db_pool_size: usize,

    // === Logging ===

    /// Archivo de log (stdout si no se indica)
    #[arg(long = "log-file", env = "LOG_FILE")]
    pub log_file: Option<PathBuf>,

    /// Nivel de log por defecto (RUST_LOG tiene prioridad)
    #[arg(long = "log-level", default_value = "info", env = "LOG_LEVEL")]
    pub log_level: String,
}

impl Config {
    /// Crea una nueva configuración parseando argumentos CLI
    pub fn new() -> Self {
        Config::parse()
    }

    /// Obtiene la dirección completa para bind (host:port)
    ///
    /// # Ejemplo
    /// ```rust
    /// use tiny_webserver::config::Config;
    ///
    /// let config = Config::default();
    /// assert_eq!(config.address(), "0.0.0.0:9006");
    /// ```
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Intervalo del tick como `Duration`
    pub fn timeslot(&self) -> Duration {
        Duration::from_secs(self.timeslot_secs)
    }

    /// Presupuesto de inactividad de una conexión: 3 ticks
    pub fn idle_timeout(&self) -> Duration {
        self.timeslot() * 3
    }

    /// Valida la configuración
    ///
    /// Retorna errores si hay valores inválidos
    pub fn validate(&self) -> Result<()> {
        if self.threads == 0 {
            return Err(ServerError::Config("worker threads must be >= 1".to_string()));
        }
        if self.max_requests == 0 {
            return Err(ServerError::Config("max requests must be >= 1".to_string()));
        }
        if self.max_fds == 0 {
            return Err(ServerError::Config("max fds must be >= 1".to_string()));
        }
        if self.timeslot_secs == 0 {
            return Err(ServerError::Config("timeslot must be > 0".to_string()));
        }
        if self.db_pool_size == 0 {
            return Err(ServerError::Config("db pool size must be >= 1".to_string()));
        }
        Ok(())
    }

    /// Imprime un resumen de la configuración en el log
    pub fn print_summary(&self) {
        tracing::info!(
            address = %self.address(),
            doc_root = %self.doc_root.display(),
            "network"
        );
        tracing::info!(
            threads = self.threads,
            max_requests = self.max_requests,
            max_fds = self.max_fds,
            "worker pool"
        );
        tracing::info!(
            timeslot_secs = self.timeslot_secs,
            idle_timeout_secs = self.idle_timeout().as_secs(),
            "timers"
        );
        tracing::info!(
            db_path = %self.db_path.display(),
            db_pool_size = self.db_pool_size,
            "backend"
        );
    }
}

impl Default for Config {
    /// Configuración por defecto
    fn default() -> Self {
        Self {
            port: 9006,
            host: "0.0.0.0".to_string(),
            doc_root: PathBuf::from("./root"),
            threads: 8,
            max_requests: 10_000,
            max_fds: 65_536,
            timeslot_secs: 5,
            db_path: PathBuf::from("./data/users.json"),
            db_pool_size: 8,
            log_file: None,
            log_level: "info".to_string(),
        }
    }
}
