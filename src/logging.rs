//! # Logging
//! src/logging.rs
//!
//! Inicialización del subscriber de `tracing`. El nivel sale de `RUST_LOG`
//! y, si no está definida, de `--log-level`.
//!
//! ```bash
//! RUST_LOG=tiny_webserver=debug ./tiny_webserver
//! ```

use crate::config::Config;
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Instala el subscriber global.
///
/// Con `log_file` las líneas se agregan a ese archivo; sin él van a stdout.
/// Llamarla dos veces no hace nada: el primer subscriber gana.
pub fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true);

    match &config.log_file {
        Some(path) => match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => {
                let _ = builder.with_ansi(false).with_writer(Mutex::new(file)).try_init();
            }
            Err(e) => {
                let _ = builder.try_init();
                tracing::warn!(path = %path.display(), error = %e, "cannot open log file, using stdout");
            }
        },
        None => {
            let _ = builder.try_init();
        }
    }
}
