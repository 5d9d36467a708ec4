//! # Tiny Webserver - Entry Point
//! src/main.rs
//!
//! Punto de entrada del servidor HTTP/1.1.
//!
//! La configuración sale de la línea de comandos y de variables de entorno
//! (ver `config.rs`).

use tiny_webserver::config::Config;
use tiny_webserver::logging;
use tiny_webserver::server::Server;

fn main() {
    let config = Config::new();

    if let Err(e) = config.validate() {
        eprintln!("Error de configuración: {}", e);
        std::process::exit(1);
    }

    logging::init_logging(&config);
    config.print_summary();

    // Crear el servidor
    let mut server = match Server::new(config) {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(error = %e, "cannot start server");
            eprintln!("Error fatal: {}", e);
            std::process::exit(1);
        }
    };

    // Iniciar el servidor (esto bloqueará el thread)
    if let Err(e) = server.run() {
        tracing::error!(error = %e, "reactor stopped");
        eprintln!("Error fatal: {}", e);
        std::process::exit(1);
    }
}
