//! Expiración de conexiones inactivas
//! tests/idle_eviction.rs
//!
//! Binario propio: `alarm(2)` es global al proceso y aquí corre un único
//! servidor con timeslot de 1s (inactividad máxima de 3s).

mod common;

use common::*;
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn test_idle_connection_evicted_active_survives() {
    let server = start_server(|config| config.timeslot_secs = 1);

    let mut idle = connect(server.addr);
    idle.set_read_timeout(Some(Duration::from_secs(8))).unwrap();
    let mut active = connect(server.addr);

    let start = Instant::now();
    for _ in 0..5 {
        let response = roundtrip(
            &mut active,
            b"GET /index.html HTTP/1.1\r\nConnection: keep-alive\r\n\r\n",
        );
        assert_eq!(response.status, 200);
        thread::sleep(Duration::from_secs(1));
    }

    // Cerrada por el barrido, no por el timeout de lectura del cliente
    assert!(is_closed(&mut idle));
    assert!(start.elapsed() < Duration::from_secs(8));

    // La conexión con actividad sigue viva después de 5s
    let response = roundtrip(
        &mut active,
        b"GET / HTTP/1.1\r\nConnection: keep-alive\r\n\r\n",
    );
    assert_eq!(response.status, 200);
    assert_eq!(response.body_text(), WELCOME_BODY);

    assert!(wait_until(Duration::from_secs(1), || {
        server.metrics.snapshot().idle_evictions == 1
    }));
    assert_eq!(server.metrics.snapshot().accepted, 2);

    let metrics = server.metrics.clone();
    assert!(server.stop().is_ok());
    // La conexión activa se cierra con la parada
    assert!(is_closed(&mut active));
    assert_eq!(metrics.snapshot().closed, 2);
}
