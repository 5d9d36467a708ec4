//! Helpers compartidos por los tests de integración
//! tests/common/mod.rs
//!
//! Levantan un `Server` real en un puerto efímero con una raíz de
//! documentos temporal y hablan HTTP crudo por `TcpStream`.

#![allow(dead_code)]

use std::fs;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tempfile::TempDir;
use tiny_webserver::config::Config;
use tiny_webserver::metrics::MetricsCollector;
use tiny_webserver::server::Server;
use tiny_webserver::sys::ShutdownHandle;

pub const WELCOME_BODY: &str = "<html><body>judge</body></html>";

/// Servidor corriendo en un thread propio; se detiene al soltarlo
pub struct TestServer {
    pub addr: SocketAddr,
    pub metrics: MetricsCollector,
    pub dir: TempDir,
    handle: ShutdownHandle,
    join: Option<JoinHandle<tiny_webserver::Result<()>>>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(join) = self.join.take() {
            let _ = self.handle.shutdown();
            let _ = join.join();
        }
    }
}

impl TestServer {
    /// Pide la parada y retorna lo que devolvió `Server::run`
    pub fn stop(mut self) -> tiny_webserver::Result<()> {
        self.handle.shutdown()?;
        match self.join.take() {
            Some(join) => join.join().expect("reactor thread panicked"),
            None => Ok(()),
        }
    }
}

/// Crea un FIFO: quien lo abra para escribir queda bloqueado hasta que
/// alguien lo abra para leer
pub fn make_fifo(path: &Path) {
    use std::os::unix::ffi::OsStrExt;
    let c_path = std::ffi::CString::new(path.as_os_str().as_bytes()).unwrap();
    assert_eq!(unsafe { libc::mkfifo(c_path.as_ptr(), 0o644) }, 0);
}

fn write_page(root: &Path, name: &str, content: &[u8], mode: u32) {
    let path = root.join(name);
    fs::write(&path, content).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(mode)).unwrap();
}

/// Contenido binario determinista de `len` bytes
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

pub fn start_server(tweak: impl FnOnce(&mut Config)) -> TestServer {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("root");
    fs::create_dir_all(root.join("docs")).unwrap();
    fs::set_permissions(root.join("docs"), fs::Permissions::from_mode(0o755)).unwrap();

    write_page(&root, "judge.html", WELCOME_BODY.as_bytes(), 0o644);
    write_page(&root, "index.html", b"<h1>index</h1>", 0o644);
    write_page(&root, "big.bin", &pattern(512 * 1024), 0o644);
    write_page(&root, "private.html", b"secret", 0o600);
    write_page(&root, "register.html", b"register", 0o644);
    write_page(&root, "log.html", b"login", 0o644);
    write_page(&root, "welcome.html", b"welcome", 0o644);
    write_page(&root, "logError.html", b"login error", 0o644);
    write_page(&root, "registerError.html", b"register error", 0o644);

    let mut config = Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        doc_root: root,
        threads: 4,
        max_requests: 1000,
        max_fds: 4096,
        db_path: dir.path().join("users.json"),
        db_pool_size: 2,
        ..Config::default()
    };
    tweak(&mut config);

    let server = Server::new(config).unwrap();
    let addr = server.local_addr().unwrap();
    let handle = server.shutdown_handle();
    let metrics = server.metrics();

    let join = thread::Builder::new()
        .name("reactor".to_string())
        .spawn(move || {
            let mut server = server;
            server.run()
        })
        .unwrap();

    TestServer {
        addr,
        metrics,
        dir,
        handle,
        join: Some(join),
    }
}

pub fn connect(addr: SocketAddr) -> TcpStream {
    let stream = TcpStream::connect(addr).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    stream.set_write_timeout(Some(Duration::from_secs(5))).unwrap();
    stream
}

/// Respuesta HTTP leída del socket
#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub head: String,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.split("\r\n").skip(1).find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.eq_ignore_ascii_case(name).then(|| value.trim())
        })
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Lee una respuesta completa usando `Content-Length`
pub fn read_response(stream: &mut TcpStream) -> HttpResponse {
    let mut raw = Vec::new();
    let mut byte = [0u8; 1];
    while !raw.ends_with(b"\r\n\r\n") {
        let n = stream.read(&mut byte).unwrap();
        assert_eq!(n, 1, "connection closed inside headers: {:?}", String::from_utf8_lossy(&raw));
        raw.push(byte[0]);
    }

    let head = String::from_utf8(raw).unwrap();
    let status = head
        .split(' ')
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap();

    let mut response = HttpResponse {
        status,
        head,
        body: Vec::new(),
    };
    let len: usize = response.header("Content-Length").unwrap().parse().unwrap();
    response.body = vec![0u8; len];
    stream.read_exact(&mut response.body).unwrap();
    response
}

/// Envía `raw` y lee una respuesta
pub fn roundtrip(stream: &mut TcpStream, raw: &[u8]) -> HttpResponse {
    stream.write_all(raw).unwrap();
    read_response(stream)
}

/// `true` si el servidor cerró la conexión
pub fn is_closed(stream: &mut TcpStream) -> bool {
    let mut buf = [0u8; 16];
    matches!(stream.read(&mut buf), Ok(0))
}

/// Espera hasta que `cond` se cumpla o vence el plazo
pub fn wait_until(deadline: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let start = std::time::Instant::now();
    while start.elapsed() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }
    cond()
}
