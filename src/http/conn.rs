//! # Conexión HTTP
//! src/http/conn.rs
//!
//! Estado completo de una conexión: buffers, cursores del parser, request
//! parseado y respuesta pendiente. Un `HttpConn` vive en un slot indexado
//! por descriptor y se reutiliza entre conexiones (`init` / `close`).
//!
//! ## Ciclo de vida
//!
//! ```text
//! reactor: read_once() ──> worker: process() ──> reactor: write()
//!                ^                                     │
//!                └──────────── keep-alive ─────────────┘
//! ```
//!
//! Solo un thread toca la conexión a la vez: el descriptor está registrado
//! one-shot y nadie lo vuelve a armar hasta terminar su parte.

use super::mmap::MappedFile;
use super::request::{self, CheckState, HeaderStatus, HttpCode, LineStatus, Request};
use super::response::{WriteBuffer, EMPTY_PAGE, WRITE_BUFFER_SIZE};
use super::site::Site;
use super::StatusCode;
use crate::db::DbConnection;
use crate::sys;
use std::fs;
use std::io::{self, Read};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::os::unix::fs::PermissionsExt;
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Capacidad del buffer de lectura de cada conexión
pub const READ_BUFFER_SIZE: usize = 2048;

/// Bit de lectura para "otros"
const S_IROTH: u32 = 0o004;

/// Qué debe hacer el reactor después de `process`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Request incompleto: re-armar para lectura
    NeedInput,
    /// Respuesta lista: re-armar para escritura
    ReadyToWrite,
    /// No se pudo armar la respuesta: cerrar
    Abort,
}

/// Resultado de un paso de escritura
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// El socket se llenó: re-armar para escritura
    Pending,
    /// Respuesta enviada completa
    Complete(ResponseSummary),
    /// Error de escritura: cerrar
    Failed,
}

/// Datos de una respuesta terminada
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseSummary {
    pub status: Option<StatusCode>,
    pub bytes: usize,
    /// La conexión sigue abierta para otro request
    pub keep_alive: bool,
    pub latency: Option<Duration>,
}

#[derive(Debug)]
pub struct HttpConn {
    stream: Option<TcpStream>,
    peer: Option<SocketAddr>,

    read_buf: Vec<u8>,
    /// Fin de los datos leídos
    read_idx: usize,
    /// Próximo byte a revisar por `parse_line`
    checked_idx: usize,
    /// Inicio de la línea en curso
    start_line: usize,

    write_buf: WriteBuffer,
    check_state: CheckState,
    request: Request,

    real_file: PathBuf,
    file: Option<MappedFile>,
    /// Total a enviar entre headers y archivo
    bytes_to_send: usize,
    bytes_have_send: usize,
    status: Option<StatusCode>,
    /// Primer byte del request en curso
    started_at: Option<Instant>,
}

impl HttpConn {
    pub fn new() -> Self {
        Self {
            stream: None,
            peer: None,
            read_buf: Vec::new(),
            read_idx: 0,
            checked_idx: 0,
            start_line: 0,
            write_buf: WriteBuffer::new(WRITE_BUFFER_SIZE),
            check_state: CheckState::default(),
            request: Request::default(),
            real_file: PathBuf::new(),
            file: None,
            bytes_to_send: 0,
            bytes_have_send: 0,
            status: None,
            started_at: None,
        }
    }

    /// Asocia el slot a una conexión recién aceptada
    pub fn init(&mut self, stream: TcpStream, peer: SocketAddr) {
        if self.read_buf.len() != READ_BUFFER_SIZE {
            self.read_buf = vec![0; READ_BUFFER_SIZE];
        }
        self.stream = Some(stream);
        self.peer = Some(peer);
        self.reset();
    }

    /// Cierra el descriptor y deja el slot limpio. Retorna `false` si el
    /// slot ya estaba libre.
    pub fn close(&mut self) -> bool {
        let Some(stream) = self.stream.take() else {
            return false;
        };
        tracing::debug!(fd = stream.as_raw_fd(), peer = ?self.peer, "closing connection");
        drop(stream);
        self.peer = None;
        self.reset();
        true
    }

    pub fn is_live(&self) -> bool {
        self.stream.is_some()
    }

    pub fn fd(&self) -> Option<RawFd> {
        self.stream.as_ref().map(|s| s.as_raw_fd())
    }

    pub fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn check_state(&self) -> CheckState {
        self.check_state
    }

    /// Corta el socket en ambos sentidos sin cerrar el descriptor. El peer
    /// ve el cierre y epoll reporta el hang-up al reactor.
    pub fn shutdown(&self) {
        if let Some(stream) = &self.stream {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }

    /// Estado inicial para un request nuevo sobre la misma conexión
    fn reset(&mut self) {
        self.read_idx = 0;
        self.checked_idx = 0;
        self.start_line = 0;
        self.write_buf.clear();
        self.check_state = CheckState::AwaitingRequestLine;
        self.request = Request::default();
        self.real_file = PathBuf::new();
        self.file = None;
        self.bytes_to_send = 0;
        self.bytes_have_send = 0;
        self.status = None;
        self.started_at = None;
    }

    /// Lee todo lo disponible hasta `WouldBlock` (modo edge-triggered).
    ///
    /// Retorna `false` si el peer cerró, hubo un error o el buffer ya estaba
    /// lleno al entrar.
    pub fn read_once(&mut self) -> bool {
        let Some(mut stream) = self.stream.as_ref() else {
            return false;
        };

        let mut got_bytes = false;
        loop {
            // Buffer lleno: lo leído en esta llamada lo juzga el parser. Lleno
            // desde antes es un request que nunca va a caber.
            if self.read_idx >= self.read_buf.len() {
                if got_bytes {
                    break;
                }
                tracing::debug!(peer = ?self.peer, "read buffer full");
                return false;
            }
            match stream.read(&mut self.read_buf[self.read_idx..]) {
                Ok(0) => return false,
                Ok(n) => {
                    self.read_idx += n;
                    got_bytes = true;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::debug!(peer = ?self.peer, error = %e, "read failed");
                    return false;
                }
            }
        }

        if got_bytes && self.started_at.is_none() {
            self.started_at = Some(Instant::now());
        }
        true
    }

    /// Parsea lo leído y, si el request está completo, arma la respuesta
    pub fn process(&mut self, site: &Site, db: &DbConnection) -> ProcessOutcome {
        let mut code = self.process_read();
        if code == HttpCode::ReadyForDispatch {
            code = self.do_request(site, db);
        }
        if code == HttpCode::IncompleteRequest {
            return ProcessOutcome::NeedInput;
        }
        if !self.process_write(code) {
            return ProcessOutcome::Abort;
        }
        ProcessOutcome::ReadyToWrite
    }

    /// Máquina de estados principal sobre el buffer de lectura
    fn process_read(&mut self) -> HttpCode {
        loop {
            if self.check_state == CheckState::AwaitingBody {
                return match self.parse_content() {
                    true => HttpCode::ReadyForDispatch,
                    false => HttpCode::IncompleteRequest,
                };
            }

            match request::parse_line(&self.read_buf, &mut self.checked_idx, self.read_idx) {
                LineStatus::Open if self.read_idx >= self.read_buf.len() => {
                    tracing::debug!(peer = ?self.peer, "request head exceeds read buffer");
                    return HttpCode::MalformedRequest;
                }
                LineStatus::Open => return HttpCode::IncompleteRequest,
                LineStatus::Bad => return HttpCode::MalformedRequest,
                LineStatus::Ok => {}
            }

            let line_end = self.checked_idx - 2;
            let Ok(line) = std::str::from_utf8(&self.read_buf[self.start_line..line_end]) else {
                return HttpCode::MalformedRequest;
            };
            self.start_line = self.checked_idx;

            match self.check_state {
                CheckState::AwaitingRequestLine => {
                    if !request::parse_request_line(line, &mut self.request) {
                        return HttpCode::MalformedRequest;
                    }
                    tracing::debug!(
                        method = self.request.method.as_str(),
                        url = %self.request.url,
                        peer = ?self.peer,
                        "request line"
                    );
                    self.check_state = CheckState::AwaitingHeaders;
                }
                CheckState::AwaitingHeaders => {
                    let room = READ_BUFFER_SIZE - self.checked_idx;
                    match request::parse_header(line, &mut self.request, room) {
                        HeaderStatus::More => {}
                        HeaderStatus::Complete => return HttpCode::ReadyForDispatch,
                        HeaderStatus::ExpectBody => {
                            // El cuerpo tiene que caber detrás de los headers
                            if self.request.content_length > room {
                                tracing::debug!(
                                    content_length = self.request.content_length,
                                    room,
                                    "body exceeds read buffer"
                                );
                                return HttpCode::MalformedRequest;
                            }
                            self.check_state = CheckState::AwaitingBody;
                        }
                        HeaderStatus::Bad => return HttpCode::MalformedRequest,
                    }
                }
                CheckState::AwaitingBody => {}
            }
        }
    }

    /// `true` cuando el buffer ya contiene el cuerpo completo
    fn parse_content(&mut self) -> bool {
        let end = self.checked_idx + self.request.content_length;
        if self.read_idx < end {
            return false;
        }
        self.request.body = self.read_buf[self.checked_idx..end].to_vec();
        true
    }

    /// Resuelve el archivo pedido y lo mapea
    fn do_request(&mut self, site: &Site, db: &DbConnection) -> HttpCode {
        let Some(page) = site.select_page(&self.request, db) else {
            return HttpCode::MalformedRequest;
        };
        self.real_file = site.real_path(&page);

        let meta = match fs::metadata(&self.real_file) {
            Ok(meta) => meta,
            Err(_) => return HttpCode::ResourceMissing,
        };
        if meta.permissions().mode() & S_IROTH == 0 {
            return HttpCode::ResourceForbidden;
        }
        if meta.is_dir() {
            return HttpCode::MalformedRequest;
        }

        if meta.len() > 0 {
            match MappedFile::open(&self.real_file) {
                Ok(file) => self.file = Some(file),
                Err(e) => {
                    tracing::warn!(path = %self.real_file.display(), error = %e, "mmap failed");
                    return HttpCode::InternalFault;
                }
            }
        }
        HttpCode::ResourceFound
    }

    /// Arma headers y cuerpo según el resultado. Retorna `false` si no
    /// caben en el buffer o el código no produce respuesta.
    fn process_write(&mut self, code: HttpCode) -> bool {
        let status = match code {
            HttpCode::InternalFault => StatusCode::InternalServerError,
            HttpCode::MalformedRequest => StatusCode::BadRequest,
            HttpCode::ResourceForbidden => StatusCode::Forbidden,
            HttpCode::ResourceMissing => StatusCode::NotFound,
            HttpCode::ResourceFound => StatusCode::Ok,
            HttpCode::IncompleteRequest | HttpCode::ReadyForDispatch => return false,
        };

        // Tras un request malformado el buffer no es confiable
        if status == StatusCode::BadRequest {
            self.request.keep_alive = false;
        }
        self.status = Some(status);
        let keep_alive = self.request.keep_alive;

        let body = match (status, &self.file) {
            (StatusCode::Ok, Some(file)) => {
                let file_len = file.len();
                if !(self.write_buf.add_status_line(status)
                    && self.write_buf.add_headers(file_len, keep_alive))
                {
                    return false;
                }
                self.bytes_to_send = self.write_buf.len() + file_len;
                return true;
            }
            (StatusCode::Ok, None) => EMPTY_PAGE,
            (other, _) => other.canned_body().unwrap_or_default(),
        };

        if !(self.write_buf.add_status_line(status)
            && self.write_buf.add_headers(body.len(), keep_alive)
            && self.write_buf.add_content(body))
        {
            return false;
        }
        self.bytes_to_send = self.write_buf.len();
        true
    }

    /// Envía headers y archivo con `writev`, retomando donde quedó
    pub fn write(&mut self) -> WriteOutcome {
        let Some(fd) = self.fd() else {
            return WriteOutcome::Failed;
        };

        if self.bytes_to_send == 0 {
            // Nada que enviar: volver a esperar un request
            self.reset();
            return WriteOutcome::Complete(ResponseSummary {
                status: None,
                bytes: 0,
                keep_alive: true,
                latency: None,
            });
        }

        while self.bytes_have_send < self.bytes_to_send {
            let header = self.write_buf.as_bytes();
            let body = self.file.as_ref().map(|f| f.as_slice()).unwrap_or_default();

            let result = if self.bytes_have_send < header.len() {
                sys::writev(fd, &[&header[self.bytes_have_send..], body])
            } else {
                sys::writev(fd, &[&body[self.bytes_have_send - header.len()..]])
            };

            match result {
                Ok(0) => {
                    self.file = None;
                    return WriteOutcome::Failed;
                }
                Ok(n) => self.bytes_have_send += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return WriteOutcome::Pending,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::debug!(peer = ?self.peer, error = %e, "write failed");
                    self.file = None;
                    return WriteOutcome::Failed;
                }
            }
        }

        let summary = ResponseSummary {
            status: self.status,
            bytes: self.bytes_have_send,
            keep_alive: self.request.keep_alive,
            latency: self.started_at.map(|t| t.elapsed()),
        };
        tracing::debug!(
            status = ?summary.status.map(|s| s.as_u16()),
            bytes = summary.bytes,
            keep_alive = summary.keep_alive,
            peer = ?self.peer,
            "response sent"
        );

        self.file = None;
        if summary.keep_alive {
            self.reset();
        }
        WriteOutcome::Complete(summary)
    }
}

impl Default for HttpConn {
    fn default() -> Self {
        Self::new()
    }
}
