//! # Construcción de Respuestas HTTP
//! src/http/response.rs
//!
//! Los headers (y los cuerpos fijos de error) se escriben en un buffer de
//! capacidad fija. Cada append es todo o nada: si el texto formateado no
//! cabe, el buffer queda intacto y se retorna `false`.
//!
//! ## Formato
//!
//! ```text
//! HTTP/1.1 404 Not Found\r\n
//! Content-Length:49\r\n
//! Connection:close\r\n
//! \r\n
//! The requested file was not found on this server.\n
//! ```

use super::StatusCode;
use std::fmt;

/// Capacidad del buffer de escritura de cada conexión
pub const WRITE_BUFFER_SIZE: usize = 1024;

/// Cuerpo servido para archivos vacíos
pub const EMPTY_PAGE: &str = "<html><body></body></html>";

#[derive(Debug)]
pub struct WriteBuffer {
    buf: Vec<u8>,
    capacity: usize,
}

impl WriteBuffer {
    /// La memoria se reserva en el primer append
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: Vec::new(),
            capacity,
        }
    }

    /// Agrega texto formateado. Retorna `false` si no cabe.
    ///
    /// # Ejemplo
    /// ```
    /// use tiny_webserver::http::WriteBuffer;
    ///
    /// let mut buf = WriteBuffer::new(8);
    /// assert!(buf.append_fmt(format_args!("{}", 1234)));
    /// assert!(!buf.append_fmt(format_args!("{}", 56789)));
    /// assert_eq!(buf.as_bytes(), b"1234");
    /// ```
    pub fn append_fmt(&mut self, args: fmt::Arguments<'_>) -> bool {
        let text = fmt::format(args);
        if self.buf.len() + text.len() > self.capacity {
            tracing::warn!(
                used = self.buf.len(),
                needed = text.len(),
                "write buffer overflow"
            );
            return false;
        }
        if self.buf.capacity() == 0 {
            self.buf.reserve_exact(self.capacity);
        }
        self.buf.extend_from_slice(text.as_bytes());
        true
    }

    pub fn add_status_line(&mut self, status: StatusCode) -> bool {
        self.append_fmt(format_args!(
            "HTTP/1.1 {} {}\r\n",
            status.as_u16(),
            status.reason_phrase()
        ))
    }

    /// `Content-Length`, `Connection` y la línea en blanco
    pub fn add_headers(&mut self, content_len: usize, keep_alive: bool) -> bool {
        self.add_content_length(content_len)
            && self.add_connection(keep_alive)
            && self.add_blank_line()
    }

    pub fn add_content_length(&mut self, content_len: usize) -> bool {
        self.append_fmt(format_args!("Content-Length:{}\r\n", content_len))
    }

    pub fn add_connection(&mut self, keep_alive: bool) -> bool {
        let value = if keep_alive { "keep-alive" } else { "close" };
        self.append_fmt(format_args!("Connection:{}\r\n", value))
    }

    pub fn add_blank_line(&mut self) -> bool {
        self.append_fmt(format_args!("\r\n"))
    }

    pub fn add_content(&mut self, content: &str) -> bool {
        self.append_fmt(format_args!("{}", content))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Vacía el buffer conservando la memoria
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

impl Default for WriteBuffer {
    fn default() -> Self {
        Self::new(WRITE_BUFFER_SIZE)
    }
}
