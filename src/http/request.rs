//! # Parsing Incremental de Requests HTTP/1.1
//! src/http/request.rs
//!
//! El parser trabaja sobre el buffer de lectura de la conexión, que puede
//! llenarse en varios eventos de lectura. Hay dos máquinas de estado:
//!
//! 1. **Líneas**: `parse_line` busca `\r\n` desde el último índice revisado.
//!    Un `\r` al final del buffer significa "faltan bytes"; un `\n` suelto o
//!    un `\r` seguido de otra cosa es una línea malformada.
//! 2. **Request**: `AwaitingRequestLine -> AwaitingHeaders -> AwaitingBody`.
//!
//! ## Formato aceptado
//!
//! ```text
//! POST /2login HTTP/1.1\r\n
//! Host: localhost\r\n
//! Connection: keep-alive\r\n
//! Content-Length: 22\r\n
//! \r\n
//! user=ana&password=1234
//! ```

/// Documento servido cuando el path es exactamente `/`
pub const WELCOME_PAGE: &str = "judge.html";

/// Métodos HTTP soportados
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    #[default]
    GET,
    POST,
}

impl Method {
    /// Compara sin distinguir mayúsculas; cualquier otro método es inválido
    fn parse(s: &str) -> Option<Self> {
        if s.eq_ignore_ascii_case("GET") {
            Some(Method::GET)
        } else if s.eq_ignore_ascii_case("POST") {
            Some(Method::POST)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
        }
    }
}

/// Estado de la máquina principal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CheckState {
    #[default]
    AwaitingRequestLine,
    AwaitingHeaders,
    AwaitingBody,
}

/// Resultado de extraer una línea del buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStatus {
    /// Línea completa terminada en `\r\n`
    Ok,
    /// Terminador inválido
    Bad,
    /// Faltan bytes
    Open,
}

/// Resultado de procesar lo leído hasta ahora
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpCode {
    /// Faltan bytes para completar el request
    IncompleteRequest,
    /// Request completo, listo para resolver el recurso
    ReadyForDispatch,
    MalformedRequest,
    ResourceMissing,
    ResourceForbidden,
    /// Archivo encontrado (y mapeado si no está vacío)
    ResourceFound,
    InternalFault,
}

/// Campos del request extraídos por el parser
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    /// Path sin el prefijo `http://host` y con el documento de bienvenida
    /// sustituido
    pub url: String,
    pub version: String,
    pub host: Option<String>,
    /// `Connection: keep-alive`
    pub keep_alive: bool,
    pub content_length: usize,
    /// Cuerpo del POST (formulario URL-encoded)
    pub body: Vec<u8>,
}

/// Qué hacer después de una línea de header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderStatus {
    /// Seguir leyendo headers
    More,
    /// Línea vacía sin cuerpo: request completo
    Complete,
    /// Línea vacía con `Content-Length` positivo
    ExpectBody,
    Bad,
}

/// Extrae una línea de `buf[..read_idx]` empezando en `*checked_idx`.
///
/// Con `LineStatus::Ok`, `*checked_idx` queda justo después del `\n` y la
/// línea es `buf[start_line..*checked_idx - 2]`. Con `Open` el índice queda
/// donde hay que retomar el escaneo.
pub fn parse_line(buf: &[u8], checked_idx: &mut usize, read_idx: usize) -> LineStatus {
    while *checked_idx < read_idx {
        let idx = *checked_idx;
        match buf[idx] {
            b'\r' => {
                if idx + 1 == read_idx {
                    return LineStatus::Open;
                }
                if buf[idx + 1] == b'\n' {
                    *checked_idx += 2;
                    return LineStatus::Ok;
                }
                return LineStatus::Bad;
            }
            b'\n' => {
                if idx > 0 && buf[idx - 1] == b'\r' {
                    *checked_idx += 1;
                    return LineStatus::Ok;
                }
                return LineStatus::Bad;
            }
            _ => *checked_idx += 1,
        }
    }
    LineStatus::Open
}

/// Parte `s` en la primera secuencia de espacios/tabs
fn split_whitespace_once(s: &str) -> Option<(&str, &str)> {
    let pos = s.find([' ', '\t'])?;
    let rest = s[pos..].trim_start_matches([' ', '\t']);
    Some((&s[..pos], rest))
}

/// Quita un prefijo sin distinguir mayúsculas
fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    if s.len() >= prefix.len()
        && s.is_char_boundary(prefix.len())
        && s[..prefix.len()].eq_ignore_ascii_case(prefix)
    {
        Some(&s[prefix.len()..])
    } else {
        None
    }
}

/// Parsea `METHOD URL VERSION` sobre `req`.
///
/// Retorna `false` si la línea es inválida.
pub fn parse_request_line(line: &str, req: &mut Request) -> bool {
    let Some((method, rest)) = split_whitespace_once(line) else {
        return false;
    };
    let Some(method) = Method::parse(method) else {
        return false;
    };
    let Some((url, version)) = split_whitespace_once(rest) else {
        return false;
    };
    if !version.eq_ignore_ascii_case("HTTP/1.1") {
        return false;
    }

    // http://host/path -> /path
    let mut url = url;
    for scheme in ["http://", "https://"] {
        if let Some(without) = strip_prefix_ignore_case(url, scheme) {
            url = match without.find('/') {
                Some(pos) => &without[pos..],
                None => "",
            };
            break;
        }
    }
    if !url.starts_with('/') {
        return false;
    }

    req.method = method;
    req.version = version.to_string();
    req.url = if url == "/" {
        format!("/{}", WELCOME_PAGE)
    } else {
        url.to_string()
    };
    true
}

/// Parsea una línea de header. Solo se reconocen `Connection`,
/// `Content-Length` y `Host`; el resto se ignora.
///
/// `max_body` acota el `Content-Length` aceptable.
pub fn parse_header(line: &str, req: &mut Request, max_body: usize) -> HeaderStatus {
    if line.is_empty() {
        return if req.content_length > 0 {
            HeaderStatus::ExpectBody
        } else {
            HeaderStatus::Complete
        };
    }

    if let Some(value) = strip_prefix_ignore_case(line, "Connection:") {
        if value.trim_start_matches([' ', '\t']).eq_ignore_ascii_case("keep-alive") {
            req.keep_alive = true;
        }
    } else if let Some(value) = strip_prefix_ignore_case(line, "Content-Length:") {
        match value.trim().parse::<usize>() {
            Ok(len) if len <= max_body => req.content_length = len,
            Ok(len) => {
                tracing::debug!(content_length = len, "content length exceeds read buffer");
                return HeaderStatus::Bad;
            }
            Err(_) => return HeaderStatus::Bad,
        }
    } else if let Some(value) = strip_prefix_ignore_case(line, "Host:") {
        req.host = Some(value.trim_start_matches([' ', '\t']).to_string());
    } else {
        tracing::trace!(header = line, "unknown header");
    }
    HeaderStatus::More
}
