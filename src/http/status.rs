//! # Códigos de Estado HTTP
//! src/http/status.rs
//!
//! Los cinco códigos que produce el servidor. Cada error lleva un cuerpo
//! fijo que se copia al buffer de escritura; solo `200` sirve un archivo.

/// Códigos de estado que puede devolver el servidor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    /// 200 OK - Archivo encontrado y mapeado
    Ok = 200,

    /// 400 Bad Request - Request malformado o directorio pedido
    BadRequest = 400,

    /// 403 Forbidden - Sin permiso de lectura para otros
    Forbidden = 403,

    /// 404 Not Found - El archivo no existe
    NotFound = 404,

    /// 500 Internal Server Error - Fallo interno al servir
    InternalServerError = 500,
}

impl StatusCode {
    /// Convierte el código a su valor numérico
    ///
    /// # Ejemplo
    /// ```
    /// use tiny_webserver::http::StatusCode;
    /// assert_eq!(StatusCode::Forbidden.as_u16(), 403);
    /// ```
    pub fn as_u16(&self) -> u16 {
        *self as u16
    }

    /// Texto de razón de la línea de estado
    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::Forbidden => "Forbidden",
            StatusCode::NotFound => "Not Found",
            StatusCode::InternalServerError => "Internal Error",
        }
    }

    /// Cuerpo fijo de las respuestas de error (`None` para 200)
    pub fn canned_body(&self) -> Option<&'static str> {
        match self {
            StatusCode::Ok => None,
            StatusCode::BadRequest => Some(
                "Your request has bad syntax or is inherently impossible to staisfy.\n",
            ),
            StatusCode::Forbidden => {
                Some("You do not have permission to get file form this server.\n")
            }
            StatusCode::NotFound => Some("The requested file was not found on this server.\n"),
            StatusCode::InternalServerError => {
                Some("There was an unusual problem serving the request file.\n")
            }
        }
    }
}

impl std::fmt::Display for StatusCode {
    /// Formato: "404 Not Found"
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.as_u16(), self.reason_phrase())
    }
}
