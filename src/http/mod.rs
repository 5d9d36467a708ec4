//! # Módulo HTTP
//! src/http/mod.rs
//!
//! Subconjunto de HTTP/1.1 implementado a mano, sin librerías de alto
//! nivel:
//!
//! - Métodos GET y POST
//! - Headers reconocidos: `Connection`, `Content-Length`, `Host`
//! - Cuerpo solo en POST (formularios de login y registro)
//! - Respuestas 200, 400, 403, 404 y 500
//!
//! El parser es incremental: un request puede llegar repartido en muchos
//! eventos de lectura y se retoma exactamente donde quedó.
//!
//! ### Formato de Response
//!
//! ```text
//! HTTP/1.1 200 OK\r\n
//! Content-Length:13\r\n
//! Connection:keep-alive\r\n
//! \r\n
//! <h1>hola</h1>
//! ```

pub mod conn;      // Máquina de estados por conexión
pub mod mmap;      // Archivos mapeados en memoria
pub mod request;   // Parsing incremental
pub mod response;  // Buffer de escritura acotado
pub mod site;      // Raíz de documentos y formularios
pub mod status;    // Códigos de estado HTTP

pub use conn::{HttpConn, ProcessOutcome, ResponseSummary, WriteOutcome, READ_BUFFER_SIZE};
pub use mmap::MappedFile;
pub use request::{CheckState, HttpCode, LineStatus, Method, Request};
pub use response::{WriteBuffer, WRITE_BUFFER_SIZE};
pub use site::Site;
pub use status::StatusCode;
