//! # Contexto del Sitio
//! src/http/site.rs
//!
//! Todo lo inmutable que necesita un worker para resolver un request:
//! raíz de documentos y tabla de credenciales. Aquí viven también las
//! convenciones de páginas del sitio:
//!
//! | Último segmento | Método | Página servida                         |
//! |-----------------|--------|----------------------------------------|
//! | `0...`          | any    | `register.html`                        |
//! | `1...`          | any    | `log.html`                             |
//! | `2...`          | POST   | `welcome.html` / `logError.html`       |
//! | `3...`          | POST   | `log.html` / `registerError.html`      |
//! | otro            | any    | el path pedido, bajo la raíz           |

use super::request::{Method, Request};
use crate::db::{CredentialStore, DbConnection};
use serde::Deserialize;
use std::ffi::OsString;
use std::path::PathBuf;
use std::sync::Arc;

pub const REGISTER_PAGE: &str = "/register.html";
pub const LOGIN_PAGE: &str = "/log.html";
pub const WELCOME_USER_PAGE: &str = "/welcome.html";
pub const LOGIN_ERROR_PAGE: &str = "/logError.html";
pub const REGISTER_ERROR_PAGE: &str = "/registerError.html";

/// Cuerpo de los formularios de login y registro
#[derive(Debug, Deserialize)]
struct CredentialForm {
    user: String,
    password: String,
}

pub struct Site {
    doc_root: PathBuf,
    credentials: Arc<CredentialStore>,
}

impl Site {
    pub fn new(doc_root: impl Into<PathBuf>, credentials: Arc<CredentialStore>) -> Self {
        Self {
            doc_root: doc_root.into(),
            credentials,
        }
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// Elige el documento a servir para `req`.
    ///
    /// Retorna `None` si el formulario de un POST no se puede decodificar.
    pub fn select_page(&self, req: &Request, db: &DbConnection) -> Option<String> {
        let selector = req
            .url
            .rfind('/')
            .and_then(|pos| req.url[pos + 1..].chars().next());

        match (req.method, selector) {
            (Method::POST, Some('2')) => {
                let form = decode_form(&req.body)?;
                if self.credentials.verify(&form.user, &form.password) {
                    Some(WELCOME_USER_PAGE.to_string())
                } else {
                    tracing::debug!(user = %form.user, "login rejected");
                    Some(LOGIN_ERROR_PAGE.to_string())
                }
            }
            (Method::POST, Some('3')) => {
                let form = decode_form(&req.body)?;
                match self.credentials.register(db, &form.user, &form.password) {
                    Ok(true) => {
                        tracing::info!(user = %form.user, conn = db.id(), "user registered");
                        Some(LOGIN_PAGE.to_string())
                    }
                    Ok(false) => Some(REGISTER_ERROR_PAGE.to_string()),
                    Err(e) => {
                        tracing::warn!(user = %form.user, error = %e, "registration failed");
                        Some(REGISTER_ERROR_PAGE.to_string())
                    }
                }
            }
            (_, Some('0')) => Some(REGISTER_PAGE.to_string()),
            (_, Some('1')) => Some(LOGIN_PAGE.to_string()),
            _ => Some(req.url.clone()),
        }
    }

    /// Concatena la raíz y el path pedido, sin normalizar
    pub fn real_path(&self, page: &str) -> PathBuf {
        let mut path = OsString::from(self.doc_root.as_os_str());
        path.push(page);
        PathBuf::from(path)
    }
}

fn decode_form(body: &[u8]) -> Option<CredentialForm> {
    match serde_urlencoded::from_bytes::<CredentialForm>(body) {
        Ok(form) => Some(form),
        Err(e) => {
            tracing::debug!(error = %e, "malformed credential form");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{ConnectionPool, Database};
    use tempfile::TempDir;

    fn setup(dir: &TempDir) -> (Site, crate::pool::ResourcePool<DbConnection>) {
        let db = Arc::new(Database::open(dir.path().join("users.json")).unwrap());
        let pool = ConnectionPool::init(db, 1).unwrap();
        let site = Site::new("/srv/www", Arc::new(CredentialStore::new()));
        (site, pool)
    }

    fn request(method: Method, url: &str, body: &str) -> Request {
        Request {
            method,
            url: url.to_string(),
            body: body.as_bytes().to_vec(),
            ..Request::default()
        }
    }

    #[test]
    fn test_static_pages() {
        let dir = TempDir::new().unwrap();
        let (site, pool) = setup(&dir);
        let db = pool.lease();

        let page = |m, u| site.select_page(&request(m, u, ""), &db).unwrap();
        assert_eq!(page(Method::GET, "/0"), REGISTER_PAGE);
        assert_eq!(page(Method::GET, "/1"), LOGIN_PAGE);
        assert_eq!(page(Method::GET, "/docs/a.html"), "/docs/a.html");
        // Sin POST, 2 y 3 son paths normales
        assert_eq!(page(Method::GET, "/2"), "/2");
    }

    #[test]
    fn test_register_then_login() {
        let dir = TempDir::new().unwrap();
        let (site, pool) = setup(&dir);
        let db = pool.lease();

        let post = |u, b| site.select_page(&request(Method::POST, u, b), &db);
        assert_eq!(post("/2CGISQL.cgi", "user=ana&password=pw").unwrap(), LOGIN_ERROR_PAGE);
        assert_eq!(post("/3CGISQL.cgi", "user=ana&password=pw").unwrap(), LOGIN_PAGE);
        assert_eq!(post("/3CGISQL.cgi", "user=ana&password=x").unwrap(), REGISTER_ERROR_PAGE);
        assert_eq!(post("/2CGISQL.cgi", "user=ana&password=pw").unwrap(), WELCOME_USER_PAGE);
        assert_eq!(post("/2CGISQL.cgi", "user=ana&password=no").unwrap(), LOGIN_ERROR_PAGE);
    }

    #[test]
    fn test_malformed_form() {
        let dir = TempDir::new().unwrap();
        let (site, pool) = setup(&dir);
        let db = pool.lease();
        assert!(site
            .select_page(&request(Method::POST, "/2", "nothing-here"), &db)
            .is_none());
    }

    #[test]
    fn test_real_path_concatenates() {
        let dir = TempDir::new().unwrap();
        let (site, _) = setup(&dir);
        assert_eq!(site.real_path("/a/b.html"), PathBuf::from("/srv/www/a/b.html"));
    }
}
