//! # Backend de Usuarios
//! src/db/mod.rs
//!
//! Colaborador externo del servidor: una tabla de usuarios en disco, un
//! pool acotado de handles y la caché de credenciales usada por los
//! formularios de login y registro.

pub mod connection;
pub mod credentials;
pub mod database;

pub use connection::{ConnectionPool, DbConnection};
pub use credentials::CredentialStore;
pub use database::{hash_password, Database, UserRecord};
