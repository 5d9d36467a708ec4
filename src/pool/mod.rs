//! # Pool de Recursos
//! src/pool/mod.rs
//!
//! Primitivas de sincronización compartidas por el pool de recursos del
//! backend y la cola de trabajo del pool de threads.

pub mod resource;
pub mod semaphore;

pub use resource::{Lease, ResourcePool};
pub use semaphore::Semaphore;
