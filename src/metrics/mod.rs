//! # Sistema de Métricas
//! src/metrics/mod.rs
//!
//! Contadores del servidor:
//! - Conexiones aceptadas, rechazadas por ocupación, cerradas y desalojadas
//! - Respuestas por código de estado y bytes enviados
//! - Latencias de respuesta (p50, p95, p99)

pub mod collector;

pub use collector::{CloseReason, LatencySummary, MetricsCollector, MetricsSnapshot};
