//! # Collector de Métricas
//! src/metrics/collector.rs
//!
//! Recolecta contadores de conexiones y respuestas en tiempo real. Lo
//! alimentan el reactor (accept, cierre, escritura) y el callback de los
//! timers (desalojo por inactividad).

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Motivo por el que se cerró una conexión
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// El peer cerró o hubo un error de socket
    PeerClosed,
    /// Respuesta terminada sin keep-alive
    Completed,
    /// Timer de inactividad vencido
    Idle,
    /// Cola de trabajo llena
    QueueFull,
    /// Fallo de escritura
    WriteFailed,
    /// Parada del servidor
    Shutdown,
}

/// Collector de métricas thread-safe
#[derive(Clone)]
pub struct MetricsCollector {
    inner: Arc<Mutex<MetricsData>>,
    start_time: Instant,
}

/// Datos internos de métricas
struct MetricsData {
    accepted: u64,
    busy_rejections: u64,
    closed: u64,
    idle_evictions: u64,
    queue_rejections: u64,

    /// Respuestas por código de estado
    status_codes: BTreeMap<u16, u64>,

    /// Bytes de respuesta enviados (headers + cuerpo)
    bytes_sent: u64,

    /// Latencias de respuesta registradas (en microsegundos)
    latencies: Vec<u64>,

    /// Máximo de latencias a guardar (para calcular percentiles)
    max_latencies: usize,
}

/// Foto de las métricas, serializable a JSON
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub accepted: u64,
    pub busy_rejections: u64,
    pub closed: u64,
    pub idle_evictions: u64,
    pub queue_rejections: u64,
    pub responses: u64,
    pub status_codes: BTreeMap<u16, u64>,
    pub bytes_sent: u64,
    pub latency_us: LatencySummary,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct LatencySummary {
    pub p50: u64,
    pub p95: u64,
    pub p99: u64,
    pub avg: u64,
    pub samples: usize,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MetricsData {
                accepted: 0,
                busy_rejections: 0,
                closed: 0,
                idle_evictions: 0,
                queue_rejections: 0,
                status_codes: BTreeMap::new(),
                bytes_sent: 0,
                latencies: Vec::with_capacity(10000),
                max_latencies: 10000, // Guardar últimas 10k latencias
            })),
            start_time: Instant::now(),
        }
    }

    pub fn record_accept(&self) {
        self.data().accepted += 1;
    }

    /// Conexión rechazada por el tope de conexiones vivas
    pub fn record_busy(&self) {
        self.data().busy_rejections += 1;
    }

    pub fn record_close(&self, reason: CloseReason) {
        let mut data = self.data();
        data.closed += 1;
        match reason {
            CloseReason::Idle => data.idle_evictions += 1,
            CloseReason::QueueFull => data.queue_rejections += 1,
            _ => {}
        }
    }

    /// Registra una respuesta enviada por completo
    pub fn record_response(&self, status_code: u16, bytes: usize, latency: Option<Duration>) {
        let mut data = self.data();
        *data.status_codes.entry(status_code).or_insert(0) += 1;
        data.bytes_sent += bytes as u64;

        if let Some(latency) = latency {
            // Si tenemos demasiadas latencias, eliminar las más antiguas
            if data.latencies.len() >= data.max_latencies {
                data.latencies.remove(0);
            }
            data.latencies.push(latency.as_micros() as u64);
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let data = self.data();
        MetricsSnapshot {
            uptime_secs: self.start_time.elapsed().as_secs(),
            accepted: data.accepted,
            busy_rejections: data.busy_rejections,
            closed: data.closed,
            idle_evictions: data.idle_evictions,
            queue_rejections: data.queue_rejections,
            responses: data.status_codes.values().sum(),
            status_codes: data.status_codes.clone(),
            bytes_sent: data.bytes_sent,
            latency_us: calculate_percentiles(&data.latencies),
        }
    }

    /// Snapshot en JSON
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(&self.snapshot()).unwrap_or_else(|_| "{}".to_string())
    }

    fn data(&self) -> MutexGuard<'_, MetricsData> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Calcula percentiles de latencia
fn calculate_percentiles(latencies: &[u64]) -> LatencySummary {
    if latencies.is_empty() {
        return LatencySummary::default();
    }

    let mut sorted = latencies.to_vec();
    sorted.sort_unstable();

    let len = sorted.len();
    let sum: u64 = sorted.iter().sum();

    LatencySummary {
        p50: sorted[len * 50 / 100],
        p95: sorted[len * 95 / 100],
        p99: sorted[len * 99 / 100],
        avg: sum / len as u64,
        samples: len,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_counters() {
        let metrics = MetricsCollector::new();
        metrics.record_accept();
        metrics.record_accept();
        metrics.record_busy();
        metrics.record_close(CloseReason::Idle);
        metrics.record_close(CloseReason::Completed);

        let snap = metrics.snapshot();
        assert_eq!(snap.accepted, 2);
        assert_eq!(snap.busy_rejections, 1);
        assert_eq!(snap.closed, 2);
        assert_eq!(snap.idle_evictions, 1);
        assert_eq!(snap.queue_rejections, 0);
    }

    #[test]
    fn test_responses_and_percentiles() {
        let metrics = MetricsCollector::new();
        for i in 1..=100u64 {
            metrics.record_response(200, 10, Some(Duration::from_micros(i)));
        }
        metrics.record_response(404, 5, None);

        let snap = metrics.snapshot();
        assert_eq!(snap.responses, 101);
        assert_eq!(snap.status_codes[&200], 100);
        assert_eq!(snap.status_codes[&404], 1);
        assert_eq!(snap.bytes_sent, 1005);
        assert_eq!(snap.latency_us.samples, 100);
        assert_eq!(snap.latency_us.p50, 51);
        assert_eq!(snap.latency_us.p99, 100);
    }

    #[test]
    fn test_to_json_is_valid() {
        let metrics = MetricsCollector::new();
        metrics.record_response(403, 0, None);

        let value: serde_json::Value = serde_json::from_str(&metrics.to_json()).unwrap();
        assert_eq!(value["status_codes"]["403"], 1);
        assert_eq!(value["latency_us"]["samples"], 0);
    }
}
