//! # Timers de Inactividad
//! src/timer/mod.rs
//!
//! Heap mínimo de timers ordenado por instante de expiración. Lo muta solo
//! el thread del reactor; se usa para desalojar conexiones inactivas.

pub mod heap;

pub use heap::{Callback, Timer, TimerHeap, TimerId};
