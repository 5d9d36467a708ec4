//! # Heap Mínimo de Timers
//! src/timer/heap.rs
//!
//! Arreglo binario ordenado por `expire`: cada nodo expira no después que
//! sus hijos. Las operaciones siguen el esquema clásico:
//!
//! - `add_timer`: push al final + filtrado hacia arriba, O(log n)
//! - `del_timer`: borrado perezoso, solo se quita el callback
//! - `adjust`: búsqueda por identidad (O(n)) y re-filtrado
//! - `tick`: dispara y saca todos los timers vencidos de la raíz
//!
//! Los timers se identifican con un `TimerId` propio y nunca por su
//! posición, que cambia con cada filtrado.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Acción a ejecutar cuando vence un timer. Recibe los datos de usuario
/// del timer y no puede tocar el heap.
pub type Callback<T> = Box<dyn FnMut(&T) + Send>;

/// Handle estable de un timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

/// Nodo del heap
#[derive(Debug)]
pub struct Timer<T> {
    pub id: TimerId,
    /// Instante absoluto de expiración
    pub expire: Instant,
    pub user_data: T,
}

pub struct TimerHeap<T> {
    array: Vec<Timer<T>>,
    capacity: usize,
    /// Callbacks vivos. Un timer sin entrada aquí fue borrado de forma
    /// perezosa y se descarta sin efecto al salir del heap.
    callbacks: HashMap<TimerId, Callback<T>>,
    next_id: u64,
}

impl<T> TimerHeap<T> {
    /// Crea un heap vacío con capacidad inicial `cap` (mínimo 1)
    pub fn new(cap: usize) -> Self {
        let capacity = cap.max(1);
        Self {
            array: Vec::with_capacity(capacity),
            capacity,
            callbacks: HashMap::new(),
            next_id: 0,
        }
    }

    /// Agrega un timer y retorna su handle
    pub fn add_timer(&mut self, expire: Instant, user_data: T, callback: Callback<T>) -> TimerId {
        if self.array.len() >= self.capacity {
            self.resize();
        }

        let id = TimerId(self.next_id);
        self.next_id += 1;

        self.callbacks.insert(id, callback);
        self.array.push(Timer { id, expire, user_data });
        self.percolate_up(self.array.len() - 1);
        id
    }

    /// Borrado perezoso: el nodo queda en su sitio y su callback desaparece.
    ///
    /// Retorna `false` si el timer ya no estaba activo.
    pub fn del_timer(&mut self, id: TimerId) -> bool {
        self.callbacks.remove(&id).is_some()
    }

    /// `true` si el timer sigue en el heap con su callback
    pub fn is_active(&self, id: TimerId) -> bool {
        self.callbacks.contains_key(&id)
    }

    /// Cambia la expiración de un timer y restaura el orden del heap.
    ///
    /// La búsqueda es lineal; retorna `false` si el timer no está en el heap.
    pub fn adjust(&mut self, id: TimerId, expire: Instant) -> bool {
        let Some(hole) = self.find(id) else {
            return false;
        };

        let old = self.array[hole].expire;
        self.array[hole].expire = expire;
        if expire < old {
            self.percolate_up(hole);
        } else {
            self.percolate_down(hole);
        }
        true
    }

    /// Timer de la raíz (el próximo en vencer)
    pub fn top(&self) -> Option<&Timer<T>> {
        self.array.first()
    }

    /// Saca la raíz del heap, descartando su callback
    pub fn pop_timer(&mut self) -> Option<Timer<T>> {
        let timer = self.remove_root()?;
        self.callbacks.remove(&timer.id);
        Some(timer)
    }

    /// Dispara los callbacks de todos los timers vencidos en `now` y los
    /// saca del heap. Los borrados perezosamente salen sin efecto.
    ///
    /// Retorna cuántos callbacks se ejecutaron.
    pub fn tick(&mut self, now: Instant) -> usize {
        let mut fired = 0;
        while let Some(root) = self.array.first() {
            if root.expire > now {
                break;
            }
            let Some(timer) = self.remove_root() else {
                break;
            };
            if let Some(mut callback) = self.callbacks.remove(&timer.id) {
                callback(&timer.user_data);
                fired += 1;
            }
        }
        fired
    }

    /// Tiempo hasta que vence la raíz (cero si ya venció)
    pub fn next_timeout(&self, now: Instant) -> Option<Duration> {
        self.top().map(|t| t.expire.saturating_duration_since(now))
    }

    /// Nodos en el heap, incluidos los borrados perezosamente
    pub fn len(&self) -> usize {
        self.array.len()
    }

    pub fn is_empty(&self) -> bool {
        self.array.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Verifica la propiedad de heap en todo el arreglo
    pub fn satisfies_heap_property(&self) -> bool {
        (1..self.array.len()).all(|i| self.array[(i - 1) / 2].expire <= self.array[i].expire)
    }

    fn find(&self, id: TimerId) -> Option<usize> {
        self.array.iter().position(|t| t.id == id)
    }

    fn remove_root(&mut self) -> Option<Timer<T>> {
        if self.array.is_empty() {
            return None;
        }
        // El último elemento pasa a la raíz y se filtra hacia abajo
        let timer = self.array.swap_remove(0);
        if !self.array.is_empty() {
            self.percolate_down(0);
        }
        Some(timer)
    }

    fn percolate_up(&mut self, mut hole: usize) {
        while hole > 0 {
            let parent = (hole - 1) / 2;
            if self.array[parent].expire <= self.array[hole].expire {
                break;
            }
            self.array.swap(parent, hole);
            hole = parent;
        }
    }

    /// Asegura que el subárbol con raíz en `hole` sea un heap mínimo
    fn percolate_down(&mut self, mut hole: usize) {
        let len = self.array.len();
        loop {
            let mut child = hole * 2 + 1;
            if child >= len {
                break;
            }
            if child + 1 < len && self.array[child + 1].expire < self.array[child].expire {
                child += 1;
            }
            if self.array[child].expire < self.array[hole].expire {
                self.array.swap(hole, child);
                hole = child;
            } else {
                break;
            }
        }
    }

    /// Duplica la capacidad del arreglo
    fn resize(&mut self) {
        let new_capacity = self.capacity * 2;
        self.array.reserve_exact(new_capacity - self.array.len());
        self.capacity = new_capacity;
    }
}

impl<T> Default for TimerHeap<T> {
    fn default() -> Self {
        Self::new(64)
    }
}
