//! Liveness tracking across callbacks
//!
//! A callback into user code may destroy the connection that invoked it.
//! The connection itself stays allocated for as long as any handle exists,
//! but once destroyed it must not produce further side effects. Code that
//! continues after a callback holds a [`Monitor`] and checks it first.

use std::{cell::Cell, rc::Rc};

/// The watched side, owned by the object whose lifetime is tracked
#[derive(Debug)]
pub struct Watchable {
    alive: Rc<Cell<bool>>,
}

impl Default for Watchable {
    fn default() -> Self {
        Self::new()
    }
}

impl Watchable {
    /// Creates a live watchable
    pub fn new() -> Self {
        Self {
            alive: Rc::new(Cell::new(true)),
        }
    }

    /// Creates a monitor on this watchable
    pub fn monitor(&self) -> Monitor {
        Monitor {
            alive: Rc::clone(&self.alive),
        }
    }

    /// Whether the watched object is still alive
    pub fn is_alive(&self) -> bool {
        self.alive.get()
    }

    /// Marks the watched object as destroyed. Every monitor created before or
    /// after this call reports invalid.
    pub fn invalidate(&self) {
        self.alive.set(false);
    }
}

/// Observes a [`Watchable`]
#[derive(Debug, Clone)]
pub struct Monitor {
    alive: Rc<Cell<bool>>,
}

impl Monitor {
    /// Whether the watched object still exists
    pub fn is_valid(&self) -> bool {
        self.alive.get()
    }
}
