//! Bounded pool of `rhai` interpreters.
//!
//! `acquire()` blocks (via a semaphore) when the pool is saturated, handing
//! out an idle engine or a fresh clone of the template when none is idle.
//! Disposed engines (timed-out or post-close) are simply dropped rather
//! than recycled.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rhai::Engine;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};

/// An interpreter checked out from the pool, along with the capacity
/// permit that must be held for its lifetime.
pub struct PooledInterpreter {
    pub engine: Engine,
    permit: OwnedSemaphorePermit,
}

impl PooledInterpreter {
    /// Split into its parts so the engine can be moved into a
    /// `spawn_blocking` closure while the permit stays put; reassemble
    /// with [`Self::from_parts`] once the run completes.
    pub fn into_parts(self) -> (Engine, OwnedSemaphorePermit) {
        (self.engine, self.permit)
    }

    pub fn from_parts(engine: Engine, permit: OwnedSemaphorePermit) -> Self {
        Self { engine, permit }
    }
}

pub struct ScriptPool {
    template: Engine,
    idle: Mutex<Vec<Engine>>,
    semaphore: Arc<Semaphore>,
    closed: AtomicBool,
}

impl ScriptPool {
    pub fn new(template: Engine, capacity: usize) -> Self {
        Self {
            template,
            idle: Mutex::new(Vec::with_capacity(capacity)),
            semaphore: Arc::new(Semaphore::new(capacity)),
            closed: AtomicBool::new(false),
        }
    }

    /// Check out an interpreter, blocking until capacity is available.
    pub async fn acquire(&self) -> PooledInterpreter {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("script pool semaphore never closed");

        let engine = {
            let mut idle = self.idle.lock().await;
            idle.pop()
        }
        .unwrap_or_else(|| self.template.clone());

        PooledInterpreter { engine, permit }
    }

    /// Return a healthy interpreter to the pool. After [`Self::close`] this
    /// disposes it instead.
    pub async fn release(&self, interpreter: PooledInterpreter) {
        if self.closed.load(Ordering::Relaxed) {
            drop(interpreter);
            return;
        }
        let mut idle = self.idle.lock().await;
        idle.push(interpreter.engine);
        drop(interpreter.permit);
    }

    /// Dispose an interpreter that faulted (timed out or errored) instead
    /// of returning it to the idle set.
    pub fn dispose(&self, interpreter: PooledInterpreter) {
        drop(interpreter);
    }

    /// Stop accepting returns and drop every idle interpreter.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
        self.idle.lock().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_reuses_released_engine() {
        let pool = ScriptPool::new(Engine::new(), 1);
        let first = pool.acquire().await;
        pool.release(first).await;
        let _second = pool.acquire().await;
    }

    #[tokio::test]
    async fn close_disposes_idle_engines() {
        let pool = ScriptPool::new(Engine::new(), 2);
        let i = pool.acquire().await;
        pool.release(i).await;
        pool.close().await;
        assert!(pool.idle.lock().await.is_empty());
    }
}
