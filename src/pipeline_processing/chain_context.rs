use crate::pipeline_processing::task_executor::{SerialExecutor, Task};
use parking_lot::{RwLock, RwLockReadGuard};
use std::sync::Arc;

/// Shared by the stages, the source and the sink of one effect chain.
///
/// Next to the executor it counts the chain-wide flushes that were started. Every
/// participant counts the flushes that reached it, as long as it has seen fewer
/// than were started it is flushing and must neither take new input nor emit output.
#[derive(Clone)]
pub struct ChainContext {
    executor: Arc<dyn SerialExecutor>,
    flushes_started: Arc<RwLock<u64>>,
}

impl ChainContext {
    pub fn new(executor: Arc<dyn SerialExecutor>) -> Self {
        Self { executor, flushes_started: Default::default() }
    }

    pub fn executor(&self) -> &Arc<dyn SerialExecutor> { &self.executor }

    pub fn submit(&self, task: Task) { self.executor.submit(task) }

    pub fn flushes_started(&self) -> u64 { *self.flushes_started.read() }

    pub fn start_flush(&self) -> u64 {
        let mut flushes_started = self.flushes_started.write();
        *flushes_started += 1;
        *flushes_started
    }

    /// No flush can start while the returned guard is alive.
    pub fn hold_flushes(&self) -> RwLockReadGuard<'_, u64> { self.flushes_started.read() }
}

/// The flush count of a participant after one more flush reached it. Flushes that were
/// not started through the context (a single link being flushed) are not counted.
pub fn count_flush(flushes_seen: u64, flushes_started: u64) -> u64 {
    (flushes_seen + 1).min(flushes_started)
}
