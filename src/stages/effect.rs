use crate::pipeline_processing::frame::TextureInfo;
use anyhow::Result;
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};
use tracing::info;

/// The transformation a stage applies to each frame. Implementations are opaque to the
/// pipeline, it only cares whether they succeeded.
pub trait Effect: Send + Sync {
    fn apply(&self, input: &TextureInfo, output: &TextureInfo, presentation_time_us: i64)
        -> Result<()>;

    fn on_end_of_stream(&self) {}
}

impl<E: Effect + ?Sized> Effect for Arc<E> {
    fn apply(
        &self,
        input: &TextureInfo,
        output: &TextureInfo,
        presentation_time_us: i64,
    ) -> Result<()> {
        (**self).apply(input, output, presentation_time_us)
    }

    fn on_end_of_stream(&self) { (**self).on_end_of_stream() }
}

pub struct Passthrough;

impl Effect for Passthrough {
    fn apply(&self, _input: &TextureInfo, _output: &TextureInfo, _: i64) -> Result<()> { Ok(()) }
}

/// Counts the frames it sees and reports the count of every finished stream.
pub struct FrameCounter {
    name: String,
    total: AtomicU64,
    in_stream: AtomicU64,
}

impl FrameCounter {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string(), total: AtomicU64::new(0), in_stream: AtomicU64::new(0) }
    }

    pub fn total(&self) -> u64 { self.total.load(Ordering::Relaxed) }
}

impl Effect for FrameCounter {
    fn apply(&self, _input: &TextureInfo, _output: &TextureInfo, _: i64) -> Result<()> {
        self.total.fetch_add(1, Ordering::Relaxed);
        self.in_stream.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn on_end_of_stream(&self) {
        let frames = self.in_stream.swap(0, Ordering::Relaxed);
        info!("{}: {} frames in stream", self.name, frames);
    }
}

/// Blocks the frame processing thread for a fixed time per frame, standing in for GPU work.
pub struct SimulatedLoad {
    pub duration: Duration,
}

impl Effect for SimulatedLoad {
    fn apply(&self, _input: &TextureInfo, _output: &TextureInfo, _: i64) -> Result<()> {
        thread::sleep(self.duration);
        Ok(())
    }
}
