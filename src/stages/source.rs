use crate::{
    pipeline_processing::{
        chain_context::{count_flush, ChainContext},
        frame::TextureInfo,
        shader_program::{FrameProducer, OutputListener, ProducingStage},
    },
    util::error::StageError,
};
use anyhow::Result;
use parking_lot::{Condvar, Mutex};
use std::{
    collections::VecDeque,
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::debug;

struct Pool {
    free: VecDeque<TextureInfo>,
    flush_count: u64,
    flushes_seen: u64,
}

impl Pool {
    fn take(&mut self, flushes_started: u64) -> Option<TextureInfo> {
        if self.flushes_seen < flushes_started {
            return None;
        }
        self.free.pop_front()
    }
}

/// Feeds frames into the head of an effect chain from a fixed pool of textures. Pushes
/// wait while a chain-wide flush is on its way to the source.
pub struct TexturePoolSource {
    textures: Vec<TextureInfo>,
    context: ChainContext,
    pool: Mutex<Pool>,
    texture_returned: Condvar,
    output_listener: Mutex<Option<Arc<dyn OutputListener>>>,
}

impl TexturePoolSource {
    pub fn new(textures: Vec<TextureInfo>, context: &ChainContext) -> Self {
        let pool =
            Pool { free: textures.iter().copied().collect(), flush_count: 0, flushes_seen: 0 };
        Self {
            textures,
            context: context.clone(),
            pool: Mutex::new(pool),
            texture_returned: Condvar::new(),
            output_listener: Mutex::new(None),
        }
    }

    pub fn free_textures(&self) -> usize { self.pool.lock().free.len() }

    pub fn flush_count(&self) -> u64 { self.pool.lock().flush_count }

    pub fn try_push(&self, presentation_time_us: i64) -> bool {
        // no flush may start before the frame reached the first link
        let flushes_started = self.context.hold_flushes();
        let texture = self.pool.lock().take(*flushes_started);
        match texture {
            Some(texture) => {
                self.emit(texture, presentation_time_us);
                true
            }
            None => false,
        }
    }

    /// Waits up to `timeout` for a free texture and hands a frame to the chain.
    pub fn push_blocking(
        &self,
        presentation_time_us: i64,
        timeout: Duration,
    ) -> Result<(), StageError> {
        let deadline = Instant::now() + timeout;
        loop {
            let flushes_started = self.context.hold_flushes();
            let mut pool = self.pool.lock();
            let texture = pool.take(*flushes_started);
            if let Some(texture) = texture {
                drop(pool);
                self.emit(texture, presentation_time_us);
                return Ok(());
            }
            drop(flushes_started);
            if Instant::now() >= deadline {
                return Err(StageError::NoFreeTexture(timeout));
            }
            self.texture_returned.wait_until(&mut pool, deadline);
        }
    }

    pub fn end_stream(&self) {
        let listener = self.output_listener.lock().clone();
        if let Some(listener) = listener {
            listener.on_current_output_stream_ended();
        }
    }

    fn emit(&self, texture: TextureInfo, presentation_time_us: i64) {
        let listener = self.output_listener.lock().clone();
        match listener {
            Some(listener) => listener.on_output_frame_available(texture, presentation_time_us),
            None => {
                debug!("no output listener connected, dropping frame at {presentation_time_us}us");
                self.pool.lock().free.push_back(texture);
                self.texture_returned.notify_one();
            }
        }
    }
}

impl FrameProducer for TexturePoolSource {
    fn release_output_frame(&self, texture: TextureInfo) -> Result<()> {
        if !self.textures.contains(&texture) {
            return Err(StageError::UnknownTexture(texture.texture_id).into());
        }
        let mut pool = self.pool.lock();
        if pool.free.contains(&texture) {
            debug!(texture_id = texture.texture_id, "ignoring release of a flushed texture");
            return Ok(());
        }
        pool.free.push_back(texture);
        self.texture_returned.notify_one();
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        let flushes_started = self.context.flushes_started();
        let mut pool = self.pool.lock();
        pool.free = self.textures.iter().copied().collect();
        pool.flush_count += 1;
        pool.flushes_seen = count_flush(pool.flushes_seen, flushes_started);
        debug!("source flushed, {} textures free", pool.free.len());
        self.texture_returned.notify_all();
        Ok(())
    }
}

impl ProducingStage for TexturePoolSource {
    fn set_output_listener(&self, listener: Arc<dyn OutputListener>) {
        *self.output_listener.lock() = Some(listener);
    }
}
