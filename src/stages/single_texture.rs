use crate::{
    pipeline_processing::{
        chain_context::{count_flush, ChainContext},
        frame::TextureInfo,
        shader_program::{
            ConsumingStage,
            FrameConsumer,
            FrameProducer,
            InputListener,
            OutputListener,
            ProducingStage,
        },
    },
    stages::effect::Effect,
    util::error::StageError,
};
use anyhow::Result;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

#[derive(Default)]
struct ProgramState {
    output_texture_in_use: bool,
    flushes_seen: u64,
    // flushes whose end marker has not run yet, input arriving meanwhile was dispatched before the flush
    unfinished_flushes: u32,
    input_listener: Option<Arc<dyn InputListener>>,
    output_listener: Option<Arc<dyn OutputListener>>,
}

impl ProgramState {
    fn flushing(&self, flushes_started: u64) -> bool {
        self.flushes_seen < flushes_started || self.unfinished_flushes > 0
    }

    fn accepts_input(&self, flushes_started: u64) -> bool {
        !self.output_texture_in_use && !self.flushing(flushes_started)
    }
}

/// A shader program rendering every input frame into its one output texture.
///
/// It accepts a new input frame only once the previous output was released, so at
/// most one frame is in flight per stage. Once a chain-wide flush started it drops
/// its input until the flush reached it and everything dispatched before was drained.
pub struct SingleTextureShaderProgram<E> {
    effect: E,
    output_texture: TextureInfo,
    context: ChainContext,
    state: Arc<Mutex<ProgramState>>,
}

impl<E: Effect> SingleTextureShaderProgram<E> {
    pub fn new(effect: E, output_texture: TextureInfo, context: &ChainContext) -> Self {
        Self { effect, output_texture, context: context.clone(), state: Default::default() }
    }
}

fn finish_flush(state: &Mutex<ProgramState>, context: &ChainContext) {
    let flushes_started = context.flushes_started();
    let listener = {
        let mut state = state.lock();
        state.unfinished_flushes -= 1;
        if state.accepts_input(flushes_started) {
            state.input_listener.clone()
        } else {
            None
        }
    };
    if let Some(listener) = listener {
        listener.on_ready_to_accept_input_frame();
    }
}

impl<E: Effect> FrameConsumer for SingleTextureShaderProgram<E> {
    fn queue_input_frame(&self, texture: TextureInfo, presentation_time_us: i64) -> Result<()> {
        let flushes_started = self.context.flushes_started();
        {
            let state = self.state.lock();
            if state.flushing(flushes_started) {
                debug!(presentation_time_us, "dropping a frame queued before the flush");
                return Ok(());
            }
            if state.output_texture_in_use {
                return Err(StageError::OutputTextureBusy(self.output_texture.texture_id).into());
            }
        }
        self.effect.apply(&texture, &self.output_texture, presentation_time_us)?;

        let (input_listener, output_listener) = {
            let mut state = self.state.lock();
            state.output_texture_in_use = true;
            (state.input_listener.clone(), state.output_listener.clone())
        };
        if let Some(listener) = input_listener {
            listener.on_input_frame_processed(texture);
        }
        if let Some(listener) = output_listener {
            listener.on_output_frame_available(self.output_texture, presentation_time_us);
        }
        Ok(())
    }

    fn signal_end_of_current_input_stream(&self) -> Result<()> {
        let flushes_started = self.context.flushes_started();
        let listener = {
            let state = self.state.lock();
            if state.flushing(flushes_started) {
                debug!("dropping an end of stream queued before the flush");
                return Ok(());
            }
            state.output_listener.clone()
        };
        self.effect.on_end_of_stream();
        if let Some(listener) = listener {
            listener.on_current_output_stream_ended();
        }
        Ok(())
    }
}

impl<E: Effect> FrameProducer for SingleTextureShaderProgram<E> {
    fn release_output_frame(&self, texture: TextureInfo) -> Result<()> {
        if texture != self.output_texture {
            return Err(StageError::UnknownTexture(texture.texture_id).into());
        }
        let flushes_started = self.context.flushes_started();
        let listener = {
            let mut state = self.state.lock();
            if !state.output_texture_in_use {
                debug!(
                    texture_id = texture.texture_id,
                    "ignoring release of a texture reclaimed by a flush"
                );
                return Ok(());
            }
            state.output_texture_in_use = false;
            if state.accepts_input(flushes_started) {
                state.input_listener.clone()
            } else {
                None
            }
        };
        if let Some(listener) = listener {
            listener.on_ready_to_accept_input_frame();
        }
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        debug!(texture_id = self.output_texture.texture_id, "flushing shader program");
        let flushes_started = self.context.flushes_started();
        let listener = {
            let mut state = self.state.lock();
            state.output_texture_in_use = false;
            state.flushes_seen = count_flush(state.flushes_seen, flushes_started);
            let listener = state.input_listener.clone();
            if listener.is_some() {
                state.unfinished_flushes += 1;
            }
            listener
        };
        if let Some(listener) = listener {
            listener.on_flush();
            // runs after everything the input link dispatched before the flush
            let state = self.state.clone();
            let context = self.context.clone();
            self.context.submit(Box::new(move || {
                finish_flush(&state, &context);
                Ok(())
            }));
        }
        Ok(())
    }
}

impl<E: Effect> ProducingStage for SingleTextureShaderProgram<E> {
    fn set_output_listener(&self, listener: Arc<dyn OutputListener>) {
        self.state.lock().output_listener = Some(listener);
    }
}

impl<E: Effect> ConsumingStage for SingleTextureShaderProgram<E> {
    fn set_input_listener(&self, listener: Arc<dyn InputListener>) {
        let flushes_started = self.context.flushes_started();
        let ready = {
            let mut state = self.state.lock();
            state.input_listener = Some(listener.clone());
            state.accepts_input(flushes_started)
        };
        if ready {
            listener.on_ready_to_accept_input_frame();
        }
    }
}
