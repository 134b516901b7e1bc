use crate::pipeline_processing::frame::TextureInfo;
use anyhow::Result;
use std::sync::Arc;

/// The input side of a stage. All methods are called on the frame processing thread.
pub trait FrameConsumer: Send + Sync {
    fn queue_input_frame(&self, texture: TextureInfo, presentation_time_us: i64) -> Result<()>;
    fn signal_end_of_current_input_stream(&self) -> Result<()>;
}

pub trait FrameProducer: Send + Sync {
    fn release_output_frame(&self, texture: TextureInfo) -> Result<()>;
    /// Drops all frames the stage holds and reports upstream via [`InputListener::on_flush`].
    fn flush(&self) -> Result<()>;
}

pub trait InputListener: Send + Sync {
    fn on_ready_to_accept_input_frame(&self);
    fn on_input_frame_processed(&self, texture: TextureInfo);
    fn on_flush(&self);
}

pub trait OutputListener: Send + Sync {
    fn on_output_frame_available(&self, texture: TextureInfo, presentation_time_us: i64);
    fn on_current_output_stream_ended(&self);
}

pub trait ProducingStage: FrameProducer {
    fn set_output_listener(&self, listener: Arc<dyn OutputListener>);
}

pub trait ConsumingStage: FrameConsumer {
    fn set_input_listener(&self, listener: Arc<dyn InputListener>);
}

/// A stage that can sit anywhere in an effect chain.
pub trait ShaderProgram: ProducingStage + ConsumingStage {}
impl<T: ProducingStage + ConsumingStage> ShaderProgram for T {}
