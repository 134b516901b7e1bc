use crate::pipeline_processing::{
    frame::TextureInfo,
    shader_program::{FrameConsumer, FrameProducer, InputListener, OutputListener},
    task_executor::{SerialExecutor, Task},
};
use anyhow::Result;
use parking_lot::Mutex;
use std::{collections::VecDeque, sync::Arc};

/// Collects submitted tasks and only runs them when asked to.
#[derive(Default)]
pub struct ManualExecutor {
    tasks: Mutex<VecDeque<Task>>,
}

impl ManualExecutor {
    pub fn pending(&self) -> usize { self.tasks.lock().len() }

    /// Runs the oldest pending task, returns false if there was none.
    pub fn run_one(&self) -> bool {
        let Some(task) = self.tasks.lock().pop_front() else { return false };
        task().unwrap();
        true
    }

    pub fn run_all(&self) { while self.run_one() {} }
}

impl SerialExecutor for ManualExecutor {
    fn submit(&self, task: Task) { self.tasks.lock().push_back(task) }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageCall {
    QueueInputFrame(TextureInfo, i64),
    SignalEndOfCurrentInputStream,
    ReleaseOutputFrame(TextureInfo),
    Flush,
}

/// A stage that records every call it receives.
#[derive(Default)]
pub struct RecordingStage {
    calls: Mutex<Vec<StageCall>>,
}

impl RecordingStage {
    pub fn new() -> Arc<Self> { Arc::new(Self::default()) }

    pub fn calls(&self) -> Vec<StageCall> { self.calls.lock().clone() }

    pub fn queued_timestamps(&self) -> Vec<i64> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                StageCall::QueueInputFrame(_, presentation_time_us) => Some(*presentation_time_us),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, predicate: impl Fn(&StageCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|call| predicate(call)).count()
    }
}

impl FrameConsumer for RecordingStage {
    fn queue_input_frame(&self, texture: TextureInfo, presentation_time_us: i64) -> Result<()> {
        self.calls.lock().push(StageCall::QueueInputFrame(texture, presentation_time_us));
        Ok(())
    }

    fn signal_end_of_current_input_stream(&self) -> Result<()> {
        self.calls.lock().push(StageCall::SignalEndOfCurrentInputStream);
        Ok(())
    }
}

impl FrameProducer for RecordingStage {
    fn release_output_frame(&self, texture: TextureInfo) -> Result<()> {
        self.calls.lock().push(StageCall::ReleaseOutputFrame(texture));
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.calls.lock().push(StageCall::Flush);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerCall {
    ReadyToAcceptInputFrame,
    InputFrameProcessed(TextureInfo),
    Flush,
    OutputFrameAvailable(TextureInfo, i64),
    CurrentOutputStreamEnded,
}

/// Records the callbacks a stage makes, registered as both its input and output listener.
#[derive(Default)]
pub struct RecordingListener {
    calls: Mutex<Vec<ListenerCall>>,
}

impl RecordingListener {
    pub fn new() -> Arc<Self> { Arc::new(Self::default()) }

    pub fn take(&self) -> Vec<ListenerCall> { std::mem::take(&mut *self.calls.lock()) }
}

impl InputListener for RecordingListener {
    fn on_ready_to_accept_input_frame(&self) {
        self.calls.lock().push(ListenerCall::ReadyToAcceptInputFrame)
    }

    fn on_input_frame_processed(&self, texture: TextureInfo) {
        self.calls.lock().push(ListenerCall::InputFrameProcessed(texture))
    }

    fn on_flush(&self) { self.calls.lock().push(ListenerCall::Flush) }
}

impl OutputListener for RecordingListener {
    fn on_output_frame_available(&self, texture: TextureInfo, presentation_time_us: i64) {
        self.calls.lock().push(ListenerCall::OutputFrameAvailable(texture, presentation_time_us))
    }

    fn on_current_output_stream_ended(&self) {
        self.calls.lock().push(ListenerCall::CurrentOutputStreamEnded)
    }
}

pub fn texture(id: u32) -> TextureInfo { TextureInfo::new(id, id, 64, 64) }
