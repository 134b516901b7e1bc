use crate::pipeline_processing::{
    frame::{PendingFrame, TextureInfo},
    shader_program::{FrameConsumer, FrameProducer, InputListener, OutputListener},
    task_executor::SerialExecutor,
};
use parking_lot::Mutex;
use std::{collections::VecDeque, sync::Arc};
use tracing::trace;

#[derive(Default)]
struct LinkState {
    pending_frames: VecDeque<PendingFrame>,
    // free input slots the consumer announced while no frame was pending
    consumer_input_capacity: usize,
}

#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct LinkSnapshot {
    pub pending_frames: usize,
    pub consumer_input_capacity: usize,
    pub end_of_stream_pending: bool,
}

/// Connects the output of a producing stage to the input of a consuming stage.
///
/// Frames the producer outputs are handed to the consumer in exactly the order
/// they became available, but only when the consumer has room for them. If the
/// consumer signals readiness while nothing is pending, the readiness is banked
/// as capacity and the next frame is forwarded right away.
///
/// The link registers as [`OutputListener`] on the producer and as
/// [`InputListener`] on the consumer. It never calls into a stage directly, every
/// stage call is submitted to the executor.
pub struct StageLink<P: ?Sized, C: ?Sized> {
    producer: Arc<P>,
    consumer: Arc<C>,
    executor: Arc<dyn SerialExecutor>,
    state: Mutex<LinkState>,
}

impl<P, C> StageLink<P, C>
where
    P: FrameProducer + ?Sized + 'static,
    C: FrameConsumer + ?Sized + 'static,
{
    pub fn new(producer: Arc<P>, consumer: Arc<C>, executor: Arc<dyn SerialExecutor>) -> Self {
        Self { producer, consumer, executor, state: Default::default() }
    }

    pub fn snapshot(&self) -> LinkSnapshot {
        let state = self.state.lock();
        LinkSnapshot {
            pending_frames: state.pending_frames.len(),
            consumer_input_capacity: state.consumer_input_capacity,
            end_of_stream_pending: state.pending_frames.iter().any(PendingFrame::is_end_of_stream),
        }
    }

    // callers hold the state lock, so submissions happen in the order decisions were made
    fn dispatch_to_consumer(&self, frame: PendingFrame) {
        let consumer = self.consumer.clone();
        match frame {
            PendingFrame::Frame { texture, presentation_time_us } => {
                trace!(presentation_time_us, "dispatching frame to consumer");
                self.executor.submit(Box::new(move || {
                    consumer.queue_input_frame(texture, presentation_time_us)
                }))
            }
            PendingFrame::EndOfStream => {
                trace!("dispatching end of stream to consumer");
                self.executor
                    .submit(Box::new(move || consumer.signal_end_of_current_input_stream()))
            }
        }
    }
}

impl<P, C> InputListener for StageLink<P, C>
where
    P: FrameProducer + ?Sized + 'static,
    C: FrameConsumer + ?Sized + 'static,
{
    fn on_ready_to_accept_input_frame(&self) {
        let mut state = self.state.lock();
        match state.pending_frames.pop_front() {
            Some(frame) => self.dispatch_to_consumer(frame),
            None => state.consumer_input_capacity += 1,
        }
    }

    fn on_input_frame_processed(&self, texture: TextureInfo) {
        let producer = self.producer.clone();
        self.executor.submit(Box::new(move || producer.release_output_frame(texture)));
    }

    fn on_flush(&self) {
        let mut state = self.state.lock();
        let dropped = state.pending_frames.len();
        state.consumer_input_capacity = 0;
        state.pending_frames.clear();
        trace!(dropped, "flushing link");

        let producer = self.producer.clone();
        self.executor.submit(Box::new(move || producer.flush()));
    }
}

impl<P, C> OutputListener for StageLink<P, C>
where
    P: FrameProducer + ?Sized + 'static,
    C: FrameConsumer + ?Sized + 'static,
{
    fn on_output_frame_available(&self, texture: TextureInfo, presentation_time_us: i64) {
        let mut state = self.state.lock();
        let frame = PendingFrame::Frame { texture, presentation_time_us };
        if state.consumer_input_capacity > 0 {
            state.consumer_input_capacity -= 1;
            self.dispatch_to_consumer(frame);
        } else {
            state.pending_frames.push_back(frame);
        }
    }

    fn on_current_output_stream_ended(&self) {
        let mut state = self.state.lock();
        if state.pending_frames.is_empty() {
            self.dispatch_to_consumer(PendingFrame::EndOfStream);
        } else {
            state.pending_frames.push_back(PendingFrame::EndOfStream);
        }
    }
}
