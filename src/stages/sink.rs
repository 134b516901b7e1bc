use crate::pipeline_processing::{
    chain_context::ChainContext,
    frame::TextureInfo,
    shader_program::{ConsumingStage, FrameConsumer, InputListener},
};
use anyhow::Result;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SinkEvent {
    Frame { presentation_time_us: i64 },
    EndOfStream,
}

#[derive(Default)]
struct SinkState {
    input_listener: Option<Arc<dyn InputListener>>,
    unfinished_flushes: u32,
    received: Vec<i64>,
}

/// The end of an effect chain. Reads every frame right away and publishes what it
/// received as [`SinkEvent`]s.
pub struct CollectingSink {
    state: Arc<Mutex<SinkState>>,
    context: ChainContext,
    events: flume::Sender<SinkEvent>,
}

impl CollectingSink {
    pub fn new(context: &ChainContext) -> (Arc<Self>, flume::Receiver<SinkEvent>) {
        let (events, rx) = flume::unbounded();
        let sink = Self { state: Default::default(), context: context.clone(), events };
        (Arc::new(sink), rx)
    }

    pub fn received(&self) -> Vec<i64> { self.state.lock().received.clone() }

    /// Drops everything in flight in the chain. The flush starts on the executor and
    /// travels upstream through every stage up to the source.
    pub fn flush(&self) {
        let state = self.state.clone();
        let context = self.context.clone();
        self.context.submit(Box::new(move || {
            start_flush(&state, &context);
            Ok(())
        }));
    }

    fn publish(&self, event: SinkEvent) {
        if self.events.send(event).is_err() {
            debug!("nobody is listening for sink events anymore");
        }
    }
}

fn start_flush(state: &Arc<Mutex<SinkState>>, context: &ChainContext) {
    let listener = {
        let mut state = state.lock();
        let Some(listener) = state.input_listener.clone() else { return };
        state.unfinished_flushes += 1;
        listener
    };
    let flushes_started = context.start_flush();
    debug!(flushes_started, "flushing from the sink");
    listener.on_flush();

    let state = state.clone();
    context.submit(Box::new(move || {
        let listener = {
            let mut state = state.lock();
            state.unfinished_flushes -= 1;
            if state.unfinished_flushes == 0 {
                state.input_listener.clone()
            } else {
                None
            }
        };
        if let Some(listener) = listener {
            listener.on_ready_to_accept_input_frame();
        }
        Ok(())
    }));
}

impl FrameConsumer for CollectingSink {
    fn queue_input_frame(&self, texture: TextureInfo, presentation_time_us: i64) -> Result<()> {
        let listener = {
            let mut state = self.state.lock();
            if state.unfinished_flushes > 0 {
                debug!(presentation_time_us, "dropping a frame queued before the flush");
                return Ok(());
            }
            state.received.push(presentation_time_us);
            state.input_listener.clone()
        };
        if let Some(listener) = listener {
            listener.on_input_frame_processed(texture);
            listener.on_ready_to_accept_input_frame();
        }
        self.publish(SinkEvent::Frame { presentation_time_us });
        Ok(())
    }

    fn signal_end_of_current_input_stream(&self) -> Result<()> {
        if self.state.lock().unfinished_flushes > 0 {
            debug!("dropping an end of stream queued before the flush");
            return Ok(());
        }
        self.publish(SinkEvent::EndOfStream);
        Ok(())
    }
}

impl ConsumingStage for CollectingSink {
    fn set_input_listener(&self, listener: Arc<dyn InputListener>) {
        let ready = {
            let mut state = self.state.lock();
            state.input_listener = Some(listener.clone());
            state.unfinished_flushes == 0
        };
        if ready {
            listener.on_ready_to_accept_input_frame();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline_processing::test_util::{
        texture,
        ListenerCall,
        ManualExecutor,
        RecordingListener,
    };

    struct Fixture {
        sink: Arc<CollectingSink>,
        events: flume::Receiver<SinkEvent>,
        listener: Arc<RecordingListener>,
        executor: Arc<ManualExecutor>,
    }

    fn fixture() -> Fixture {
        let executor = Arc::new(ManualExecutor::default());
        let (sink, events) = CollectingSink::new(&ChainContext::new(executor.clone()));
        let listener = RecordingListener::new();
        sink.set_input_listener(listener.clone());
        Fixture { sink, events, listener, executor }
    }

    #[test]
    fn test_reads_frames_immediately() {
        let Fixture { sink, events, listener, .. } = fixture();

        sink.queue_input_frame(texture(4), 40).unwrap();
        sink.signal_end_of_current_input_stream().unwrap();

        assert_eq!(
            listener.take(),
            vec![
                ListenerCall::ReadyToAcceptInputFrame,
                ListenerCall::InputFrameProcessed(texture(4)),
                ListenerCall::ReadyToAcceptInputFrame,
            ]
        );
        assert_eq!(
            events.drain().collect::<Vec<_>>(),
            vec![SinkEvent::Frame { presentation_time_us: 40 }, SinkEvent::EndOfStream]
        );
        assert_eq!(sink.received(), vec![40]);
    }

    #[test]
    fn test_flush_announces_capacity_once_flushed() {
        let Fixture { sink, listener, executor, .. } = fixture();
        listener.take();

        sink.flush();
        assert!(listener.take().is_empty());
        executor.run_one();
        assert_eq!(listener.take(), vec![ListenerCall::Flush]);
        executor.run_all();
        assert_eq!(listener.take(), vec![ListenerCall::ReadyToAcceptInputFrame]);
    }

    #[test]
    fn test_flush_is_counted_chain_wide() {
        let executor = Arc::new(ManualExecutor::default());
        let context = ChainContext::new(executor.clone());
        let (sink, _events) = CollectingSink::new(&context);

        sink.flush();
        executor.run_all();
        assert_eq!(context.flushes_started(), 0);

        sink.set_input_listener(RecordingListener::new());
        sink.flush();
        executor.run_all();
        assert_eq!(context.flushes_started(), 1);
    }

    #[test]
    fn test_frame_dispatched_before_flush_is_dropped() {
        let Fixture { sink, events, listener, executor } = fixture();
        listener.take();

        sink.flush();
        executor.run_one();
        sink.queue_input_frame(texture(4), 40).unwrap();
        sink.signal_end_of_current_input_stream().unwrap();
        assert_eq!(listener.take(), vec![ListenerCall::Flush]);
        assert!(events.try_recv().is_err());
        assert!(sink.received().is_empty());

        executor.run_all();
        sink.queue_input_frame(texture(5), 50).unwrap();
        assert_eq!(
            listener.take(),
            vec![
                ListenerCall::ReadyToAcceptInputFrame,
                ListenerCall::InputFrameProcessed(texture(5)),
                ListenerCall::ReadyToAcceptInputFrame,
            ]
        );
        assert_eq!(sink.received(), vec![50]);
    }

    #[test]
    fn test_keeps_working_without_event_receiver() {
        let Fixture { sink, events, .. } = fixture();
        drop(events);
        sink.queue_input_frame(texture(1), 0).unwrap();
        assert_eq!(sink.received(), vec![0]);
    }
}
