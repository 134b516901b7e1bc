use std::time::Duration;

/// A failure that happened while running a task on the frame processing thread.
///
/// These never reach the thread that submitted the task, they are handed to the
/// executors error listener instead.
#[derive(thiserror::Error, Debug)]
pub enum FrameProcessingError {
    #[error("frame processing task failed: {0:#}")]
    TaskFailed(anyhow::Error),
    #[error("frame processing task panicked: {0}")]
    TaskPanicked(String),
}

#[derive(thiserror::Error, Debug)]
pub enum ExecutorError {
    #[error("could not spawn the frame processing thread")]
    Spawn(#[from] std::io::Error),
    #[error("frame processing thread did not stop within {0:?}")]
    ReleaseTimeout(Duration),
    #[error("frame processing thread panicked while shutting down")]
    WorkerPanicked,
}

#[derive(thiserror::Error, Debug)]
pub enum StageError {
    #[error("a frame was queued while the output texture {0} was still in use")]
    OutputTextureBusy(u32),
    #[error("texture {0} is not owned by this stage")]
    UnknownTexture(u32),
    #[error("no texture was released within {0:?}")]
    NoFreeTexture(Duration),
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("an effect chain needs at least one stage")]
    NoStages,
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}
