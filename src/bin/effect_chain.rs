use anyhow::{bail, Context, Result};
use clap::Parser;
use effect_pipeline::{
    config::ChainConfig,
    pipeline_processing::task_executor::FrameProcessingTaskExecutor,
    stages::{assemble_chain, sink::SinkEvent},
};
use indicatif::{ProgressBar, ProgressStyle};
use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Push synthetic frames through a chain of effects and report the throughput.
#[derive(Parser, Debug)]
#[clap(name = "effect-chain", version)]
struct Args {
    /// yaml file describing the executor, the source and the stages of the chain
    #[clap(long, short)]
    config: PathBuf,

    /// frames per stream
    #[clap(long, default_value_t = 300)]
    frames: u64,

    #[clap(long, default_value_t = 1)]
    streams: u64,

    /// used to derive the presentation timestamps
    #[clap(long, default_value_t = 30)]
    fps: u64,

    /// give up if no frame arrives at the sink for this long
    #[clap(long, default_value_t = 5000)]
    stall_timeout_ms: u64,
}

fn main() {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let res = work();
    match res {
        Ok(_) => eprintln!("\neffect chain successfully finished :)"),
        Err(error) => {
            eprintln!("\n\n{:?}", error)
        }
    }
}

// used to have the convenience of ? for error handling
fn work() -> Result<()> {
    let args = Args::parse();
    if args.fps == 0 {
        bail!("--fps must be positive");
    }
    let config = ChainConfig::from_path(&args.config)?;
    let stall_timeout = Duration::from_millis(args.stall_timeout_ms);

    let task_errors = Arc::new(AtomicU64::new(0));
    let executor = {
        let task_errors = task_errors.clone();
        Arc::new(FrameProcessingTaskExecutor::start(&config.executor.thread_name, move |e| {
            error!("{e}");
            task_errors.fetch_add(1, Ordering::Relaxed);
        })?)
    };
    let assembled = assemble_chain(&config, executor.clone())?;
    info!(
        "running {} frames in {} streams through {} stages",
        args.frames,
        args.streams,
        assembled.chain.stages().len()
    );

    let progressbar = ProgressBar::new(args.frames * args.streams);
    progressbar.set_style(
        ProgressStyle::default_bar()
            .template("{wide_bar} | {pos}/{len} frames | elapsed: {elapsed_precise} | remaining: {eta} | {msg} ")?
            .progress_chars("#>-"),
    );

    let started = Instant::now();
    let pusher = {
        let source = assembled.source.clone();
        let (frames, streams, fps) = (args.frames, args.streams, args.fps);
        thread::Builder::new().name("frame-pusher".to_string()).spawn(move || -> Result<()> {
            for _ in 0..streams {
                for i in 0..frames {
                    let presentation_time_us = (i * 1_000_000 / fps) as i64;
                    source
                        .push_blocking(presentation_time_us, stall_timeout)
                        .with_context(|| format!("could not push frame {i}"))?;
                }
                source.end_stream();
            }
            Ok(())
        })?
    };

    let mut delivered = 0;
    let mut streams_ended = 0;
    while streams_ended < args.streams {
        match assembled.events.recv_timeout(stall_timeout) {
            Ok(SinkEvent::Frame { .. }) => {
                delivered += 1;
                progressbar.set_position(delivered);
            }
            Ok(SinkEvent::EndOfStream) => {
                streams_ended += 1;
                progressbar.set_message(format!("stream {streams_ended} done"));
            }
            Err(_) => {
                progressbar.abandon();
                bail!("no frame reached the sink within {stall_timeout:?}, the chain stalled");
            }
        }
    }
    progressbar.finish();
    let elapsed = started.elapsed();

    match pusher.join() {
        Ok(result) => result?,
        Err(_) => bail!("the frame pusher panicked"),
    }
    executor.release(Box::new(|| Ok(())), config.executor.release_timeout())?;

    eprintln!(
        "delivered {delivered} frames in {:.2}s ({:.1} fps)",
        elapsed.as_secs_f64(),
        delivered as f64 / elapsed.as_secs_f64()
    );

    let errors = task_errors.load(Ordering::Relaxed);
    if errors > 0 {
        bail!("{errors} frame processing tasks failed");
    }
    Ok(())
}
