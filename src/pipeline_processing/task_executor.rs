use crate::util::error::{ExecutorError, FrameProcessingError};
use anyhow::Result;
use async_task::Runnable;
use parking_lot::{Condvar, Mutex};
use std::{
    any::Any,
    cmp::Reverse,
    collections::BinaryHeap,
    future::Future,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
    thread::{self, JoinHandle, ThreadId},
    time::Duration,
};
use tracing::{debug, error, warn};

pub type Task = Box<dyn FnOnce() -> Result<()> + Send + 'static>;
pub type ErrorListener = Arc<dyn Fn(FrameProcessingError) + Send + Sync>;

/// Single-threaded, order preserving execution of submitted tasks.
pub trait SerialExecutor: Send + Sync {
    fn submit(&self, task: Task);
}

#[derive(Debug, Copy, Clone, Ord, Eq, PartialEq, PartialOrd)]
pub enum TaskPriority {
    High,
    Normal,
}

#[derive(derivative::Derivative)]
#[derivative(PartialEq, Eq, PartialOrd, Ord)]
struct QueuedTask {
    priority: TaskPriority,
    sequence: u64,
    #[derivative(PartialEq = "ignore", PartialOrd = "ignore", Ord = "ignore")]
    task: Task,
}

#[derive(Default)]
struct TaskQueue {
    heap: BinaryHeap<Reverse<QueuedTask>>,
    next_sequence: u64,
    released: bool,
}

struct Shared {
    queue: Mutex<TaskQueue>,
    cvar: Condvar,
    error_listener: ErrorListener,
}

impl Shared {
    fn push(&self, priority: TaskPriority, task: Task) {
        let mut queue = self.queue.lock();
        if queue.released {
            drop(queue);
            debug!("dropping a task submitted after the executor was released");
            return;
        }
        let sequence = queue.next_sequence;
        queue.next_sequence += 1;
        queue.heap.push(Reverse(QueuedTask { priority, sequence, task }));
        self.cvar.notify_one();
    }

    fn run_task(&self, task: Task) {
        let failure = match catch_unwind(AssertUnwindSafe(task)) {
            Ok(Ok(())) => return,
            Ok(Err(e)) => FrameProcessingError::TaskFailed(e),
            Err(panic) => FrameProcessingError::TaskPanicked(panic_message(panic)),
        };
        error!("{failure}");
        (self.error_listener)(failure);
    }

    fn work(&self) {
        loop {
            let task = {
                let mut queue = self.queue.lock();
                loop {
                    match queue.heap.pop() {
                        Some(Reverse(queued)) => break queued.task,
                        None if queue.released => return,
                        None => self.cvar.wait(&mut queue),
                    }
                }
            };
            self.run_task(task);
        }
    }

    // returns the tasks that were still queued, they must be dropped outside the lock
    fn mark_released(&self) -> Option<BinaryHeap<Reverse<QueuedTask>>> {
        let mut queue = self.queue.lock();
        if queue.released {
            return None;
        }
        queue.released = true;
        let discarded = std::mem::take(&mut queue.heap);
        self.cvar.notify_all();
        Some(discarded)
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}

/// Runs frame processing tasks on one dedicated thread.
///
/// Tasks run one at a time in submission order, high priority tasks run before
/// all queued normal priority tasks. Failing tasks are reported to the error
/// listener.
pub struct FrameProcessingTaskExecutor {
    shared: Arc<Shared>,
    worker: Mutex<Option<(JoinHandle<()>, flume::Receiver<()>)>>,
    worker_id: ThreadId,
}

impl FrameProcessingTaskExecutor {
    pub fn start(
        thread_name: &str,
        error_listener: impl Fn(FrameProcessingError) + Send + Sync + 'static,
    ) -> Result<Self, ExecutorError> {
        let shared = Arc::new(Shared {
            queue: Default::default(),
            cvar: Condvar::new(),
            error_listener: Arc::new(error_listener),
        });

        // the sender is dropped when the worker exits, which lets release() wait with a timeout
        let (exited_tx, exited_rx) = flume::bounded::<()>(1);
        let join_handle = {
            let shared = shared.clone();
            thread::Builder::new().name(thread_name.to_string()).spawn(move || {
                let _exited_tx = exited_tx;
                shared.work();
            })?
        };
        let worker_id = join_handle.thread().id();

        Ok(Self { shared, worker: Mutex::new(Some((join_handle, exited_rx))), worker_id })
    }

    pub fn submit_with_high_priority(&self, task: Task) {
        self.shared.push(TaskPriority::High, task)
    }

    pub fn is_on_executor_thread(&self) -> bool { thread::current().id() == self.worker_id }

    /// Runs `f` on the executor thread and resolves to its result, or to `None` if the
    /// executor was released before `f` got to run.
    pub fn invoke<O: Send + 'static>(
        &self,
        f: impl FnOnce() -> O + Send + 'static,
    ) -> impl Future<Output = Option<O>> {
        let shared = self.shared.clone();
        let (runnable, task) = async_task::spawn(async move { f() }, move |runnable: Runnable| {
            shared.push(
                TaskPriority::Normal,
                Box::new(move || {
                    runnable.run();
                    Ok(())
                }),
            )
        });
        runnable.schedule();
        task.fallible()
    }

    pub fn invoke_blocking<O: Send + 'static>(
        &self,
        f: impl FnOnce() -> O + Send + 'static,
    ) -> Option<O> {
        if self.is_on_executor_thread() {
            Some(f())
        } else {
            pollster::block_on(self.invoke(f))
        }
    }

    /// Discards all queued tasks, runs `release_task` as the last task and stops the
    /// worker thread. Tasks submitted afterwards are dropped.
    pub fn release(&self, release_task: Task, timeout: Duration) -> Result<(), ExecutorError> {
        let discarded = {
            let mut queue = self.shared.queue.lock();
            if queue.released {
                return Ok(());
            }
            let discarded = std::mem::take(&mut queue.heap);
            let sequence = queue.next_sequence;
            queue.next_sequence += 1;
            queue.heap.push(Reverse(QueuedTask {
                priority: TaskPriority::High,
                sequence,
                task: release_task,
            }));
            queue.released = true;
            self.shared.cvar.notify_all();
            discarded
        };
        if !discarded.is_empty() {
            debug!("discarding {} queued tasks on release", discarded.len());
        }
        drop(discarded);

        if self.is_on_executor_thread() {
            warn!("release() called from the frame processing thread, not waiting for it to stop");
            return Ok(());
        }

        let Some((join_handle, exited_rx)) = self.worker.lock().take() else { return Ok(()) };
        match exited_rx.recv_timeout(timeout) {
            Err(flume::RecvTimeoutError::Timeout) => Err(ExecutorError::ReleaseTimeout(timeout)),
            _ => join_handle.join().map_err(|_| ExecutorError::WorkerPanicked),
        }
    }
}

impl SerialExecutor for FrameProcessingTaskExecutor {
    fn submit(&self, task: Task) { self.shared.push(TaskPriority::Normal, task) }
}

impl Drop for FrameProcessingTaskExecutor {
    fn drop(&mut self) { drop(self.shared.mark_released()); }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use futures::join;

    fn executor_collecting_errors() -> (FrameProcessingTaskExecutor, Arc<Mutex<Vec<String>>>) {
        let errors: Arc<Mutex<Vec<String>>> = Default::default();
        let executor = {
            let errors = errors.clone();
            FrameProcessingTaskExecutor::start("test-frame-processing", move |e| {
                errors.lock().push(e.to_string())
            })
            .unwrap()
        };
        (executor, errors)
    }

    #[test]
    fn test_runs_tasks_in_submission_order() {
        let (executor, _) = executor_collecting_errors();
        let output: Arc<Mutex<Vec<u64>>> = Default::default();
        for i in 0..100 {
            let output = output.clone();
            executor.submit(Box::new(move || {
                output.lock().push(i);
                Ok(())
            }));
        }
        executor.invoke_blocking(|| ()).unwrap();
        assert_eq!(*output.lock(), (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_all_tasks_run_on_one_thread() {
        let (executor, _) = executor_collecting_errors();
        let threads: Arc<Mutex<Vec<ThreadId>>> = Default::default();
        thread::scope(|scope| {
            for _ in 0..4 {
                let threads = threads.clone();
                let executor = &executor;
                scope.spawn(move || {
                    for _ in 0..25 {
                        let threads = threads.clone();
                        executor.submit(Box::new(move || {
                            threads.lock().push(thread::current().id());
                            Ok(())
                        }));
                    }
                });
            }
        });
        executor.invoke_blocking(|| ()).unwrap();

        let threads = threads.lock();
        assert_eq!(threads.len(), 100);
        assert!(threads.iter().all(|id| *id == executor.worker_id));
    }

    #[test]
    fn test_invoked_closures_run_in_submission_order() {
        let (executor, _) = executor_collecting_errors();
        let output: Arc<Mutex<Vec<u64>>> = Default::default();
        let invoke = |value: u64| {
            let output = output.clone();
            executor.invoke(move || {
                output.lock().push(value);
                value * 10
            })
        };
        let (fut_3, fut_1, fut_2) = (invoke(3), invoke(1), invoke(2));

        let results = pollster::block_on(async { join!(fut_1, fut_2, fut_3) });
        assert_eq!(results, (Some(10), Some(20), Some(30)));
        assert_eq!(*output.lock(), vec![3, 1, 2]);
    }

    #[test]
    fn test_high_priority_tasks_overtake_queued_tasks() {
        let (executor, _) = executor_collecting_errors();
        let output: Arc<Mutex<Vec<&'static str>>> = Default::default();
        let (gate_tx, gate_rx) = flume::bounded::<()>(0);
        executor.submit(Box::new(move || {
            gate_rx.recv()?;
            Ok(())
        }));

        for (name, high) in [("a", false), ("b", false), ("h1", true), ("h2", true)] {
            let output = output.clone();
            let task: Task = Box::new(move || {
                output.lock().push(name);
                Ok(())
            });
            if high {
                executor.submit_with_high_priority(task)
            } else {
                executor.submit(task)
            }
        }
        gate_tx.send(()).unwrap();
        executor.invoke_blocking(|| ()).unwrap();

        assert_eq!(*output.lock(), vec!["h1", "h2", "a", "b"]);
    }

    #[test]
    fn test_failures_reach_the_error_listener() {
        let (executor, errors) = executor_collecting_errors();
        executor.submit(Box::new(|| Err(anyhow!("shader compilation failed"))));
        executor.submit(Box::new(|| panic!("gl context lost")));
        let still_running = executor.invoke_blocking(|| 42);

        assert_eq!(still_running, Some(42));
        let errors = errors.lock();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("shader compilation failed"));
        assert!(errors[1].contains("gl context lost"));
    }

    #[test]
    fn test_release_runs_release_task_and_drops_later_tasks() {
        let (executor, _) = executor_collecting_errors();
        let output: Arc<Mutex<Vec<&'static str>>> = Default::default();
        {
            let output = output.clone();
            executor
                .release(
                    Box::new(move || {
                        output.lock().push("release");
                        Ok(())
                    }),
                    Duration::from_secs(5),
                )
                .unwrap();
        }
        {
            let output = output.clone();
            executor.submit(Box::new(move || {
                output.lock().push("late");
                Ok(())
            }));
        }

        assert_eq!(*output.lock(), vec!["release"]);
        assert_eq!(executor.invoke_blocking(|| ()), None);
        executor.release(Box::new(|| Ok(())), Duration::from_secs(5)).unwrap();
    }

    #[test]
    fn test_release_times_out_on_a_stuck_task() {
        let (executor, _) = executor_collecting_errors();
        let (started_tx, started_rx) = flume::bounded::<()>(1);
        let (gate_tx, gate_rx) = flume::bounded::<()>(0);
        executor.submit(Box::new(move || {
            started_tx.send(())?;
            gate_rx.recv()?;
            Ok(())
        }));
        started_rx.recv().unwrap();
        let result = executor.release(Box::new(|| Ok(())), Duration::from_millis(20));
        assert!(matches!(result, Err(ExecutorError::ReleaseTimeout(_))));
        gate_tx.send(()).unwrap();
    }
}
