//! Running transactions on worker threads.
//!
//! [`SendTask`] wraps the synchronous pipeline in one dedicated worker
//! thread per transaction, so many sends can run in parallel and be
//! polled or awaited independently.

use std::io;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crate::config::MailerConfig;
use crate::error::SendError;
use crate::message::Message;
use crate::send::send_mail;

#[derive(Debug, Default)]
struct TaskState {
    result: Option<Result<(), SendError>>,
    completed: bool,
}

/// Handle to a mail transaction running on a worker thread.
///
/// [`SendTask::is_complete`] polls without blocking and may be called any
/// number of times. [`SendTask::wait`] consumes the handle, so the result
/// of a task can be retrieved exactly once; the borrow checker rules out
/// a second wait.
#[derive(Debug)]
pub struct SendTask {
    state: Arc<Mutex<TaskState>>,
    worker: JoinHandle<()>,
}

impl SendTask {
    /// Start sending `message` on a dedicated worker thread.
    ///
    /// The configuration is cloned into the worker; the clone shares the
    /// caller's failure counter and diagnostic sink.
    ///
    /// # Errors
    ///
    /// Propagates the I/O error if the worker thread cannot be spawned;
    /// nothing is left running in that case.
    pub fn spawn(config: &MailerConfig, message: Message) -> io::Result<Self> {
        let state = Arc::new(Mutex::new(TaskState::default()));
        let worker_state = Arc::clone(&state);
        let worker_config = config.clone();

        let worker = thread::Builder::new()
            .name("mailwrap-send".to_string())
            .spawn(move || {
                let result = send_mail(&worker_config, &message);
                // The result slot is written under the lock strictly
                // before the completion flag is raised.
                if let Ok(mut task) = worker_state.lock() {
                    task.result = Some(result);
                    task.completed = true;
                }
            })?;

        Ok(Self { state, worker })
    }

    /// Non-blocking completion check.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        // A poisoned lock means the worker panicked mid-update; the task
        // will never make further progress, so report it as complete and
        // let `wait` surface the failure.
        self.state.lock().map_or(true, |task| task.completed)
    }

    /// Block until the worker finishes, then return the transaction
    /// result and release everything owned by the task.
    pub fn wait(self) -> Result<(), SendError> {
        let panicked = self.worker.join().is_err();
        let result = self
            .state
            .lock()
            .ok()
            .and_then(|mut task| task.result.take());

        match result {
            Some(result) => result,
            None => Err(SendError::CannotCall {
                reason: if panicked {
                    "mail worker thread panicked".to_string()
                } else {
                    "mail worker finished without recording a result".to_string()
                },
            }),
        }
    }
}
