//! Background Task Manager
//!
//! Named fire-and-forget work (blockchain notarization, webhook follow-ups,
//! notifications). Failures are logged and never reach the caller; shutdown
//! drains everything with a bounded timeout.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::EngineError;

const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

pub struct BackgroundTaskManager {
    tasks: Mutex<Vec<(String, JoinHandle<()>)>>,
}

impl BackgroundTaskManager {
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Spawn a named fire-and-forget operation. The returned error, if any,
    /// is logged and swallowed.
    pub fn spawn<F>(&self, name: impl Into<String>, fut: F)
    where
        F: Future<Output = Result<(), EngineError>> + Send + 'static,
    {
        let name = name.into();
        let task_name = name.clone();
        let handle = tokio::spawn(async move {
            if let Err(err) = fut.await {
                error!(task = %task_name, "background task failed: {err}");
            }
        });
        self.tasks.lock().unwrap().push((name, handle));
    }

    /// Number of tasks spawned since startup (finished or not).
    pub fn spawned_count(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }

    /// Drain pending tasks, aborting anything still running after the
    /// drain timeout.
    pub async fn shutdown(&self) {
        let tasks: Vec<_> = std::mem::take(&mut *self.tasks.lock().unwrap());
        if tasks.is_empty() {
            return;
        }
        info!(pending = tasks.len(), "draining background tasks");

        let deadline = tokio::time::Instant::now() + DRAIN_TIMEOUT;
        for (name, mut handle) in tasks {
            if handle.is_finished() {
                continue;
            }
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(_) => {}
                Err(_) => {
                    warn!(task = %name, "drain timeout, aborting");
                    handle.abort();
                }
            }
        }
    }
}

impl Default for BackgroundTaskManager {
    fn default() -> Self {
        Self::new()
    }
}
