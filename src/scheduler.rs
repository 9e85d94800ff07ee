//! Cancellable timer tasks backing the polling loop and the delayed
//! hand-off to the dashboard.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Stop handle for a scheduled task. Once `cancel` returns no further tick
/// is scheduled; a tick already in flight finishes on its own thread.
/// Cancelling is idempotent and dropping the handle cancels the task.
#[derive(Debug)]
pub struct TaskHandle {
    cancelled: Arc<AtomicBool>,
    wake: Option<Sender<()>>,
}

impl TaskHandle {
    /// Runs `tick` every `period` until it returns `Break` or the handle is
    /// cancelled. The first tick happens one period after the call.
    ///
    /// Deadlines are fixed multiples of `period` from the start, so tick
    /// duration does not drift the cadence. A tick that overruns skips the
    /// deadlines it missed rather than firing them back to back.
    pub fn repeat<F>(period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> ControlFlow<()> + Send + 'static,
    {
        let period = period.max(MIN_PERIOD);
        let cancelled = Arc::new(AtomicBool::new(false));
        let (wake, wait) = mpsc::channel::<()>();
        let flag = Arc::clone(&cancelled);

        thread::spawn(move || {
            let mut deadline = Instant::now() + period;
            loop {
                let timeout = deadline.saturating_duration_since(Instant::now());
                match wait.recv_timeout(timeout) {
                    Err(RecvTimeoutError::Timeout) => {}
                    // Woken or handle dropped: stop.
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
                if flag.load(Ordering::SeqCst) {
                    break;
                }
                if tick().is_break() {
                    flag.store(true, Ordering::SeqCst);
                    break;
                }

                let now = Instant::now();
                deadline += period;
                while deadline <= now {
                    deadline += period;
                }
            }
        });

        Self {
            cancelled,
            wake: Some(wake),
        }
    }

    pub fn once<F>(delay: Duration, task: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let mut task = Some(task);
        Self::repeat(delay, move || {
            if let Some(task) = task.take() {
                task();
            }
            ControlFlow::Break(())
        })
    }

    pub fn cancel(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(wake) = self.wake.take() {
            let _ = wake.send(());
        }
    }

    pub fn is_active(&self) -> bool {
        !self.cancelled.load(Ordering::SeqCst)
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}
