use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// A single cancellable countdown. Arming replaces whatever was running.
#[derive(Debug, Default)]
pub struct RoundTimer {
    task: Option<JoinHandle<()>>,
    deadline: Option<Instant>,
}

impl RoundTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `on_expiry` once `duration` has elapsed unless cancelled first
    pub fn arm<F>(&mut self, duration: Duration, on_expiry: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();

        let deadline = Instant::now() + duration;
        self.deadline = Some(deadline);
        self.task = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            on_expiry.await;
        }));
    }

    /// Stop the countdown. A pending expiry never runs.
    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.deadline = None;
    }

    /// Forget the countdown that just fired without aborting it.
    /// Called from inside the expiry callback, which must keep running.
    pub fn release(&mut self) {
        self.task = None;
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.task.is_some()
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }
}

impl Drop for RoundTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
