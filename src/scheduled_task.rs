use std::future::Future;

use rocket::tokio::{
    self,
    task::JoinHandle,
    time::{Duration, MissedTickBehavior},
};

/// A task run repeatedly at a fixed period, starting immediately.
/// Runs never overlap: a run that overshoots the period delays the next one.
pub struct RecurringTask {
    handle: JoinHandle<()>,
}

impl RecurringTask {
    /// Spawn `task` to run now and then once every `period`.
    ///
    /// Panics if `period` is zero.
    pub fn new<F, Fut>(period: Duration, mut task: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut ticks = tokio::time::interval(period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                task().await;
            }
        });
        Self { handle }
    }

    /// Stop the task. A run in progress is abandoned at its next await point.
    pub async fn cancel(self) {
        self.handle.abort();
        let _ = self.handle.await;
    }
}
