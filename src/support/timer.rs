//! Cancellable scheduled tasks
//!
//! Timers in the core (simulation heartbeat and meter ticks, phase timeouts)
//! are tokio tasks owned by whichever component armed them. Several teardown
//! paths may race to cancel the same timer, so cancellation is idempotent and
//! dropping the handle cancels too.

use std::future::Future;
use std::time::Duration;

use tokio::task::AbortHandle;

/// Owned handle to a spawned timer task.
#[derive(Debug)]
pub struct ScheduledTask {
    handle: AbortHandle,
}

impl ScheduledTask {
    /// Run `fut` once after `delay`.
    pub fn once<F>(delay: Duration, fut: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            fut.await;
        })
        .abort_handle();
        Self { handle }
    }

    /// Call `tick` every `period`, first call one period from now.
    pub fn every<F, Fut>(period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut interval = tokio::time::interval_at(start, period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                tick().await;
            }
        })
        .abort_handle();
        Self { handle }
    }

    /// Stop the task. Safe to call any number of times.
    pub fn cancel(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn periodic_task_ticks_until_cancelled() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let task = ScheduledTask::every(Duration::from_secs(2), move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(6_100)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);

        task.cancel();
        task.cancel();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_a_one_shot_prevents_it_from_firing() {
        let fired = Arc::new(AtomicUsize::new(0));
        let f = fired.clone();
        let task = ScheduledTask::once(Duration::from_secs(5), async move {
            f.fetch_add(1, Ordering::SeqCst);
        });
        drop(task);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
