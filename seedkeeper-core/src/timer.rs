//! Single-shot, cancellable auto-lock timer.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;

struct Armed {
    deadline: Instant,
    task: JoinHandle<()>,
}

/// Owns at most one pending auto-lock task.
///
/// Every call to [`arm`](Self::arm) bumps an epoch. A task that fires after
/// being superseded finds a different epoch in [`take_fired`](Self::take_fired)
/// and does nothing, even if it raced past the abort.
#[derive(Default)]
pub(crate) struct AutoLockTimer {
    epoch: u64,
    armed: Option<Armed>,
}

impl AutoLockTimer {
    /// Cancels any pending task and spawns `on_fire(epoch)` to run after `after`.
    pub(crate) fn arm<F, Fut>(&mut self, after: Duration, on_fire: F)
    where
        F: FnOnce(u64) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        self.epoch = self.epoch.wrapping_add(1);
        let epoch = self.epoch;
        let deadline = Instant::now() + after;
        let task = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            on_fire(epoch).await;
        });
        self.armed = Some(Armed { deadline, task });
    }

    /// Aborts the pending task, if any.
    pub(crate) fn cancel(&mut self) {
        if let Some(armed) = self.armed.take() {
            armed.task.abort();
        }
        self.epoch = self.epoch.wrapping_add(1);
    }

    /// Called from the firing task. Returns `true` and disarms if `epoch` is
    /// still the armed one.
    pub(crate) fn take_fired(&mut self, epoch: u64) -> bool {
        if self.epoch != epoch || self.armed.is_none() {
            return false;
        }
        // Detach rather than abort: the caller is that very task.
        self.armed = None;
        true
    }

    /// When the armed timer will fire.
    pub(crate) fn deadline(&self) -> Option<Instant> {
        self.armed.as_ref().map(|armed| armed.deadline)
    }
}

impl Drop for AutoLockTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_once_after_deadline() {
        let fired = Arc::new(AtomicU64::new(0));
        let mut timer = AutoLockTimer::default();

        let counter = Arc::clone(&fired);
        timer.arm(Duration::from_secs(60), move |_| async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert!(timer.deadline().is_some());

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_supersedes_previous_timer() {
        let fired = Arc::new(AtomicU64::new(0));
        let mut timer = AutoLockTimer::default();

        for _ in 0..3 {
            let counter = Arc::clone(&fired);
            timer.arm(Duration::from_secs(60), move |_| async move {
                counter.fetch_add(1, Ordering::SeqCst);
            });
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_firing() {
        let fired = Arc::new(AtomicU64::new(0));
        let mut timer = AutoLockTimer::default();

        let counter = Arc::clone(&fired);
        timer.arm(Duration::from_secs(10), move |_| async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        timer.cancel();
        assert!(timer.deadline().is_none());

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_stale_epoch_is_ignored() {
        let mut timer = AutoLockTimer::default();
        assert!(!timer.take_fired(0));
        timer.epoch = 5;
        assert!(!timer.take_fired(5));
    }
}
