//! Trailing-edge debouncing of route resolutions.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// The default delay between the last [`Debouncer::schedule`] and the work actually running.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// The invocation currently waiting out its delay.
#[derive(Debug)]
struct Slot {
    generation: u64,
    token: CancellationToken,
}

#[derive(Debug, Default)]
struct SlotState {
    next_generation: u64,
    pending: Option<Slot>,
}

type SharedSlot = Arc<Mutex<SlotState>>;

fn lock(state: &SharedSlot) -> MutexGuard<'_, SlotState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Coalesces rapid successive requests into one trailing call.
///
/// There is a single slot for the whole debouncer, not one per key. Scheduling new work cancels
/// whatever is still waiting in the slot and restarts the delay. Under a burst only the last
/// scheduled work runs. Everything before it is dropped without ever being polled, and so is
/// anything it captured.
///
/// Cancellation only reaches work that is still waiting out its delay. Once the delay elapsed
/// the work runs to completion, even if something else is scheduled in the meantime.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    state: SharedSlot,
    shutdown: CancellationToken,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self::with_shutdown(delay, CancellationToken::new())
    }

    /// Creates a debouncer whose pending work is also dropped when `shutdown` is cancelled.
    pub fn with_shutdown(delay: Duration, shutdown: CancellationToken) -> Self {
        Self {
            delay,
            state: Arc::default(),
            shutdown,
        }
    }

    /// Whether some work is currently waiting out its delay.
    pub fn is_pending(&self) -> bool {
        lock(&self.state).pending.is_some()
    }

    /// Schedules `work` to run after the configured delay.
    ///
    /// The returned handle resolves to `true` if the work ran, and `false` if it was superseded
    /// or cancelled. Must be called from within a tokio runtime.
    pub fn schedule<F>(&self, work: F) -> JoinHandle<bool>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.schedule_with_delay(work, self.delay)
    }

    /// Like [`schedule`](Self::schedule), with an explicit delay for this one invocation.
    pub fn schedule_with_delay<F>(&self, work: F, delay: Duration) -> JoinHandle<bool>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let token = self.shutdown.child_token();
        let generation = {
            let mut state = lock(&self.state);
            let generation = state.next_generation;
            state.next_generation += 1;

            let slot = Slot {
                generation,
                token: token.clone(),
            };
            if let Some(previous) = state.pending.replace(slot) {
                tracing::trace!("Superseding debounced route resolution");
                metric!(counter("routes.debounce.superseded") += 1);
                previous.token.cancel();
            }
            generation
        };

        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            tokio::select! {
                biased;

                _ = token.cancelled() => false,
                _ = tokio::time::sleep(delay) => {
                    {
                        // The slot is free again, but only if nobody replaced us in the meantime.
                        let mut state = lock(&state);
                        if state.pending.as_ref().is_some_and(|slot| slot.generation == generation) {
                            state.pending = None;
                        }
                    }
                    work.await;
                    true
                }
            }
        })
    }

    /// Drops the pending work, if any, without scheduling anything new.
    pub fn cancel(&self) {
        if let Some(slot) = lock(&self.state).pending.take() {
            slot.token.cancel();
        }
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::time::Instant;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_burst_runs_only_last() {
        let debouncer = Debouncer::default();
        let runs = Arc::new(Mutex::new(Vec::new()));

        let handles: Vec<_> = (0..5)
            .map(|i| {
                let runs = Arc::clone(&runs);
                debouncer.schedule(async move { runs.lock().unwrap().push(i) })
            })
            .collect();

        let mut ran = Vec::new();
        for handle in handles {
            ran.push(handle.await.unwrap());
        }

        assert_eq!(ran, [false, false, false, false, true]);
        assert_eq!(*runs.lock().unwrap(), [4]);
        assert!(!debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_restarts_on_schedule() {
        let debouncer = Debouncer::new(Duration::from_millis(300));
        let start = Instant::now();

        let first = debouncer.schedule(async {});
        tokio::time::sleep(Duration::from_millis(200)).await;
        let second = debouncer.schedule(async {});

        assert!(!first.await.unwrap());
        assert!(second.await.unwrap());
        assert!(start.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_running_work_is_not_cancelled() {
        let debouncer = Debouncer::new(Duration::from_millis(300));
        let finished = Arc::new(AtomicUsize::new(0));

        let slow = {
            let finished = Arc::clone(&finished);
            debouncer.schedule(async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                finished.fetch_add(1, Ordering::SeqCst);
            })
        };

        // past the delay, the first work is now sleeping inside its body
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(!debouncer.is_pending());

        let next = {
            let finished = Arc::clone(&finished);
            debouncer.schedule(async move {
                finished.fetch_add(1, Ordering::SeqCst);
            })
        };

        assert!(slow.await.unwrap());
        assert!(next.await.unwrap());
        assert_eq!(finished.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_work_is_dropped() {
        struct Flag(Arc<AtomicUsize>);
        impl Drop for Flag {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let debouncer = Debouncer::default();
        let drops = Arc::new(AtomicUsize::new(0));
        let flag = Flag(Arc::clone(&drops));

        let first = debouncer.schedule(async move {
            let _flag = flag;
        });
        debouncer.cancel();

        assert!(!first.await.unwrap());
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_pending() {
        let shutdown = CancellationToken::new();
        let debouncer = Debouncer::with_shutdown(DEFAULT_DEBOUNCE, shutdown.clone());

        let handle = debouncer.schedule(async {});
        shutdown.cancel();
        assert!(!handle.await.unwrap());
    }
}
