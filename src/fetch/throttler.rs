//! Per-provider concurrency limiter with quota suspension.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};

/// Caps concurrent calls to one rate-limited provider and lets any caller
/// suspend the whole provider until its quota resets.
///
/// Overlapping suspensions keep the one that ends last.
#[derive(Debug)]
pub struct ProviderLimiter {
    name: &'static str,
    semaphore: Arc<Semaphore>,
    paused: AtomicBool,
    resume: Notify,
    resume_at: Mutex<Option<Instant>>,
}

impl ProviderLimiter {
    /// Creates a limiter allowing at most `max_concurrent` in-flight calls.
    pub fn new(name: &'static str, max_concurrent: usize) -> Arc<Self> {
        Arc::new(Self {
            name,
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            paused: AtomicBool::new(false),
            resume: Notify::new(),
            resume_at: Mutex::new(None),
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Waits while the provider is suspended, then takes a concurrency slot.
    ///
    /// Returns `None` only if the semaphore was closed, which this type never does.
    pub async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        loop {
            if self.paused.load(Ordering::Acquire) {
                let notified = self.resume.notified();
                // Re-check after registering so a resume between the load and
                // the registration is not missed.
                if self.paused.load(Ordering::Acquire) {
                    notified.await;
                }
                continue;
            }
            return Arc::clone(&self.semaphore).acquire_owned().await.ok();
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Suspends new calls for `duration`.
    ///
    /// Calls already holding a permit are not interrupted. Returns `false` when
    /// a suspension ending at the same time or later is already active.
    pub fn pause_for(self: &Arc<Self>, duration: Duration) -> bool {
        let new_resume_at = Instant::now() + duration;
        {
            let mut guard = self.resume_at.lock().unwrap_or_else(PoisonError::into_inner);
            if guard.is_some_and(|existing| existing >= new_resume_at) {
                return false;
            }
            *guard = Some(new_resume_at);
        }

        log::warn!(
            "Provider '{}' suspended for {}s (quota exhausted)",
            self.name,
            duration.as_secs()
        );
        self.paused.store(true, Ordering::Release);

        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let should_resume = {
                let mut guard = this.resume_at.lock().unwrap_or_else(PoisonError::into_inner);
                if guard.is_some_and(|t| Instant::now() >= t) {
                    *guard = None;
                    true
                } else {
                    false
                }
            };
            if should_resume {
                log::debug!("Provider '{}' resumed", this.name);
                this.paused.store(false, Ordering::Release);
                this.resume.notify_waiters();
            }
        });
        true
    }
}
