//! Coalescing of concurrent token refreshes.
//!
//! At most one refresh runs at a time. The first caller starts it as a
//! detached task; everyone arriving while it runs waits on the same `watch`
//! channel and receives the same outcome. The slot is emptied under the lock
//! right before the outcome is published, so the next caller after that
//! starts a fresh refresh.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tracing::debug;

use crate::error::ApiError;
use crate::store::SecureString;

/// Result of one refresh: the new access token or why it failed.
pub type RefreshOutcome = Result<SecureString, ApiError>;

type Pending = watch::Receiver<Option<RefreshOutcome>>;

/// Shared in-flight refresh marker.
#[derive(Debug, Default)]
pub struct RefreshGate {
    inflight: Mutex<Option<Pending>>,
}

impl RefreshGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while a refresh is running.
    pub fn is_refreshing(&self) -> bool {
        self.slot().is_some()
    }

    /// Join the running refresh, or start `refresh` if none is running.
    ///
    /// `refresh` is only invoked by the caller that starts the refresh. The
    /// refresh keeps running even if every waiter is dropped.
    pub async fn run<F, Fut>(self: &Arc<Self>, refresh: F) -> RefreshOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = RefreshOutcome> + Send + 'static,
    {
        let mut pending = {
            let mut slot = self.slot();
            match slot.as_ref() {
                Some(pending) => {
                    debug!("Joining in-flight token refresh");
                    pending.clone()
                }
                None => {
                    let (tx, rx) = watch::channel(None);
                    *slot = Some(rx.clone());

                    let settle = Settle {
                        gate: Arc::clone(self),
                        tx,
                        outcome: None,
                    };
                    let refresh = refresh();
                    tokio::spawn(async move {
                        let mut settle = settle;
                        settle.outcome = Some(refresh.await);
                    });
                    rx
                }
            }
        };

        let outcome = match pending.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => None,
        };

        outcome.unwrap_or_else(|| Err(interrupted()))
    }

    fn slot(&self) -> MutexGuard<'_, Option<Pending>> {
        self.inflight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Publishes the outcome when the refresh task ends, including by panic.
struct Settle {
    gate: Arc<RefreshGate>,
    tx: watch::Sender<Option<RefreshOutcome>>,
    outcome: Option<RefreshOutcome>,
}

impl Drop for Settle {
    fn drop(&mut self) {
        let outcome = self.outcome.take().unwrap_or_else(|| Err(interrupted()));
        let mut slot = self.gate.slot();
        *slot = None;
        self.tx.send_replace(Some(outcome));
    }
}

fn interrupted() -> ApiError {
    ApiError::Transport("Token refresh was interrupted".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn counting_refresh(
        counter: &Arc<AtomicUsize>,
        token: &'static str,
    ) -> impl FnOnce() -> std::pin::Pin<Box<dyn Future<Output = RefreshOutcome> + Send>> {
        let counter = Arc::clone(counter);
        move || {
            Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(SecureString::from(token))
            })
        }
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_refresh() {
        let gate = Arc::new(RefreshGate::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let (a, b, c) = tokio::join!(
            gate.run(counting_refresh(&calls, "T2")),
            gate.run(counting_refresh(&calls, "T3")),
            gate.run(counting_refresh(&calls, "T4")),
        );

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(a.unwrap().as_str(), "T2");
        assert_eq!(b.unwrap().as_str(), "T2");
        assert_eq!(c.unwrap().as_str(), "T2");
        assert!(!gate.is_refreshing());
    }

    #[tokio::test]
    async fn test_slot_resets_after_settling() {
        let gate = Arc::new(RefreshGate::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let first = gate.run(counting_refresh(&calls, "T2")).await;
        let second = gate.run(counting_refresh(&calls, "T3")).await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(first.unwrap().as_str(), "T2");
        assert_eq!(second.unwrap().as_str(), "T3");
    }

    #[tokio::test]
    async fn test_failure_reaches_every_waiter_then_resets() {
        let gate = Arc::new(RefreshGate::new());

        let fail = || async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Err(ApiError::Server {
                status: 401,
                message: "Token is invalid or expired".into(),
            })
        };

        let (a, b) = tokio::join!(gate.run(fail), gate.run(fail));
        assert_eq!(a.unwrap_err().status(), 401);
        assert_eq!(b.unwrap_err().status(), 401);
        assert!(!gate.is_refreshing());

        let ok = gate.run(|| async { Ok(SecureString::from("T9")) }).await;
        assert_eq!(ok.unwrap().as_str(), "T9");
    }

    #[tokio::test]
    async fn test_dropped_waiter_does_not_cancel_refresh() {
        let gate = Arc::new(RefreshGate::new());
        let calls = Arc::new(AtomicUsize::new(0));

        // Start a refresh and abandon it almost immediately.
        let abandoned = tokio::time::timeout(
            Duration::from_millis(1),
            gate.run(counting_refresh(&calls, "T2")),
        )
        .await;
        assert!(abandoned.is_err());
        assert!(gate.is_refreshing());

        // A later caller joins the same refresh instead of starting another.
        let joined = gate.run(counting_refresh(&calls, "T3")).await;
        assert_eq!(joined.unwrap().as_str(), "T2");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panicking_refresh_settles_with_error() {
        let gate = Arc::new(RefreshGate::new());

        let outcome = gate
            .run(|| async {
                if SecureString::from("x").as_str() == "x" {
                    panic!("refresh blew up");
                }
                Ok(SecureString::from("unreachable"))
            })
            .await;

        assert!(matches!(outcome, Err(ApiError::Transport(_))));
        assert!(!gate.is_refreshing());
    }
}
