//! Cancellation and deadline propagation for in-flight fetches.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::domain::error::SigtraderError;

/// Fires the paired [`CancelToken`]s.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// A cheap-to-clone token checked around every request and wait.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    deadline: Option<Instant>,
    rx: Option<watch::Receiver<bool>>,
}

impl CancelToken {
    /// A token that never fires.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn channel() -> (CancelHandle, CancelToken) {
        let (tx, rx) = watch::channel(false);
        (
            CancelHandle { tx },
            CancelToken {
                deadline: None,
                rx: Some(rx),
            },
        )
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// A timeout too large to represent leaves the token without a deadline.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.rx.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Fail fast if the token has already fired.
    pub fn check(&self) -> Result<(), SigtraderError> {
        if self.is_cancelled() {
            return Err(SigtraderError::Cancelled);
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(SigtraderError::DeadlineExceeded);
        }
        Ok(())
    }

    /// Drive `fut` to completion unless the token fires first.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, SigtraderError> {
        self.check()?;
        let deadline = async {
            match self.deadline {
                Some(d) => tokio::time::sleep_until(d).await,
                None => std::future::pending::<()>().await,
            }
        };
        let cancelled = async {
            match self.rx.clone() {
                Some(mut rx) => {
                    // A dropped handle can never cancel.
                    if rx.wait_for(|c| *c).await.is_err() {
                        std::future::pending::<()>().await;
                    }
                }
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            biased;
            _ = cancelled => Err(SigtraderError::Cancelled),
            _ = deadline => Err(SigtraderError::DeadlineExceeded),
            out = fut => Ok(out),
        }
    }

    pub async fn sleep(&self, duration: Duration) -> Result<(), SigtraderError> {
        self.run(tokio::time::sleep(duration)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn uncancelled_token_completes() {
        let token = CancelToken::none();
        let out = token.run(async { 7 }).await.unwrap();
        assert_eq!(out, 7);
        token.sleep(Duration::from_secs(60)).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_interrupts_sleep() {
        let token = CancelToken::none().with_timeout(Duration::from_secs(2));
        let started = Instant::now();
        let err = token.sleep(Duration::from_secs(10)).await.unwrap_err();
        assert!(matches!(err, SigtraderError::DeadlineExceeded));
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(2) && elapsed < Duration::from_secs(3));
        assert!(matches!(token.check(), Err(SigtraderError::DeadlineExceeded)));
    }

    #[tokio::test(start_paused = true)]
    async fn unrepresentable_timeout_has_no_deadline() {
        let token = CancelToken::none().with_timeout(Duration::MAX);
        token.check().unwrap();
        token.sleep(Duration::from_secs(3600)).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn handle_cancels_waiters() {
        let (handle, token) = CancelToken::channel();
        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { token.sleep(Duration::from_secs(30)).await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;
        handle.cancel();
        let res = waiter.await.unwrap();
        assert!(matches!(res, Err(SigtraderError::Cancelled)));
        assert!(token.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_handle_never_cancels() {
        let (handle, token) = CancelToken::channel();
        drop(handle);
        token.sleep(Duration::from_secs(5)).await.unwrap();
    }
}
