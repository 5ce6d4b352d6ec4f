//! Outstanding-work tracking shared by a crawler and its siblings.

use crate::error::CrawlError;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct WorkState {
    pending: usize,
    failed: bool,
}

/// Counts scheduled fetches until every one of them has finished.
///
/// Fetches scheduled by sibling crawlers count against the same group, so
/// waiting on any of them waits for the whole crawl.
#[derive(Debug)]
pub(crate) struct WorkGroup {
    state: watch::Sender<WorkState>,
    fatal: Mutex<Option<CrawlError>>,
}

/// Marks one unit of work as finished when dropped.
#[derive(Debug)]
pub(crate) struct WorkGuard {
    group: Arc<WorkGroup>,
}

impl Drop for WorkGuard {
    fn drop(&mut self) {
        self.group.state.send_modify(|state| {
            state.pending = state.pending.saturating_sub(1);
        });
    }
}

impl WorkGroup {
    pub(crate) fn new() -> Self {
        let (state, _) = watch::channel(WorkState::default());
        Self {
            state,
            fatal: Mutex::new(None),
        }
    }

    /// Registers one unit of outstanding work.
    pub(crate) fn start(self: &Arc<Self>) -> WorkGuard {
        self.state.send_modify(|state| state.pending += 1);
        WorkGuard {
            group: self.clone(),
        }
    }

    /// Records an error that ends the crawl. The first one wins.
    pub(crate) fn fail(&self, error: CrawlError) {
        {
            let mut fatal = self.fatal.lock().unwrap_or_else(PoisonError::into_inner);
            if fatal.is_none() {
                *fatal = Some(error);
            }
        }
        self.state.send_modify(|state| state.failed = true);
    }

    /// Clears any failure left over from a previous run.
    pub(crate) fn reset(&self) {
        self.fatal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.state.send_modify(|state| state.failed = false);
    }

    pub(crate) fn pending(&self) -> usize {
        self.state.borrow().pending
    }

    /// Waits until no work is outstanding or a fatal error was recorded.
    pub(crate) async fn wait(&self) -> Result<(), CrawlError> {
        let mut rx = self.state.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|state| state.pending == 0 || state.failed).await;

        match self
            .fatal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_with_no_work_returns_immediately() {
        let group = WorkGroup::new();
        group.wait().await.unwrap();
    }

    #[tokio::test]
    async fn test_wait_blocks_until_guards_drop() {
        let group = Arc::new(WorkGroup::new());

        let guard = group.start();
        let worker = tokio::spawn(async move {
            let _guard = guard;
            tokio::time::sleep(Duration::from_millis(20)).await;
        });
        assert_eq!(group.pending(), 1);

        group.wait().await.unwrap();
        worker.await.unwrap();
        assert_eq!(group.pending(), 0);
    }

    #[tokio::test]
    async fn test_fail_wakes_waiter_with_first_error() {
        let group = Arc::new(WorkGroup::new());
        let _guard = group.start();

        group.fail(CrawlError::InvalidUrl("first".to_string()));
        group.fail(CrawlError::InvalidUrl("second".to_string()));

        match group.wait().await {
            Err(CrawlError::InvalidUrl(url)) => assert_eq!(url, "first"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_reset_clears_failure() {
        let group = WorkGroup::new();
        group.fail(CrawlError::InvalidUrl("x".to_string()));
        group.reset();
        group.wait().await.unwrap();
    }
}
