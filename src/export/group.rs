//! Fail-fast join group
//!
//! A scoped set of tasks sharing one cancellation token. The first failure
//! cancels the token and becomes the group's result; later failures are
//! dropped. Dropping a group before [`JoinGroup::wait`] returns aborts every
//! task still running, so no work outlives the scope that spawned it.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::ExportError;

type FirstError = Arc<Mutex<Option<ExportError>>>;

pub struct JoinGroup {
    tasks: JoinSet<()>,
    token: CancellationToken,
    first_error: FirstError,
}

fn record_failure(first_error: &FirstError, token: &CancellationToken, err: ExportError) {
    {
        let mut slot = first_error.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            debug!(error = %err, "join group failed");
            *slot = Some(err);
        }
    }
    token.cancel();
}

impl JoinGroup {
    /// Create a group whose token is a child of `parent`: cancelling the
    /// parent cancels the group, a failure in the group leaves the parent
    /// untouched.
    pub fn new(parent: &CancellationToken) -> Self {
        Self {
            tasks: JoinSet::new(),
            token: parent.child_token(),
            first_error: Arc::new(Mutex::new(None)),
        }
    }

    /// The group's shared cancellation token.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Number of tasks not yet collected by [`JoinGroup::wait`].
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Spawn a task that receives the group's token.
    ///
    /// Returns `false`, without running `task`, once the group is cancelled.
    pub fn spawn<F, Fut>(&mut self, task: F) -> bool
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<(), ExportError>> + Send + 'static,
    {
        if self.token.is_cancelled() {
            return false;
        }

        let token = self.token.clone();
        let first_error = Arc::clone(&self.first_error);
        let work = task(token.clone());

        self.tasks.spawn(async move {
            if let Err(err) = work.await {
                record_failure(&first_error, &token, err);
            }
        });
        true
    }

    /// Record a failure observed outside of a task, e.g. by the loop that
    /// feeds the group.
    pub fn fail(&self, err: ExportError) {
        record_failure(&self.first_error, &self.token, err);
    }

    /// Wait for every spawned task, then report the first failure.
    pub async fn wait(mut self) -> Result<(), ExportError> {
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(join_err) = joined {
                let reason = if join_err.is_panic() {
                    "task panicked"
                } else {
                    "task was aborted"
                };
                record_failure(
                    &self.first_error,
                    &self.token,
                    ExportError::TaskFailed(reason.to_string()),
                );
            }
        }

        let first = self
            .first_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match first {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::error::{StoreError, StoreErrorKind};

    fn failure(path: &str) -> ExportError {
        ExportError::Fetch {
            path: path.to_string(),
            source: StoreError::new(StoreErrorKind::Other, "boom"),
        }
    }

    #[tokio::test]
    async fn test_wait_collects_all_tasks() {
        let done = Arc::new(AtomicUsize::new(0));
        let mut group = JoinGroup::new(&CancellationToken::new());

        for _ in 0..10 {
            let done = Arc::clone(&done);
            assert!(group.spawn(|_| async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                done.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }));
        }

        assert_eq!(group.len(), 10);
        group.wait().await.unwrap();
        assert_eq!(done.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn test_first_failure_cancels_siblings() {
        let mut group = JoinGroup::new(&CancellationToken::new());
        let observed_cancel = Arc::new(AtomicUsize::new(0));

        group.spawn(|_| async { Err(failure("a/1")) });
        for _ in 0..3 {
            let observed_cancel = Arc::clone(&observed_cancel);
            group.spawn(|token| async move {
                token.cancelled().await;
                observed_cancel.fetch_add(1, Ordering::SeqCst);
                Err(ExportError::Cancelled)
            });
        }

        let err = group.wait().await.unwrap_err();
        assert_eq!(err.origin_path(), Some("a/1"));
        assert_eq!(observed_cancel.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_no_spawn_after_failure() {
        let mut group = JoinGroup::new(&CancellationToken::new());
        group.fail(failure("a/1"));

        let ran = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&ran);
        let spawned = group.spawn(move |_| async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        assert!(!spawned);
        assert!(group.is_empty());
        assert!(group.wait().await.is_err());
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_parent_cancellation_reaches_group() {
        let parent = CancellationToken::new();
        let group = JoinGroup::new(&parent);
        parent.cancel();
        assert!(group.token().is_cancelled());
    }

    #[tokio::test]
    async fn test_group_failure_does_not_cancel_parent() {
        let parent = CancellationToken::new();
        let group = JoinGroup::new(&parent);
        group.fail(failure("a/1"));
        assert!(group.token().is_cancelled());
        assert!(!parent.is_cancelled());
    }

    #[tokio::test]
    async fn test_panicking_task_is_reported() {
        let mut group = JoinGroup::new(&CancellationToken::new());
        group.spawn(|_| async {
            if true {
                panic!("exporter bug");
            }
            Ok(())
        });

        let err = group.wait().await.unwrap_err();
        assert!(matches!(err, ExportError::TaskFailed(_)));
    }

    #[tokio::test]
    async fn test_dropping_group_aborts_tasks() {
        let finished = Arc::new(AtomicUsize::new(0));
        let mut group = JoinGroup::new(&CancellationToken::new());
        let counter = Arc::clone(&finished);
        group.spawn(move |_| async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        drop(group);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 0);
    }
}
