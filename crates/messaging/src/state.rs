use crate::error::{Error, Result};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Shared state that tasks can wait on.
///
/// Every change is broadcast; waiters re-check their predicate against the
/// latest value after each notification, so missed intermediate states never
/// cause a missed wakeup.
#[derive(Debug)]
pub struct StateWatch<S> {
    sender: watch::Sender<S>,
}

impl<S> StateWatch<S>
where
    S: Clone + Send + Sync + 'static,
{
    /// Creates a watch holding `initial`.
    #[must_use]
    pub fn new(initial: S) -> Self {
        let (sender, _) = watch::channel(initial);

        Self { sender }
    }

    /// Replaces the state and wakes all waiters.
    pub fn set(&self, state: S) {
        self.sender.send_replace(state);
    }

    /// Mutates the state in place. Waiters are woken only if `modify` returns true.
    pub fn update<F>(&self, modify: F) -> bool
    where
        F: FnOnce(&mut S) -> bool,
    {
        self.sender.send_if_modified(modify)
    }

    /// A copy of the current state.
    #[must_use]
    pub fn current(&self) -> S {
        self.sender.borrow().clone()
    }

    /// A receiver notified on every change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<S> {
        self.sender.subscribe()
    }

    /// Waits until `predicate` holds for the state and returns that state.
    /// Returns immediately if it already holds, even when `cancel` has fired.
    ///
    /// # Errors
    ///
    /// Returns `Error::Cancelled` if `cancel` fires before the predicate holds.
    pub async fn wait_for<F>(&self, mut predicate: F, cancel: &CancellationToken) -> Result<S>
    where
        F: FnMut(&S) -> bool + Send,
    {
        let mut receiver = self.sender.subscribe();

        {
            let current = receiver.borrow_and_update();
            if predicate(&current) {
                return Ok(current.clone());
            }
        }

        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(Error::Cancelled),
            result = receiver.wait_for(|state| predicate(state)) => match result {
                Ok(state) => Ok(state.clone()),
                // The sender lives in `self`, so the channel cannot close while we wait.
                Err(_) => Err(Error::Cancelled),
            },
        }
    }
}

impl<S> Default for StateWatch<S>
where
    S: Clone + Default + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(S::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    enum Role {
        #[default]
        Follower,
        Candidate,
        Leader,
    }

    #[tokio::test]
    async fn test_satisfied_predicate_returns_immediately() {
        let watch = StateWatch::new(Role::Leader);

        let role = watch
            .wait_for(|role| *role == Role::Leader, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(role, Role::Leader);
    }

    #[tokio::test]
    async fn test_waits_through_intermediate_states() {
        let watch = Arc::new(StateWatch::<Role>::default());
        let waiter = {
            let watch = watch.clone();
            tokio::spawn(async move {
                watch
                    .wait_for(|role| *role == Role::Leader, &CancellationToken::new())
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(5)).await;
        watch.set(Role::Candidate);
        watch.set(Role::Follower);
        watch.set(Role::Candidate);
        watch.set(Role::Leader);

        assert_eq!(waiter.await.unwrap().unwrap(), Role::Leader);
        assert_eq!(watch.current(), Role::Leader);
    }

    #[tokio::test]
    async fn test_satisfied_predicate_beats_cancelled_token() {
        let watch = StateWatch::new(Role::Leader);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let role = watch
            .wait_for(|role| *role == Role::Leader, &cancel)
            .await
            .unwrap();

        assert_eq!(role, Role::Leader);
    }

    #[tokio::test]
    async fn test_cancellation_wins() {
        let watch = StateWatch::new(Role::Follower);
        let cancel = CancellationToken::new();

        let waiter = watch.wait_for(|role| *role == Role::Leader, &cancel);
        cancel.cancel();

        assert!(matches!(waiter.await, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn test_update_without_change_does_not_notify() {
        let watch = StateWatch::new(0_u32);
        let mut receiver = watch.subscribe();

        assert!(!watch.update(|_| false));
        assert!(!receiver.has_changed().unwrap());

        assert!(watch.update(|value| {
            *value += 1;
            true
        }));
        assert!(receiver.has_changed().unwrap());
        assert_eq!(watch.current(), 1);
    }
}
