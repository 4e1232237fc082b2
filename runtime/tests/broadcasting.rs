//! Integration tests for Store action broadcasting
//!
//! Request/response callers rely on two properties: a result action is only
//! published after the reducer applied it, and concurrent waiters can pick out
//! their own result by correlation id.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use gatepass_core::{SmallVec, effect::Effect, reducer::Reducer, smallvec};
use gatepass_runtime::{Store, StoreError};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Test Fixtures
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum JobAction {
    /// Start a two-step job
    Start { id: u64 },
    /// First step finished
    Halfway { id: u64 },
    /// Job finished (terminal)
    Finished { id: u64 },
}

#[derive(Debug, Clone, Default)]
struct JobState {
    progress: BTreeMap<u64, u8>,
}

#[derive(Clone)]
struct JobReducer;

impl Reducer for JobReducer {
    type State = JobState;
    type Action = JobAction;
    type Environment = ();

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        _env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            JobAction::Start { id } => {
                state.progress.insert(id, 0);
                smallvec![Effect::future(async move {
                    tokio::time::sleep(Duration::from_millis(5 * (id % 3))).await;
                    Some(JobAction::Halfway { id })
                })]
            },
            JobAction::Halfway { id } => {
                state.progress.insert(id, 1);
                smallvec![Effect::emit(JobAction::Finished { id })]
            },
            JobAction::Finished { id } => {
                state.progress.insert(id, 2);
                smallvec![Effect::None]
            },
        }
    }
}

fn job_store() -> Store<JobState, JobAction, (), JobReducer> {
    Store::new(JobState::default(), JobReducer, ())
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn terminal_action_is_applied_before_it_is_published() {
    let store = job_store();

    let result = store
        .send_and_wait_for(
            JobAction::Start { id: 7 },
            |a| matches!(a, JobAction::Finished { id: 7 }),
            Duration::from_secs(1),
        )
        .await
        .unwrap();

    assert_eq!(result, JobAction::Finished { id: 7 });
    assert_eq!(store.state(|s| s.progress.get(&7).copied()).await, Some(2));
}

#[tokio::test]
async fn concurrent_waiters_receive_their_own_result() {
    let store = Arc::new(job_store());

    let mut tasks = Vec::new();
    for id in 1..=6 {
        let store = Arc::clone(&store);
        tasks.push(tokio::spawn(async move {
            store
                .send_and_wait_for(
                    JobAction::Start { id },
                    move |a| matches!(a, JobAction::Finished { id: done } if *done == id),
                    Duration::from_secs(2),
                )
                .await
        }));
    }

    for (index, task) in tasks.into_iter().enumerate() {
        let id = index as u64 + 1;
        assert_eq!(task.await.unwrap().unwrap(), JobAction::Finished { id });
    }

    let finished = store
        .state(|s| s.progress.values().filter(|p| **p == 2).count())
        .await;
    assert_eq!(finished, 6);
}

#[tokio::test]
async fn waiting_for_an_action_that_never_comes_times_out() {
    let store = job_store();

    let result = store
        .send_and_wait_for(
            JobAction::Start { id: 1 },
            |a| matches!(a, JobAction::Finished { id: 999 }),
            Duration::from_millis(50),
        )
        .await;

    assert_eq!(result, Err(StoreError::Timeout));
}

#[tokio::test]
async fn shutdown_lets_running_effects_settle() {
    let store = job_store();
    store.send(JobAction::Start { id: 2 }).await.unwrap();

    store.shutdown(Duration::from_secs(1)).await.unwrap();

    // Both fed-back steps were reduced while draining
    assert_eq!(store.state(|s| s.progress.get(&2).copied()).await, Some(2));
}

#[tokio::test]
async fn shutdown_rejects_new_actions() {
    let store = job_store();
    store.shutdown(Duration::from_secs(1)).await.unwrap();

    let result = store.send(JobAction::Start { id: 4 }).await;

    assert!(matches!(result, Err(StoreError::ShutdownInProgress)));
    assert_eq!(store.state(|s| s.progress.get(&4).copied()).await, None);
}
