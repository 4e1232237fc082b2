//! Reducer harness: reduce one action against a given state, then inspect the
//! resulting state, the effects, and the actions those effects feed back.

#![allow(clippy::module_name_repetitions)]

use gatepass_core::{SmallVec, effect::Effect, reducer::Reducer};

/// A reducer bound to the environment its effects will run against
///
/// ```ignore
/// use gatepass_testing::ReducerTest;
///
/// let harness = ReducerTest::new(TicketReducer::new(), env);
/// let mut step = harness
///     .reduce(board, TicketAction::send(row, AttemptId::new(1)))
///     .assert_state(|board| assert!(board.get(row).unwrap().status.is_sending()));
///
/// let fed_back = step.feedback().await;
/// assert!(matches!(fed_back[..], [TicketAction::Delivered { .. }]));
/// ```
pub struct ReducerTest<R: Reducer> {
    reducer: R,
    env: R::Environment,
}

impl<R: Reducer> ReducerTest<R> {
    /// Bind `reducer` to `env`
    #[must_use]
    pub const fn new(reducer: R, env: R::Environment) -> Self {
        Self { reducer, env }
    }

    /// Reduce `action` against `state`
    #[must_use]
    pub fn reduce(&self, mut state: R::State, action: R::Action) -> Reduction<R::State, R::Action> {
        let effects = self.reducer.reduce(&mut state, action, &self.env);
        Reduction { state, effects }
    }
}

/// State and effects left by one reduction
pub struct Reduction<S, A> {
    /// State after the action was applied
    pub state: S,
    effects: SmallVec<[Effect<A>; 4]>,
}

impl<S, A> Reduction<S, A> {
    /// Check the resulting state
    #[must_use]
    pub fn assert_state<F: FnOnce(&S)>(self, check: F) -> Self {
        check(&self.state);
        self
    }

    /// Check the effects returned by the reducer
    #[must_use]
    pub fn assert_effects<F: FnOnce(&[Effect<A>])>(self, check: F) -> Self {
        check(&self.effects);
        self
    }

    /// Effects still waiting to be resolved
    #[must_use]
    pub fn effects(&self) -> &[Effect<A>] {
        &self.effects
    }
}

impl<S, A: Send> Reduction<S, A> {
    /// Run every effect and collect the actions they feed back, in order
    ///
    /// The effects are consumed; a second call returns nothing.
    pub async fn feedback(&mut self) -> Vec<A> {
        let mut fed_back = Vec::new();
        for effect in std::mem::take(&mut self.effects) {
            fed_back.extend(assertions::resolve(effect).await);
        }
        fed_back
    }
}

/// Checks over a slice of effects
pub mod assertions {
    use gatepass_core::effect::Effect;

    /// Only `Effect::None`, or nothing at all
    ///
    /// # Panics
    ///
    /// Panics if any effect does work.
    #[allow(clippy::panic)]
    pub fn assert_no_effects<A: std::fmt::Debug>(effects: &[Effect<A>]) {
        assert!(
            effects.iter().all(|effect| matches!(effect, Effect::None)),
            "expected an inert reduction, got {effects:?}"
        );
    }

    /// Exactly one effect, and it runs async work
    ///
    /// # Panics
    ///
    /// Panics otherwise.
    #[allow(clippy::panic)]
    pub fn assert_single_future<A>(effects: &[Effect<A>]) {
        assert!(
            matches!(effects, [Effect::Future(_)]),
            "expected one future effect, got {} effects",
            effects.len()
        );
    }

    /// Drive an effect and collect every action it feeds back
    ///
    /// `Delay` effects resolve immediately; nested effects are flattened in order.
    pub async fn resolve<A: Send>(effect: Effect<A>) -> Vec<A> {
        let mut out = Vec::new();
        let mut stack = vec![effect];
        while let Some(effect) = stack.pop() {
            match effect {
                Effect::None => {},
                Effect::Future(fut) => out.extend(fut.await),
                Effect::Delay { action, .. } => out.push(*action),
                Effect::Parallel(effects) | Effect::Sequential(effects) => {
                    stack.extend(effects.into_iter().rev());
                },
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatepass_core::smallvec;

    /// Tally of tickets handed out at a door
    #[derive(Debug, Default)]
    struct Door {
        admitted: u32,
    }

    #[derive(Clone, Debug, PartialEq)]
    enum DoorAction {
        Admit,
        Scan { valid: bool },
    }

    struct DoorReducer;

    impl Reducer for DoorReducer {
        type State = Door;
        type Action = DoorAction;
        type Environment = u32;

        fn reduce(
            &self,
            state: &mut Door,
            action: DoorAction,
            capacity: &u32,
        ) -> SmallVec<[Effect<DoorAction>; 4]> {
            match action {
                DoorAction::Admit if state.admitted < *capacity => {
                    state.admitted += 1;
                    smallvec![Effect::None]
                },
                DoorAction::Admit => SmallVec::new(),
                DoorAction::Scan { valid } => {
                    if valid {
                        smallvec![Effect::future(async { Some(DoorAction::Admit) })]
                    } else {
                        SmallVec::new()
                    }
                },
            }
        }
    }

    #[test]
    fn admit_respects_capacity() {
        let harness = ReducerTest::new(DoorReducer, 1);

        let full = harness
            .reduce(Door::default(), DoorAction::Admit)
            .assert_state(|door| assert_eq!(door.admitted, 1))
            .assert_effects(assertions::assert_no_effects);

        let _ = harness
            .reduce(full.state, DoorAction::Admit)
            .assert_state(|door| assert_eq!(door.admitted, 1));
    }

    #[tokio::test]
    async fn valid_scan_feeds_back_admit() {
        let harness = ReducerTest::new(DoorReducer, 10);

        let mut step = harness
            .reduce(Door::default(), DoorAction::Scan { valid: true })
            .assert_effects(assertions::assert_single_future);

        assert_eq!(step.feedback().await, [DoorAction::Admit]);
        assert!(step.feedback().await.is_empty());
        assert_eq!(step.state.admitted, 0);
    }

    #[tokio::test]
    async fn invalid_scan_does_nothing() {
        let mut step = ReducerTest::new(DoorReducer, 10)
            .reduce(Door::default(), DoorAction::Scan { valid: false });

        assertions::assert_no_effects(step.effects());
        assert!(step.feedback().await.is_empty());
    }

    #[tokio::test]
    async fn resolve_flattens_nested_effects_in_order() {
        let effect = Effect::Sequential(vec![
            Effect::future(async { Some(DoorAction::Scan { valid: true }) }),
            Effect::Parallel(vec![Effect::None, Effect::emit(DoorAction::Admit)]),
        ]);

        assert_eq!(
            assertions::resolve(effect).await,
            [DoorAction::Scan { valid: true }, DoorAction::Admit]
        );
    }
}
