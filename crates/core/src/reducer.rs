//! Reducer contract: the pure fold that turns an event stream into state.

use core::marker::PhantomData;

/// Deterministic state transition `(prior_state, event) -> next_state`.
///
/// - `State::default()` is the zero value every stream is folded from.
/// - `Event` is the current-revision sum type. Implementations `match` on it,
///   so the compiler rejects a reducer that forgets a variant.
///
/// Reducers must not perform IO or side effects; replaying the same ordered
/// events must always produce the same state.
pub trait Reducer: Send + Sync {
    type State: Clone + Default + core::fmt::Debug + Send + Sync + 'static;
    type Event: Clone + core::fmt::Debug + Send + Sync + 'static;

    fn reduce(&self, state: Self::State, event: &Self::Event) -> Self::State;
}

/// Fold ordered events from the zero state.
pub fn fold<'a, R>(reducer: &R, events: impl IntoIterator<Item = &'a R::Event>) -> R::State
where
    R: Reducer + ?Sized,
{
    events
        .into_iter()
        .fold(R::State::default(), |state, event| reducer.reduce(state, event))
}

/// Adapts a plain function or closure into a [`Reducer`].
pub struct FnReducer<S, E, F> {
    f: F,
    _types: PhantomData<fn(S, &E) -> S>,
}

impl<S, E, F> FnReducer<S, E, F>
where
    F: Fn(S, &E) -> S,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            _types: PhantomData,
        }
    }
}

impl<S, E, F> core::fmt::Debug for FnReducer<S, E, F> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FnReducer").finish_non_exhaustive()
    }
}

impl<S, E, F> Reducer for FnReducer<S, E, F>
where
    S: Clone + Default + core::fmt::Debug + Send + Sync + 'static,
    E: Clone + core::fmt::Debug + Send + Sync + 'static,
    F: Fn(S, &E) -> S + Send + Sync,
{
    type State = S;
    type Event = E;

    fn reduce(&self, state: S, event: &E) -> S {
        (self.f)(state, event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Tally {
        Add(i64),
        Reset,
    }

    #[derive(Debug, Clone, Default, PartialEq, Eq)]
    struct Total {
        value: i64,
        applied: u64,
    }

    fn reducer() -> impl Reducer<State = Total, Event = Tally> {
        FnReducer::new(|state: Total, event: &Tally| match event {
            Tally::Add(n) => Total {
                value: state.value + n,
                applied: state.applied + 1,
            },
            Tally::Reset => Total {
                value: 0,
                applied: state.applied + 1,
            },
        })
    }

    #[test]
    fn folds_from_zero_value() {
        let events = [Tally::Add(2), Tally::Add(3), Tally::Reset, Tally::Add(7)];
        let state = fold(&reducer(), &events);
        assert_eq!(state, Total { value: 7, applied: 4 });
    }

    #[test]
    fn empty_stream_is_zero_value() {
        let state = fold(&reducer(), &[]);
        assert_eq!(state, Total::default());
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn tally() -> impl Strategy<Value = Tally> {
            prop_oneof![
                (-1_000i64..1_000).prop_map(Tally::Add),
                Just(Tally::Reset),
            ]
        }

        proptest! {
            /// Property: folding the same ordered events always yields the same state.
            #[test]
            fn fold_is_deterministic(events in proptest::collection::vec(tally(), 0..64)) {
                let r = reducer();
                let first = fold(&r, &events);
                let second = fold(&r, &events);
                prop_assert_eq!(first, second);
            }

            /// Property: folding a prefix then the suffix equals folding everything.
            #[test]
            fn fold_is_incremental(
                events in proptest::collection::vec(tally(), 0..64),
                split in 0usize..64,
            ) {
                let r = reducer();
                let split = split.min(events.len());
                let (head, tail) = events.split_at(split);
                let resumed = tail
                    .iter()
                    .fold(fold(&r, head), |state, event| r.reduce(state, event));
                prop_assert_eq!(resumed, fold(&r, &events));
            }
        }
    }
}
