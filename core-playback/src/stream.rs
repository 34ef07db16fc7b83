//! Stream combinators used to re-expose observables across backend and
//! context switches.

use futures::stream::{self, BoxStream, StreamExt};

pub use core_library::stream::watch_stream;

/// Map every outer item to an inner stream and forward only the most recent
/// inner stream.
///
/// The previous inner stream is dropped as soon as the outer stream yields.
/// Ends once the outer stream and the last inner stream have both ended.
pub fn switch_map<T, U, F>(outer: BoxStream<'static, T>, f: F) -> BoxStream<'static, U>
where
    T: Send + 'static,
    U: Send + 'static,
    F: FnMut(T) -> BoxStream<'static, U> + Send + 'static,
{
    struct State<T, U, F> {
        outer: Option<BoxStream<'static, T>>,
        inner: Option<BoxStream<'static, U>>,
        f: F,
    }

    enum Step<T, U> {
        Outer(Option<T>),
        Inner(Option<U>),
    }

    let state = State {
        outer: Some(outer),
        inner: None,
        f,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            let step = match (state.outer.as_mut(), state.inner.as_mut()) {
                (None, None) => return None,
                (Some(outer), None) => Step::Outer(outer.next().await),
                (None, Some(inner)) => Step::Inner(inner.next().await),
                (Some(outer), Some(inner)) => tokio::select! {
                    biased;
                    next = outer.next() => Step::Outer(next),
                    next = inner.next() => Step::Inner(next),
                },
            };

            match step {
                Step::Outer(Some(value)) => state.inner = Some((state.f)(value)),
                Step::Outer(None) => state.outer = None,
                Step::Inner(Some(value)) => return Some((value, state)),
                Step::Inner(None) => state.inner = None,
            }
        }
    })
    .boxed()
}

/// Pair the latest values of two streams.
///
/// Emits once both streams have produced a value, then on every item of
/// either stream. Ends when both streams have ended, or when one ends before
/// producing anything.
pub fn combine_latest<A, B>(
    first: BoxStream<'static, A>,
    second: BoxStream<'static, B>,
) -> BoxStream<'static, (A, B)>
where
    A: Clone + Send + 'static,
    B: Clone + Send + 'static,
{
    struct State<A, B> {
        first: Option<BoxStream<'static, A>>,
        second: Option<BoxStream<'static, B>>,
        latest_first: Option<A>,
        latest_second: Option<B>,
    }

    enum Step<A, B> {
        First(Option<A>),
        Second(Option<B>),
    }

    let state = State {
        first: Some(first),
        second: Some(second),
        latest_first: None,
        latest_second: None,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            let step = match (state.first.as_mut(), state.second.as_mut()) {
                (None, None) => return None,
                (Some(first), None) => Step::First(first.next().await),
                (None, Some(second)) => Step::Second(second.next().await),
                (Some(first), Some(second)) => tokio::select! {
                    next = first.next() => Step::First(next),
                    next = second.next() => Step::Second(next),
                },
            };

            match step {
                Step::First(Some(value)) => state.latest_first = Some(value),
                Step::Second(Some(value)) => state.latest_second = Some(value),
                Step::First(None) => {
                    state.first = None;
                    if state.latest_first.is_none() {
                        return None;
                    }
                    continue;
                }
                Step::Second(None) => {
                    state.second = None;
                    if state.latest_second.is_none() {
                        return None;
                    }
                    continue;
                }
            }

            if let (Some(first), Some(second)) = (&state.latest_first, &state.latest_second) {
                let pair = (first.clone(), second.clone());
                return Some((pair, state));
            }
        }
    })
    .boxed()
}
