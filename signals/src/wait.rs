use std::future::Future;
use std::sync::Arc;

use tracing::trace;

use crate::signal::{GetReadCell, Signal};

/// Waiting on signal values asynchronously
pub trait Wait<T: 'static> {
    /// Resolve once the signal holds `target`
    fn wait_value(&self, target: T) -> impl Future<Output = ()> + Send
    where T: PartialEq + Send + Sync;

    /// Resolve once `predicate` yields a result for the present value
    fn wait_for<F, R>(&self, predicate: F) -> impl Future<Output = R::Output> + Send
    where
        F: Fn(&T) -> R + Send + Sync + 'static,
        R: WaitResult,
        T: Send + Sync;
}

/// Return type of a `wait_for` predicate.
///
/// `Some(output)` stops waiting and yields `output`; `None` keeps waiting.
pub trait WaitResult {
    type Output;
    fn result(self) -> Option<Self::Output>;
}

impl WaitResult for bool {
    type Output = ();
    fn result(self) -> Option<Self::Output> { self.then_some(()) }
}

impl<T> WaitResult for Option<T> {
    type Output = T;
    fn result(self) -> Option<Self::Output> { self }
}

impl<T, S> Wait<T> for S
where
    S: Signal + GetReadCell<T> + Sync,
    T: Send + Sync + 'static,
{
    fn wait_value(&self, target: T) -> impl Future<Output = ()> + Send
    where T: PartialEq + Send + Sync {
        self.wait_for(move |value| *value == target)
    }

    fn wait_for<F, R>(&self, predicate: F) -> impl Future<Output = R::Output> + Send
    where
        F: Fn(&T) -> R + Send + Sync + 'static,
        R: WaitResult,
        T: Send + Sync,
    {
        async move {
            let cell = self.get_readcell();

            // subscribe before the first check so a change between the two is not missed
            let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
            let _guard = self.listen(Arc::new(move || {
                let _ = tx.send(());
            }));

            loop {
                if let Some(output) = cell.with(|value| predicate(value).result()) {
                    return output;
                }
                trace!("wait_for: predicate not satisfied, waiting for next change");
                if rx.recv().await.is_none() {
                    // the guard keeps the sender alive for as long as we hold &self
                    unreachable!("signal listener channel closed while waiting");
                }
            }
        }
    }
}
