// Single-flight coordination
// At most one operation runs at a time; callers arriving meanwhile share its result

use futures::future::{BoxFuture, FutureExt, Shared};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// The shared operation was lost before producing a value (panic or runtime shutdown)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("in-flight operation did not complete: {0}")]
pub struct FlightAborted(String);

type Flight<T> = Shared<BoxFuture<'static, Result<T, FlightAborted>>>;

/// Operation in the slot. `done` is set by the task itself, so completion is
/// visible even when every waiter gave up before polling the result.
struct Pending<T> {
    flight: Flight<T>,
    done: Arc<AtomicBool>,
}

impl<T> Pending<T> {
    fn is_running(&self) -> bool {
        !self.done.load(Ordering::Acquire)
    }
}

/// Marks the operation finished when the task ends, panics included
struct DoneGuard(Arc<AtomicBool>);

impl Drop for DoneGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}

/// One pending-operation slot with any number of waiters.
///
/// The operation runs on its own task, so a waiter that gives up (deadline,
/// dropped future) never cancels it for the others. Results are not kept:
/// once the operation finished the next call starts a new one.
pub struct SingleFlight<T> {
    slot: Mutex<Option<Pending<T>>>,
}

impl<T> Default for SingleFlight<T> {
    fn default() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the operation in flight, or start `start()` if there is none
    pub async fn run<F, Fut>(&self, start: F) -> Result<T, FlightAborted>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let flight = {
            let mut slot = self.slot.lock().await;
            match slot.as_ref() {
                Some(pending) if pending.is_running() => {
                    tracing::debug!("Joining operation already in flight");
                    pending.flight.clone()
                }
                _ => {
                    let done = Arc::new(AtomicBool::new(false));
                    let operation = start();
                    let guard = DoneGuard(done.clone());
                    let handle = tokio::spawn(async move {
                        let _guard = guard;
                        operation.await
                    });
                    let flight: Flight<T> = async move {
                        handle
                            .await
                            .map_err(|e| FlightAborted(e.to_string()))
                    }
                    .boxed()
                    .shared();
                    *slot = Some(Pending {
                        flight: flight.clone(),
                        done,
                    });
                    flight
                }
            }
        };

        flight.await
    }

    /// Whether an operation is currently running
    pub async fn in_flight(&self) -> bool {
        let slot = self.slot.lock().await;
        slot.as_ref().is_some_and(Pending::is_running)
    }

    /// Forget the current operation; it keeps running but new callers won't join it
    pub async fn reset(&self) {
        self.slot.lock().await.take();
    }
}
