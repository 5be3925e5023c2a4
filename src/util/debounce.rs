use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Something that can run a task once after a delay.
pub(crate) trait Scheduler: Clone + 'static {
    fn schedule(&self, delay: Duration, task: Box<dyn FnOnce() + 'static>);
}

/// `setTimeout` on the browser window.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct BrowserScheduler;

impl Scheduler for BrowserScheduler {
    fn schedule(&self, delay: Duration, task: Box<dyn FnOnce() + 'static>) {
        leptos_dom::helpers::set_timeout(task, delay);
    }
}

struct DebounceState<T> {
    pending: Option<T>,
    generation: u64,
}

/// Value holder with a trailing-debounce side effect.
///
/// Every `set` replaces the pending value and restarts the quiet period; the sink only
/// sees a value once it has been left alone for `delay`. Superseded timers are not
/// cancelled, they fire and notice their generation is stale.
pub(crate) struct Debounced<T, S: Scheduler = BrowserScheduler> {
    state: Arc<Mutex<DebounceState<T>>>,
    sink: Arc<dyn Fn(T) + Send + Sync>,
    delay: Duration,
    scheduler: S,
}

impl<T, S: Scheduler> Clone for Debounced<T, S> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            sink: self.sink.clone(),
            delay: self.delay,
            scheduler: self.scheduler.clone(),
        }
    }
}

impl<T: 'static, S: Scheduler> Debounced<T, S> {
    pub fn new(delay: Duration, scheduler: S, sink: impl Fn(T) + Send + Sync + 'static) -> Self {
        Self {
            state: Arc::new(Mutex::new(DebounceState {
                pending: None,
                generation: 0,
            })),
            sink: Arc::new(sink),
            delay,
            scheduler,
        }
    }

    pub fn set(&self, value: T) {
        let generation = {
            let Ok(mut st) = self.state.lock() else {
                return;
            };
            st.pending = Some(value);
            st.generation = st.generation.wrapping_add(1);
            st.generation
        };

        let this = self.clone();
        self.scheduler
            .schedule(self.delay, Box::new(move || this.fire(generation)));
    }

    fn fire(&self, generation: u64) {
        let value = {
            let Ok(mut st) = self.state.lock() else {
                return;
            };
            if st.generation != generation {
                return;
            }
            st.pending.take()
        };

        if let Some(v) = value {
            (self.sink)(v);
        }
    }

    /// Push the pending value out immediately.
    pub fn flush(&self) {
        let value = match self.state.lock() {
            Ok(mut st) => {
                st.generation = st.generation.wrapping_add(1);
                st.pending.take()
            }
            Err(_) => None,
        };

        if let Some(v) = value {
            (self.sink)(v);
        }
    }

    /// Drop the pending value; outstanding timers become no-ops.
    pub fn cancel(&self) {
        if let Ok(mut st) = self.state.lock() {
            st.pending = None;
            st.generation = st.generation.wrapping_add(1);
        }
    }

    #[cfg(test)]
    pub fn is_pending(&self) -> bool {
        self.state
            .lock()
            .map(|st| st.pending.is_some())
            .unwrap_or(false)
    }
}
