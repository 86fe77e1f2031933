//! Explicit logging context for pipeline runs.

use tracing::Dispatch;

/// Carries the log sink of one run.
///
/// Pipeline entry points execute inside [`RunContext::scope`], so every
/// `tracing` event they emit goes to the injected dispatcher rather than to
/// whatever happens to be installed globally.
#[derive(Clone)]
pub struct RunContext {
    dispatch: Dispatch,
}

impl RunContext {
    pub fn new(dispatch: Dispatch) -> Self {
        Self { dispatch }
    }

    /// A context that discards every event.
    pub fn silent() -> Self {
        Self::new(Dispatch::none())
    }

    /// A context bound to the dispatcher active on the calling thread.
    pub fn current() -> Self {
        Self::new(tracing::dispatcher::get_default(Dispatch::clone))
    }

    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    /// Run `f` with this context's dispatcher as the default.
    pub fn scope<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::dispatcher::with_default(&self.dispatch, f)
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::current()
    }
}
