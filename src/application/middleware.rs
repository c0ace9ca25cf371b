//! Action middleware
//!
//! Every dispatched [`WizardAction`] passes through the registered
//! middleware in order. A middleware may forward the action unchanged,
//! forward a different action, or drop it by not calling [`Next::run`].

use crate::domain::state::WizardState;
use crate::types::{FormData, StepId};
use crate::validation::rules::ValidationErrors;
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// A dispatchable wizard action
#[derive(Debug, Clone, PartialEq)]
pub enum WizardAction {
    /// Move forward
    Next,
    /// Move backward
    Prev,
    /// Jump to a step by id
    GoTo {
        /// Target step
        step_id: StepId,
    },
    /// Jump to a step by active-sequence index
    GoToIndex {
        /// Target index
        index: usize,
    },
    /// Jump to the first active step
    First,
    /// Jump to the last active step
    Last,
    /// Skip the current step
    Skip,
    /// Reset to the initial state
    Reset,
    /// Complete the wizard
    Complete,
    /// Cancel the wizard
    Cancel,
    /// Return to the most recently departed step
    Undo,
    /// Merge or replace the working data
    SetData {
        /// Patch or replacement data
        data: FormData,
        /// Replace instead of merge
        replace: bool,
    },
    /// Merge a patch into the working data
    MergeData {
        /// Patch data
        data: FormData,
    },
    /// Set one field
    SetField {
        /// Field name
        field: String,
        /// Field value
        value: Value,
    },
    /// Remove one field
    ClearField {
        /// Field name
        field: String,
    },
    /// Record validation errors for the current step
    SetErrors {
        /// Errors to record
        errors: ValidationErrors,
    },
    /// Clear validation errors
    ClearErrors {
        /// Scope to one step; `None` clears everything
        step_id: Option<StepId>,
    },
}

/// Continuation handed to a middleware
///
/// Calling [`run`](Next::run) forwards an action to the rest of the
/// chain; dropping the continuation swallows the action.
pub struct Next<'a> {
    chain: &'a [Arc<dyn Middleware>],
    index: usize,
    state: &'a WizardState,
    sink: &'a mut Option<WizardAction>,
}

impl<'a> Next<'a> {
    pub(crate) fn start(
        chain: &'a [Arc<dyn Middleware>],
        state: &'a WizardState,
        sink: &'a mut Option<WizardAction>,
    ) -> Self {
        Self {
            chain,
            index: 0,
            state,
            sink,
        }
    }

    /// Forward an action to the rest of the chain
    pub fn run(self, action: WizardAction) -> BoxFuture<'a, ()> {
        async move {
            match self.chain.get(self.index) {
                Some(middleware) => {
                    let next = Next {
                        chain: self.chain,
                        index: self.index + 1,
                        state: self.state,
                        sink: self.sink,
                    };
                    middleware.handle(action, self.state, next).await;
                }
                None => {
                    *self.sink = Some(action);
                }
            }
        }
        .boxed()
    }
}

/// Intercepts dispatched actions
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Handle one action; call `next.run(action)` to forward it
    async fn handle(&self, action: WizardAction, state: &WizardState, next: Next<'_>);
}

/// Blanket middleware for plain async closures that always forward
#[async_trait]
impl<F> Middleware for F
where
    F: Fn(&WizardAction, &WizardState) + Send + Sync,
{
    async fn handle(&self, action: WizardAction, state: &WizardState, next: Next<'_>) {
        self(&action, state);
        next.run(action).await;
    }
}

/// Handle for removing a registered middleware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MiddlewareId(u64);

/// Ordered middleware registry
#[derive(Default)]
pub struct MiddlewareManager {
    entries: Vec<(MiddlewareId, Arc<dyn Middleware>)>,
    next_id: u64,
}

impl fmt::Debug for MiddlewareManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MiddlewareManager")
            .field("entries", &self.entries.len())
            .finish()
    }
}

impl MiddlewareManager {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a middleware to the chain
    pub fn use_middleware(&mut self, middleware: impl Middleware + 'static) -> MiddlewareId {
        self.use_arc(Arc::new(middleware))
    }

    /// Append an already shared middleware to the chain
    pub fn use_arc(&mut self, middleware: Arc<dyn Middleware>) -> MiddlewareId {
        let id = MiddlewareId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, middleware));
        id
    }

    /// Remove a middleware; unknown ids are ignored
    pub fn remove(&mut self, id: MiddlewareId) {
        self.entries.retain(|(entry_id, _)| *entry_id != id);
    }

    /// The chain, in registration order
    pub fn stack(&self) -> Vec<Arc<dyn Middleware>> {
        self.entries
            .iter()
            .map(|(_, middleware)| Arc::clone(middleware))
            .collect()
    }

    /// Remove every middleware
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of registered middleware
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check whether the chain is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Run an action through a chain, returning the surviving action
pub(crate) async fn run_chain(
    chain: &[Arc<dyn Middleware>],
    state: &WizardState,
    action: WizardAction,
) -> Option<WizardAction> {
    let mut sink = None;
    Next::start(chain, state, &mut sink).run(action).await;
    sink
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::state::StateManager;
    use crate::domain::step::{StepDefinition, StepManager};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn snapshot() -> WizardState {
        let steps = StepManager::new(vec![StepDefinition::new("a")], FormData::new());
        StateManager::new(steps, 0).snapshot()
    }

    struct Tracer {
        label: &'static str,
        order: Arc<Mutex<Vec<&'static str>>>,
    }

    #[async_trait]
    impl Middleware for Tracer {
        async fn handle(&self, action: WizardAction, _state: &WizardState, next: Next<'_>) {
            self.order.lock().unwrap().push(self.label);
            next.run(action).await;
        }
    }

    #[tokio::test]
    async fn test_chain_runs_in_registration_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut manager = MiddlewareManager::new();
        for label in ["outer", "inner"] {
            manager.use_middleware(Tracer {
                label,
                order: Arc::clone(&order),
            });
        }

        let state = snapshot();
        let result = run_chain(&manager.stack(), &state, WizardAction::Next).await;
        assert_eq!(result, Some(WizardAction::Next));
        assert_eq!(*order.lock().unwrap(), ["outer", "inner"]);
    }

    struct Swallow;

    #[async_trait]
    impl Middleware for Swallow {
        async fn handle(&self, _action: WizardAction, _state: &WizardState, _next: Next<'_>) {}
    }

    #[tokio::test]
    async fn test_dropping_next_swallows_the_action() {
        let mut manager = MiddlewareManager::new();
        manager.use_middleware(Swallow);

        let state = snapshot();
        let result = run_chain(&manager.stack(), &state, WizardAction::Next).await;
        assert_eq!(result, None);
    }

    struct Rewrite;

    #[async_trait]
    impl Middleware for Rewrite {
        async fn handle(&self, action: WizardAction, _state: &WizardState, next: Next<'_>) {
            let action = match action {
                WizardAction::Next => WizardAction::Skip,
                other => other,
            };
            next.run(action).await;
        }
    }

    #[tokio::test]
    async fn test_middleware_can_replace_the_action() {
        let mut manager = MiddlewareManager::new();
        manager.use_middleware(Rewrite);

        let state = snapshot();
        let result = run_chain(&manager.stack(), &state, WizardAction::Next).await;
        assert_eq!(result, Some(WizardAction::Skip));

        let result = run_chain(&manager.stack(), &state, WizardAction::Prev).await;
        assert_eq!(result, Some(WizardAction::Prev));
    }

    #[tokio::test]
    async fn test_closure_middleware_observes_and_forwards() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let mut manager = MiddlewareManager::new();
        manager.use_middleware(move |_: &WizardAction, _: &WizardState| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let state = snapshot();
        let result = run_chain(&manager.stack(), &state, WizardAction::Reset).await;
        assert_eq!(result, Some(WizardAction::Reset));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let mut manager = MiddlewareManager::new();
        let id = manager.use_middleware(Swallow);
        manager.use_middleware(Swallow);
        assert_eq!(manager.len(), 2);

        manager.remove(id);
        assert_eq!(manager.len(), 1);

        manager.clear();
        assert!(manager.is_empty());
    }

    #[tokio::test]
    async fn test_empty_chain_passes_the_action_through() {
        let state = snapshot();
        let result = run_chain(&[], &state, WizardAction::Complete).await;
        assert_eq!(result, Some(WizardAction::Complete));
    }
}
