//! Internal wizard state and the derived public snapshot
//!
//! [`StateManager`] owns the raw navigation state plus the step
//! registry and validation engine, derives the consumer-facing
//! [`WizardState`] on demand, and notifies subscribers whenever an
//! update produces a logically different snapshot.

use crate::domain::step::{Step, StepManager};
use crate::types::{FormData, NavigationDirection, StepId};
use crate::validation::rules::ValidationErrors;
use crate::validation::ValidationEngine;
use serde::Serialize;
use std::fmt;

/// Raw mutable state behind the derived snapshot
#[derive(Debug, Clone, Default)]
pub struct InternalState {
    /// Index of the current step within the active sequence
    pub current_index: usize,
    /// Working form data
    pub data: FormData,
    /// Ids of departed steps, most recent last
    pub history: Vec<StepId>,
    /// Whether the wizard has completed
    pub is_complete: bool,
    /// Whether an async operation is in flight
    pub is_loading: bool,
    /// Whether validation is in flight
    pub is_validating: bool,
    /// Direction of the most recent move
    pub direction: Option<NavigationDirection>,
}

/// Consumer-facing snapshot of the whole wizard
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WizardState {
    /// The current step
    pub current_step: Step,
    /// Index of the current step within the active sequence
    pub current_index: usize,
    /// All steps, in definition order
    pub steps: Vec<Step>,
    /// Active steps, in definition order
    pub active_steps: Vec<Step>,
    /// Working form data
    pub data: FormData,
    /// Validation errors of the current step
    pub errors: ValidationErrors,
    /// Ids of departed steps, most recent last
    pub history: Vec<StepId>,
    /// Whether the current step is the first active step
    pub is_first: bool,
    /// Whether the current step is the last active step
    pub is_last: bool,
    /// Whether the wizard has completed
    pub is_complete: bool,
    /// Whether forward navigation is possible
    pub can_go_next: bool,
    /// Whether backward navigation is possible
    pub can_go_prev: bool,
    /// Completion fraction in `[0, 1]`
    pub progress: f64,
    /// Completion percentage in `[0, 100]`
    pub progress_percent: f64,
    /// Number of steps already passed
    pub completed_steps: usize,
    /// Number of active steps
    pub total_steps: usize,
    /// Whether an async operation is in flight
    pub is_loading: bool,
    /// Whether validation is in flight
    pub is_validating: bool,
}

/// Handle for removing a state subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Subscriber = Box<dyn Fn(&WizardState, &WizardState) + Send + Sync>;

/// Owner of the internal state, the step registry, and the validation
/// engine
pub struct StateManager {
    state: InternalState,
    steps: StepManager,
    validation: ValidationEngine,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
    next_subscription: u64,
}

impl fmt::Debug for StateManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateManager")
            .field("state", &self.state)
            .field("steps", &self.steps)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl StateManager {
    /// Create a manager over the step registry with the given initial
    /// active-sequence index
    pub fn new(steps: StepManager, initial_index: usize) -> Self {
        let data = steps.data().clone();
        Self {
            state: InternalState {
                current_index: initial_index,
                data,
                ..InternalState::default()
            },
            steps,
            validation: ValidationEngine::new(),
            subscribers: Vec::new(),
            next_subscription: 0,
        }
    }

    /// Borrow the raw internal state
    pub fn internal(&self) -> &InternalState {
        &self.state
    }

    /// Borrow the step registry
    pub fn steps(&self) -> &StepManager {
        &self.steps
    }

    /// Mutably borrow the step registry
    ///
    /// Error and data mutations must go through here so the derived
    /// step list stays consistent.
    pub fn steps_mut(&mut self) -> &mut StepManager {
        &mut self.steps
    }

    /// Borrow the validation engine
    pub fn validation(&self) -> &ValidationEngine {
        &self.validation
    }

    /// Derive the current snapshot
    ///
    /// When the current index points past the active sequence (data
    /// changes can deactivate steps), the current step falls back to
    /// the first active step, then to the first defined step.
    pub fn snapshot(&self) -> WizardState {
        let all_steps = self.steps.steps().to_vec();
        let active: Vec<Step> = all_steps.iter().filter(|s| s.is_active).cloned().collect();
        let index = self.state.current_index;

        let current = active
            .get(index)
            .or_else(|| active.first())
            .or_else(|| all_steps.first())
            .cloned()
            .unwrap_or_else(Self::fallback_step);

        let mark = |step: &Step| -> Step {
            let mut step = step.clone();
            step.is_current = step.id == current.id;
            if let Some(pos) = active.iter().position(|a| a.id == step.id) {
                step.is_completed = pos < index;
            }
            if step.is_current || step.is_completed {
                step.is_upcoming = false;
            }
            step
        };

        let steps: Vec<Step> = all_steps.iter().map(mark).collect();
        let active_steps: Vec<Step> = active.iter().map(mark).collect();
        let current_step = mark(&current);

        let total = active_steps.len();
        let progress = if total > 0 {
            (index as f64 / total as f64).min(1.0)
        } else {
            0.0
        };

        let errors = self
            .steps
            .errors_for(&current_step.id)
            .cloned()
            .unwrap_or_default();

        WizardState {
            is_first: index == 0,
            is_last: total > 0 && index == total - 1,
            can_go_next: index + 1 < total && !self.state.is_complete,
            can_go_prev: index > 0,
            progress,
            progress_percent: progress * 100.0,
            completed_steps: index.min(total),
            total_steps: total,
            current_step,
            current_index: index,
            steps,
            active_steps,
            data: self.state.data.clone(),
            errors,
            history: self.state.history.clone(),
            is_complete: self.state.is_complete,
            is_loading: self.state.is_loading,
            is_validating: self.state.is_validating,
        }
    }

    fn fallback_step() -> Step {
        Step {
            id: StepId::from("fallback"),
            index: 0,
            title: None,
            description: None,
            icon: None,
            meta: None,
            is_active: false,
            is_completed: false,
            is_current: true,
            is_upcoming: false,
            is_disabled: false,
            can_skip: false,
            has_error: false,
            errors: ValidationErrors::new(),
        }
    }

    /// Apply a mutation and notify subscribers if the derived snapshot
    /// changed
    pub fn update(&mut self, mutate: impl FnOnce(&mut InternalState)) {
        let prev = self.snapshot();
        mutate(&mut self.state);
        // Keep the step registry's data view in sync
        if self.state.data != *self.steps.data() {
            let data = self.state.data.clone();
            self.steps.update_data(data);
        }
        let next = self.snapshot();
        if next != prev {
            for (_, subscriber) in &self.subscribers {
                subscriber(&next, &prev);
            }
        }
    }

    /// Replace the working data, rebuilding derived steps, and notify
    pub fn apply_data(&mut self, next: FormData) {
        self.update(|state| state.data = next);
    }

    /// Force a notification pass even without an internal-state change
    ///
    /// Used after error-map mutations, which live in the step registry
    /// rather than the internal state.
    pub fn touch(&mut self) {
        self.update(|_| {});
    }

    /// Register a subscriber called with `(new, old)` snapshots
    pub fn subscribe(
        &mut self,
        subscriber: impl Fn(&WizardState, &WizardState) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.subscribers.push((id, Box::new(subscriber)));
        id
    }

    /// Remove a subscriber; unknown ids are ignored
    pub fn unsubscribe(&mut self, id: SubscriptionId) {
        self.subscribers.retain(|(sub_id, _)| *sub_id != id);
    }
}

/// Narrow capability surface handed to lifecycle hooks
///
/// Hooks observe the working data and may patch it; they cannot
/// navigate, emit events, or touch subscriptions.
pub struct HookContext<'a> {
    state: &'a mut StateManager,
    step: StepId,
}

impl<'a> HookContext<'a> {
    pub(crate) fn new(state: &'a mut StateManager, step: StepId) -> Self {
        Self { state, step }
    }

    /// The step the hook is attached to
    pub fn step_id(&self) -> &StepId {
        &self.step
    }

    /// The current working data
    pub fn data(&self) -> &FormData {
        &self.state.internal().data
    }

    /// Merge a patch into the working data
    pub fn set_data(&mut self, patch: FormData) {
        let next = self.state.internal().data.merged(patch);
        self.state.apply_data(next);
    }
}
