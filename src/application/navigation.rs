//! Navigation over the active step sequence
//!
//! [`NavigationController`] implements the transition state machine:
//! branch resolution, explicit successor overrides, linear
//! reachability, validation gating, lifecycle hooks, and the event
//! order around a move. It holds only options; the state manager and
//! emitter are passed into each call.

use crate::domain::events::{EventEmitter, WizardEvent};
use crate::domain::state::{HookContext, StateManager, WizardState};
use crate::types::{NavigationDirection, StepId};
use crate::validation::rules::ValidationErrors;

/// Navigation behavior switches
#[derive(Debug, Clone, Copy)]
pub struct NavigationOptions {
    /// Restrict jumps to visited steps and the immediate successor
    pub linear: bool,
    /// Validate the departing step on forward moves
    pub validate_on_next: bool,
    /// Validate the departing step on backward moves
    pub validate_on_prev: bool,
}

impl Default for NavigationOptions {
    fn default() -> Self {
        Self {
            linear: true,
            validate_on_next: true,
            validate_on_prev: false,
        }
    }
}

/// Drives transitions between active steps
#[derive(Debug, Default)]
pub struct NavigationController {
    options: NavigationOptions,
}

impl NavigationController {
    /// Create a controller with the given options
    pub fn new(options: NavigationOptions) -> Self {
        Self { options }
    }

    /// The controller's options
    pub fn options(&self) -> &NavigationOptions {
        &self.options
    }

    /// Validate one step and record the result
    ///
    /// Returns the errors on failure. Emits `validation:success` on a
    /// pass; emitting `validation:error` is left to the caller so that
    /// silent checks (backward moves) stay silent.
    pub async fn validate_step(
        &self,
        state: &mut StateManager,
        events: &mut EventEmitter,
        id: &StepId,
    ) -> Option<ValidationErrors> {
        let Some(def) = state.steps().definition(id).cloned() else {
            return None;
        };

        state.update(|s| s.is_validating = true);
        let data = state.internal().data.clone();
        let errors = state.validation().validate_all(&data, &def).await;
        state.update(|s| s.is_validating = false);

        match errors {
            Some(errors) => {
                state.steps_mut().set_errors(id.clone(), errors.clone());
                state.touch();
                Some(errors)
            }
            None => {
                state.steps_mut().clear_errors(Some(id));
                state.touch();
                events.emit(&WizardEvent::ValidationSuccess { step: id.clone() });
                None
            }
        }
    }

    /// Resolve the forward target from the current step
    ///
    /// Precedence: the first branch whose condition holds and whose
    /// target is active, then an explicit successor override if its
    /// target is active, then the next step of the active sequence.
    fn next_target(&self, state: &StateManager, snapshot: &WizardState) -> Option<StepId> {
        let data = &snapshot.data;
        let active = &snapshot.active_steps;
        let def = state.steps().definition(&snapshot.current_step.id)?;

        for branch in &def.branches {
            if (branch.condition)(data) && active.iter().any(|s| s.id == branch.next_step) {
                tracing::debug!(branch = %branch.name, target = %branch.next_step, "branch taken");
                return Some(branch.next_step.clone());
            }
        }

        if let Some(target) = &def.next_step {
            let id = target.resolve(data);
            if active.iter().any(|s| s.id == id) {
                return Some(id);
            }
        }

        active.get(snapshot.current_index + 1).map(|s| s.id.clone())
    }

    /// Resolve the backward target from the current step
    ///
    /// Precedence: an explicit predecessor override if its target is
    /// active, then the most recent history entry if still active, then
    /// the previous step of the active sequence.
    fn prev_target(&self, state: &StateManager, snapshot: &WizardState) -> Option<StepId> {
        let data = &snapshot.data;
        let active = &snapshot.active_steps;
        let def = state.steps().definition(&snapshot.current_step.id)?;

        if let Some(target) = &def.prev_step {
            let id = target.resolve(data);
            if active.iter().any(|s| s.id == id) {
                return Some(id);
            }
        }

        if let Some(last) = snapshot.history.last() {
            if active.iter().any(|s| &s.id == last) {
                return Some(last.clone());
            }
        }

        if snapshot.current_index == 0 {
            None
        } else {
            active
                .get(snapshot.current_index - 1)
                .map(|s| s.id.clone())
        }
    }

    /// Move forward; completes the wizard from the last step
    pub async fn next(&self, state: &mut StateManager, events: &mut EventEmitter) -> bool {
        let snapshot = state.snapshot();
        if snapshot.is_last {
            return self.complete(state, events).await;
        }

        let current_id = snapshot.current_step.id.clone();
        if self.options.validate_on_next {
            if let Some(errors) = self.validate_step(state, events, &current_id).await {
                events.emit(&WizardEvent::ValidationError {
                    step: current_id,
                    errors,
                });
                return false;
            }
        }

        // Error recording above may have changed the derived steps
        let snapshot = state.snapshot();
        let Some(target) = self.next_target(state, &snapshot) else {
            return false;
        };
        self.transition(state, events, target, NavigationDirection::Next)
            .await
    }

    /// Move backward
    pub async fn prev(&self, state: &mut StateManager, events: &mut EventEmitter) -> bool {
        let snapshot = state.snapshot();
        if snapshot.is_first {
            return false;
        }

        if self.options.validate_on_prev {
            let current_id = snapshot.current_step.id.clone();
            if self
                .validate_step(state, events, &current_id)
                .await
                .is_some()
            {
                return false;
            }
        }

        let snapshot = state.snapshot();
        let Some(target) = self.prev_target(state, &snapshot) else {
            return false;
        };
        self.transition(state, events, target, NavigationDirection::Prev)
            .await
    }

    /// Jump to a step by id
    ///
    /// The target must exist, be active, and not be disabled. In linear
    /// mode it must additionally be reachable: already visited, or the
    /// immediate successor of the current step.
    pub async fn go_to(
        &self,
        state: &mut StateManager,
        events: &mut EventEmitter,
        id: &StepId,
    ) -> bool {
        let snapshot = state.snapshot();
        if &snapshot.current_step.id == id {
            return true;
        }

        let Some(target) = snapshot.active_steps.iter().find(|s| &s.id == id) else {
            tracing::debug!(target = %id, "jump rejected: unknown or inactive step");
            return false;
        };
        if target.is_disabled {
            tracing::debug!(target = %id, "jump rejected: step disabled");
            return false;
        }

        if self.options.linear && !Self::is_reachable(&snapshot, id) {
            tracing::debug!(target = %id, "jump rejected: not reachable in linear mode");
            return false;
        }

        self.transition(state, events, id.clone(), NavigationDirection::Jump)
            .await
    }

    /// A step is reachable when it was already visited, or when it
    /// immediately follows the current step in the active sequence
    fn is_reachable(snapshot: &WizardState, id: &StepId) -> bool {
        if snapshot.history.contains(id) {
            return true;
        }
        snapshot
            .active_steps
            .iter()
            .position(|s| &s.id == id)
            .map(|pos| pos > 0 && snapshot.active_steps[pos - 1].is_current)
            .unwrap_or(false)
    }

    /// Jump to a step by its index within the active sequence
    pub async fn go_to_index(
        &self,
        state: &mut StateManager,
        events: &mut EventEmitter,
        index: usize,
    ) -> bool {
        let Some(step) = state.steps().find_active_by_index(index) else {
            return false;
        };
        self.go_to(state, events, &step.id).await
    }

    /// Jump to the first active step
    pub async fn first(&self, state: &mut StateManager, events: &mut EventEmitter) -> bool {
        self.go_to_index(state, events, 0).await
    }

    /// Jump to the last active step
    pub async fn last(&self, state: &mut StateManager, events: &mut EventEmitter) -> bool {
        let count = state.snapshot().total_steps;
        if count == 0 {
            return false;
        }
        self.go_to_index(state, events, count - 1).await
    }

    /// Move forward, if the current step allows skipping
    ///
    /// Apart from the `can_skip` gate this is exactly `next`, branch
    /// and validation rules included.
    pub async fn skip(&self, state: &mut StateManager, events: &mut EventEmitter) -> bool {
        if !state.snapshot().current_step.can_skip {
            return false;
        }
        self.next(state, events).await
    }

    /// Validate the current step and mark the wizard complete
    pub async fn complete(&self, state: &mut StateManager, events: &mut EventEmitter) -> bool {
        let current_id = state.snapshot().current_step.id.clone();
        if let Some(errors) = self.validate_step(state, events, &current_id).await {
            events.emit(&WizardEvent::ValidationError {
                step: current_id,
                errors,
            });
            return false;
        }

        state.update(|s| s.is_complete = true);
        let data = state.internal().data.clone();
        events.emit(&WizardEvent::Complete { data });
        true
    }

    /// Perform the transition: hooks, state mutation, events
    ///
    /// Order: `before_leave`, `before_enter` (either may veto), state
    /// mutation, `step:leave` / `step:enter` / `step:change` events,
    /// then `on_leave` and `on_enter`.
    async fn transition(
        &self,
        state: &mut StateManager,
        events: &mut EventEmitter,
        target: StepId,
        direction: NavigationDirection,
    ) -> bool {
        let current_id = state.snapshot().current_step.id.clone();
        let current_hooks = state
            .steps()
            .definition(&current_id)
            .and_then(|d| d.hooks.clone());
        let target_hooks = state
            .steps()
            .definition(&target)
            .and_then(|d| d.hooks.clone());

        if let Some(hooks) = &current_hooks {
            let mut ctx = HookContext::new(state, current_id.clone());
            let decision = hooks.before_leave(&mut ctx, direction).await;
            if decision.block {
                tracing::debug!(
                    step = %current_id,
                    message = decision.message.as_deref().unwrap_or(""),
                    "transition blocked by before_leave"
                );
                return false;
            }
        }

        if let Some(hooks) = &target_hooks {
            let mut ctx = HookContext::new(state, target.clone());
            if !hooks.before_enter(&mut ctx).await {
                tracing::debug!(step = %target, "transition blocked by before_enter");
                return false;
            }
        }

        // Hooks may have changed data and with it the active sequence
        let snapshot = state.snapshot();
        let Some(new_index) = snapshot.active_steps.iter().position(|s| s.id == target) else {
            tracing::debug!(target = %target, "transition aborted: target no longer active");
            return false;
        };

        let departed = current_id.clone();
        state.update(|s| {
            s.current_index = new_index;
            s.direction = Some(direction);
            if direction == NavigationDirection::Prev {
                s.history.pop();
            } else {
                s.history.push(departed.clone());
            }
        });

        events.emit(&WizardEvent::StepLeave {
            step: current_id.clone(),
            direction,
        });
        events.emit(&WizardEvent::StepEnter {
            step: target.clone(),
            direction,
        });
        events.emit(&WizardEvent::StepChange {
            step: target.clone(),
            direction,
            prev_step: current_id.clone(),
        });

        if let Some(hooks) = &current_hooks {
            let mut ctx = HookContext::new(state, current_id);
            hooks.on_leave(&mut ctx, direction).await;
        }
        if let Some(hooks) = &target_hooks {
            let mut ctx = HookContext::new(state, target);
            hooks.on_enter(&mut ctx, direction).await;
        }

        true
    }
}
