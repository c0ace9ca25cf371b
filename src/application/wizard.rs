//! The wizard facade
//!
//! [`Wizard`] composes the state manager, navigation controller,
//! emitter, middleware chain, and optional persistence behind one
//! owned handle. [`WizardConfig`] is the builder that assembles it.

use crate::application::middleware::{
    run_chain, Middleware, MiddlewareId, MiddlewareManager, WizardAction,
};
use crate::application::navigation::{NavigationController, NavigationOptions};
use crate::domain::events::{EventEmitter, EventKind, HandlerId, WizardEvent};
use crate::domain::state::{StateManager, SubscriptionId, WizardState};
use crate::domain::step::{Step, StepDefinition, StepManager};
use crate::error::WizardError;
use crate::persistence::manager::{PersistCommand, PersistedState};
use crate::persistence::{PersistenceConfig, PersistenceManager};
use crate::types::{FormData, NavigationDirection, StepId};
use crate::validation::rules::ValidationErrors;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;

/// Where the wizard starts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitialStep {
    /// Start at the step with this id
    Id(StepId),
    /// Start at this index of the active sequence
    Index(usize),
}

impl From<&str> for InitialStep {
    fn from(id: &str) -> Self {
        InitialStep::Id(StepId::from(id))
    }
}

impl From<usize> for InitialStep {
    fn from(index: usize) -> Self {
        InitialStep::Index(index)
    }
}

type StepChangeCallback = Box<dyn Fn(&StepId, NavigationDirection, &StepId) + Send + Sync>;
type DataChangeCallback = Box<dyn Fn(&FormData, &[String]) + Send + Sync>;
type ValidationErrorCallback = Box<dyn Fn(&StepId, &ValidationErrors) + Send + Sync>;
type CompleteCallback = Box<dyn Fn(&FormData) + Send + Sync>;
type CancelCallback = Box<dyn Fn(&FormData, &StepId) + Send + Sync>;

/// Builder for a [`Wizard`]
pub struct WizardConfig {
    steps: Vec<StepDefinition>,
    initial_data: FormData,
    initial_step: Option<InitialStep>,
    linear: bool,
    validate_on_next: bool,
    validate_on_prev: bool,
    persistence: Option<PersistenceConfig>,
    on_step_change: Option<StepChangeCallback>,
    on_data_change: Option<DataChangeCallback>,
    on_validation_error: Option<ValidationErrorCallback>,
    on_complete: Option<CompleteCallback>,
    on_cancel: Option<CancelCallback>,
}

impl fmt::Debug for WizardConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WizardConfig")
            .field("steps", &self.steps.len())
            .field("initial_step", &self.initial_step)
            .field("linear", &self.linear)
            .field("validate_on_next", &self.validate_on_next)
            .field("validate_on_prev", &self.validate_on_prev)
            .field("persistence", &self.persistence.is_some())
            .finish()
    }
}

impl WizardConfig {
    /// Start a configuration over the given step definitions
    pub fn new(steps: Vec<StepDefinition>) -> Self {
        Self {
            steps,
            initial_data: FormData::new(),
            initial_step: None,
            linear: true,
            validate_on_next: true,
            validate_on_prev: false,
            persistence: None,
            on_step_change: None,
            on_data_change: None,
            on_validation_error: None,
            on_complete: None,
            on_cancel: None,
        }
    }

    /// Seed the working data
    pub fn initial_data(mut self, data: FormData) -> Self {
        self.initial_data = data;
        self
    }

    /// Start somewhere other than the first active step
    pub fn initial_step(mut self, step: impl Into<InitialStep>) -> Self {
        self.initial_step = Some(step.into());
        self
    }

    /// Restrict jumps to visited steps and the immediate successor
    ///
    /// Defaults to `true`.
    pub fn linear(mut self, linear: bool) -> Self {
        self.linear = linear;
        self
    }

    /// Validate the departing step on forward moves (default `true`)
    pub fn validate_on_next(mut self, validate: bool) -> Self {
        self.validate_on_next = validate;
        self
    }

    /// Validate the departing step on backward moves (default `false`)
    pub fn validate_on_prev(mut self, validate: bool) -> Self {
        self.validate_on_prev = validate;
        self
    }

    /// Persist state under the given configuration
    pub fn persistence(mut self, persistence: PersistenceConfig) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Callback invoked on every step change with
    /// `(step, direction, prev_step)`
    pub fn on_step_change(
        mut self,
        callback: impl Fn(&StepId, NavigationDirection, &StepId) + Send + Sync + 'static,
    ) -> Self {
        self.on_step_change = Some(Box::new(callback));
        self
    }

    /// Callback invoked on every data change with
    /// `(data, changed_fields)`
    pub fn on_data_change(
        mut self,
        callback: impl Fn(&FormData, &[String]) + Send + Sync + 'static,
    ) -> Self {
        self.on_data_change = Some(Box::new(callback));
        self
    }

    /// Callback invoked whenever validation of a step fails
    pub fn on_validation_error(
        mut self,
        callback: impl Fn(&StepId, &ValidationErrors) + Send + Sync + 'static,
    ) -> Self {
        self.on_validation_error = Some(Box::new(callback));
        self
    }

    /// Callback invoked when the wizard completes
    pub fn on_complete(mut self, callback: impl Fn(&FormData) + Send + Sync + 'static) -> Self {
        self.on_complete = Some(Box::new(callback));
        self
    }

    /// Callback invoked when the wizard is cancelled
    pub fn on_cancel(
        mut self,
        callback: impl Fn(&FormData, &StepId) + Send + Sync + 'static,
    ) -> Self {
        self.on_cancel = Some(Box::new(callback));
        self
    }

    /// Build the wizard
    pub fn build(self) -> Result<Wizard, WizardError> {
        Wizard::new(self)
    }
}

/// Owned handle over a whole wizard flow
pub struct Wizard {
    state: StateManager,
    events: EventEmitter,
    navigation: NavigationController,
    middleware: MiddlewareManager,
    persistence: Option<PersistenceManager>,
    initial_data: FormData,
    initial_index: usize,
    destroyed: bool,
}

impl fmt::Debug for Wizard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wizard")
            .field("state", &self.state)
            .field("middleware", &self.middleware)
            .field("persistence", &self.persistence)
            .field("destroyed", &self.destroyed)
            .finish()
    }
}

impl Wizard {
    /// Build a wizard from its configuration
    ///
    /// Fails when no steps are defined or a step id repeats.
    pub fn new(config: WizardConfig) -> Result<Self, WizardError> {
        if config.steps.is_empty() {
            return Err(WizardError::Configuration(
                "at least one step is required".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for def in &config.steps {
            if !seen.insert(def.id.clone()) {
                return Err(WizardError::Configuration(format!(
                    "duplicate step id: {}",
                    def.id
                )));
            }
        }

        let steps = StepManager::new(config.steps, config.initial_data.clone());
        let active_count = steps.active_steps().len();
        let initial_index = match &config.initial_step {
            None => 0,
            Some(InitialStep::Index(index)) => (*index).min(active_count.saturating_sub(1)),
            Some(InitialStep::Id(id)) => steps
                .active_steps()
                .iter()
                .position(|s| &s.id == id)
                .unwrap_or(0),
        };

        let mut state = StateManager::new(steps, initial_index);
        let mut events = EventEmitter::new();

        if let Some(callback) = config.on_step_change {
            events.on(EventKind::StepChange, move |event| {
                if let WizardEvent::StepChange {
                    step,
                    direction,
                    prev_step,
                } = event
                {
                    callback(step, *direction, prev_step);
                }
            });
        }
        if let Some(callback) = config.on_data_change {
            events.on(EventKind::DataChange, move |event| {
                if let WizardEvent::DataChange {
                    data,
                    changed_fields,
                } = event
                {
                    callback(data, changed_fields);
                }
            });
        }
        if let Some(callback) = config.on_validation_error {
            events.on(EventKind::ValidationError, move |event| {
                if let WizardEvent::ValidationError { step, errors } = event {
                    callback(step, errors);
                }
            });
        }
        if let Some(callback) = config.on_complete {
            events.on(EventKind::Complete, move |event| {
                if let WizardEvent::Complete { data } = event {
                    callback(data);
                }
            });
        }
        if let Some(callback) = config.on_cancel {
            events.on(EventKind::Cancel, move |event| {
                if let WizardEvent::Cancel { data, step } = event {
                    callback(data, step);
                }
            });
        }

        let persistence = config.persistence.map(PersistenceManager::new);
        if let Some(persistence) = &persistence {
            let sender = persistence.sender();
            let fields = persistence.fields().to_vec();
            state.subscribe(move |new, _| {
                let _ = sender.send(PersistCommand::Save(PersistedState::capture(new, &fields)));
            });
        }

        Ok(Self {
            state,
            events,
            navigation: NavigationController::new(NavigationOptions {
                linear: config.linear,
                validate_on_next: config.validate_on_next,
                validate_on_prev: config.validate_on_prev,
            }),
            middleware: MiddlewareManager::new(),
            persistence,
            initial_data: config.initial_data,
            initial_index,
            destroyed: false,
        })
    }

    fn ensure_alive(&self) -> Result<(), WizardError> {
        if self.destroyed {
            Err(WizardError::Destroyed)
        } else {
            Ok(())
        }
    }

    /// The current derived snapshot
    pub fn state(&self) -> Result<WizardState, WizardError> {
        self.ensure_alive()?;
        Ok(self.state.snapshot())
    }

    /// Index of the current step within the active sequence
    pub fn current_index(&self) -> Result<usize, WizardError> {
        Ok(self.state()?.current_index)
    }

    /// Whether the current step is the first active step
    pub fn is_first(&self) -> Result<bool, WizardError> {
        Ok(self.state()?.is_first)
    }

    /// Whether the current step is the last active step
    pub fn is_last(&self) -> Result<bool, WizardError> {
        Ok(self.state()?.is_last)
    }

    /// Whether the wizard has completed
    pub fn is_complete(&self) -> Result<bool, WizardError> {
        Ok(self.state()?.is_complete)
    }

    /// Whether forward navigation is possible
    pub fn can_go_next(&self) -> Result<bool, WizardError> {
        Ok(self.state()?.can_go_next)
    }

    /// Whether backward navigation is possible
    pub fn can_go_prev(&self) -> Result<bool, WizardError> {
        Ok(self.state()?.can_go_prev)
    }

    /// Completion fraction in `[0, 1]`
    pub fn progress(&self) -> Result<f64, WizardError> {
        Ok(self.state()?.progress)
    }

    /// Completion percentage in `[0, 100]`
    pub fn progress_percent(&self) -> Result<f64, WizardError> {
        Ok(self.state()?.progress_percent)
    }

    /// Whether an async operation is in flight
    pub fn is_loading(&self) -> Result<bool, WizardError> {
        Ok(self.state()?.is_loading)
    }

    // ----- navigation -----

    /// Move forward; completes the wizard from the last step
    pub async fn next(&mut self) -> Result<bool, WizardError> {
        self.ensure_alive()?;
        Ok(self.navigation.next(&mut self.state, &mut self.events).await)
    }

    /// Move backward
    pub async fn prev(&mut self) -> Result<bool, WizardError> {
        self.ensure_alive()?;
        Ok(self.navigation.prev(&mut self.state, &mut self.events).await)
    }

    /// Jump to a step by id
    pub async fn go_to(&mut self, id: &StepId) -> Result<bool, WizardError> {
        self.ensure_alive()?;
        Ok(self
            .navigation
            .go_to(&mut self.state, &mut self.events, id)
            .await)
    }

    /// Jump to a step by its index within the active sequence
    pub async fn go_to_index(&mut self, index: usize) -> Result<bool, WizardError> {
        self.ensure_alive()?;
        Ok(self
            .navigation
            .go_to_index(&mut self.state, &mut self.events, index)
            .await)
    }

    /// Jump to the first active step
    pub async fn first(&mut self) -> Result<bool, WizardError> {
        self.ensure_alive()?;
        Ok(self.navigation.first(&mut self.state, &mut self.events).await)
    }

    /// Jump to the last active step
    pub async fn last(&mut self) -> Result<bool, WizardError> {
        self.ensure_alive()?;
        Ok(self.navigation.last(&mut self.state, &mut self.events).await)
    }

    /// Move forward, if the current step allows skipping
    pub async fn skip(&mut self) -> Result<bool, WizardError> {
        self.ensure_alive()?;
        Ok(self.navigation.skip(&mut self.state, &mut self.events).await)
    }

    /// Validate the current step and mark the wizard complete
    pub async fn complete(&mut self) -> Result<bool, WizardError> {
        self.ensure_alive()?;
        Ok(self
            .navigation
            .complete(&mut self.state, &mut self.events)
            .await)
    }

    /// Return to the initial step, data, and history
    pub fn reset(&mut self) -> Result<(), WizardError> {
        self.ensure_alive()?;
        self.events.emit(&WizardEvent::Reset);
        self.state.steps_mut().clear_errors(None);
        let initial_data = self.initial_data.clone();
        let initial_index = self.initial_index;
        self.state.update(|s| {
            s.current_index = initial_index;
            s.data = initial_data;
            s.history.clear();
            s.is_complete = false;
            s.is_loading = false;
            s.is_validating = false;
            s.direction = None;
        });
        Ok(())
    }

    /// Announce cancellation; state is left untouched
    pub fn cancel(&mut self) -> Result<(), WizardError> {
        self.ensure_alive()?;
        let snapshot = self.state.snapshot();
        self.events.emit(&WizardEvent::Cancel {
            data: snapshot.data,
            step: snapshot.current_step.id,
        });
        Ok(())
    }

    // ----- data -----

    /// The full working data
    pub fn get_data(&self) -> Result<FormData, WizardError> {
        self.ensure_alive()?;
        Ok(self.state.internal().data.clone())
    }

    /// One field of the working data
    pub fn get_field(&self, field: &str) -> Result<Option<Value>, WizardError> {
        self.ensure_alive()?;
        Ok(self.state.internal().data.get(field).cloned())
    }

    /// A projection of the working data onto the named fields
    pub fn get_fields(&self, fields: &[&str]) -> Result<FormData, WizardError> {
        self.ensure_alive()?;
        let data = &self.state.internal().data;
        Ok(fields
            .iter()
            .filter_map(|field| data.get(field).map(|v| (field.to_string(), v.clone())))
            .collect())
    }

    /// Merge a patch into the working data, or replace it wholesale
    pub fn set_data(&mut self, patch: FormData, replace: bool) -> Result<(), WizardError> {
        self.ensure_alive()?;
        let changed_fields: Vec<String> = if replace {
            let mut keys: Vec<String> = self.state.internal().data.keys().cloned().collect();
            for key in patch.keys() {
                if !keys.contains(key) {
                    keys.push(key.clone());
                }
            }
            keys
        } else {
            patch.keys().cloned().collect()
        };

        let next = if replace {
            patch
        } else {
            self.state.internal().data.merged(patch)
        };
        self.state.apply_data(next.clone());
        self.events.emit(&WizardEvent::DataChange {
            data: next,
            changed_fields,
        });
        Ok(())
    }

    /// Set one field of the working data
    pub fn set_field(&mut self, field: impl Into<String>, value: Value) -> Result<(), WizardError> {
        let mut patch = FormData::new();
        patch.set(field, value);
        self.set_data(patch, false)
    }

    /// Remove one field from the working data
    pub fn clear_field(&mut self, field: &str) -> Result<(), WizardError> {
        self.ensure_alive()?;
        let mut next = self.state.internal().data.clone();
        if next.remove(field).is_none() {
            return Ok(());
        }
        self.state.apply_data(next.clone());
        self.events.emit(&WizardEvent::DataChange {
            data: next,
            changed_fields: vec![field.to_string()],
        });
        Ok(())
    }

    /// Return the working data to its initial value
    pub fn reset_data(&mut self) -> Result<(), WizardError> {
        self.ensure_alive()?;
        let initial = self.initial_data.clone();
        self.set_data(initial, true)
    }

    /// The data visible to the current step
    ///
    /// Data is shared across steps, so this is the full working data.
    pub fn get_step_data(&self) -> Result<FormData, WizardError> {
        self.get_data()
    }

    /// Merge a patch into the data on behalf of the current step
    pub fn set_step_data(&mut self, patch: FormData) -> Result<(), WizardError> {
        self.set_data(patch, false)
    }

    /// Return the data to its initial value on behalf of the current step
    pub fn reset_step_data(&mut self) -> Result<(), WizardError> {
        self.reset_data()
    }

    // ----- validation -----

    /// Validate one step, defaulting to the current step
    ///
    /// Records the outcome and emits `validation:error` or
    /// `validation:success`. Returns whether the step is valid.
    pub async fn validate(&mut self, step: Option<&StepId>) -> Result<bool, WizardError> {
        self.ensure_alive()?;
        let id = match step {
            Some(id) => id.clone(),
            None => self.state.snapshot().current_step.id,
        };
        match self
            .navigation
            .validate_step(&mut self.state, &mut self.events, &id)
            .await
        {
            Some(errors) => {
                self.events
                    .emit(&WizardEvent::ValidationError { step: id, errors });
                Ok(false)
            }
            None => Ok(true),
        }
    }

    /// Validate every active step; returns whether all pass
    pub async fn validate_all(&mut self) -> Result<bool, WizardError> {
        self.ensure_alive()?;
        let ids: Vec<StepId> = self
            .state
            .snapshot()
            .active_steps
            .iter()
            .map(|s| s.id.clone())
            .collect();
        let mut all_valid = true;
        for id in ids {
            if !self.validate(Some(&id)).await? {
                all_valid = false;
            }
        }
        Ok(all_valid)
    }

    /// Check the current step's validators without recording errors
    pub async fn is_valid(&self) -> Result<bool, WizardError> {
        self.ensure_alive()?;
        let snapshot = self.state.snapshot();
        let Some(def) = self
            .state
            .steps()
            .definition(&snapshot.current_step.id)
            .cloned()
        else {
            return Ok(true);
        };
        Ok(self.state.validation().is_valid(&snapshot.data, &def).await)
    }

    /// Recorded errors of one step, defaulting to the current step
    pub fn get_errors(&self, step: Option<&StepId>) -> Result<ValidationErrors, WizardError> {
        self.ensure_alive()?;
        match step {
            Some(id) => Ok(self
                .state
                .steps()
                .errors_for(id)
                .cloned()
                .unwrap_or_default()),
            None => Ok(self.state.snapshot().errors),
        }
    }

    /// Whether the current step has recorded errors
    pub fn has_errors(&self) -> Result<bool, WizardError> {
        Ok(!self.get_errors(None)?.is_empty())
    }

    /// One recorded `(field, message)` pair of the current step, if any
    ///
    /// The error map is unordered; which pair is returned when several
    /// fields fail is unspecified.
    pub fn first_error(&self) -> Result<Option<(String, String)>, WizardError> {
        Ok(self.get_errors(None)?.into_iter().next())
    }

    /// Record errors for the current step
    ///
    /// Emits `validation:error` unless the map is empty; an empty map
    /// clears the step's errors.
    pub fn set_errors(&mut self, errors: ValidationErrors) -> Result<(), WizardError> {
        self.ensure_alive()?;
        let id = self.state.snapshot().current_step.id;
        self.state.steps_mut().set_errors(id.clone(), errors.clone());
        self.state.touch();
        if !errors.is_empty() {
            self.events
                .emit(&WizardEvent::ValidationError { step: id, errors });
        }
        Ok(())
    }

    /// Clear errors for one step, or for all steps when `step` is `None`
    pub fn clear_errors(&mut self, step: Option<&StepId>) -> Result<(), WizardError> {
        self.ensure_alive()?;
        self.state.steps_mut().clear_errors(step);
        self.state.touch();
        Ok(())
    }

    // ----- step queries -----

    /// The current step
    pub fn current_step(&self) -> Result<Step, WizardError> {
        self.ensure_alive()?;
        Ok(self.state.snapshot().current_step)
    }

    /// All steps, in definition order
    pub fn steps(&self) -> Result<Vec<Step>, WizardError> {
        self.ensure_alive()?;
        Ok(self.state.snapshot().steps)
    }

    /// Active steps, in definition order
    pub fn active_steps(&self) -> Result<Vec<Step>, WizardError> {
        self.ensure_alive()?;
        Ok(self.state.snapshot().active_steps)
    }

    /// Look up a step by id
    pub fn get_step(&self, id: &StepId) -> Result<Option<Step>, WizardError> {
        self.ensure_alive()?;
        Ok(self.state.snapshot().steps.into_iter().find(|s| &s.id == id))
    }

    /// Look up a step by definition index
    pub fn get_step_by_index(&self, index: usize) -> Result<Option<Step>, WizardError> {
        self.ensure_alive()?;
        Ok(self.state.steps().find_by_index(index).cloned())
    }

    /// Whether a step's activation conditions hold
    pub fn is_step_visible(&self, id: &StepId) -> Result<bool, WizardError> {
        self.ensure_alive()?;
        Ok(self
            .state
            .steps()
            .find_by_id(id)
            .map(|s| s.is_active)
            .unwrap_or(false))
    }

    /// Whether a step precedes the current step in the active sequence
    pub fn is_step_completed(&self, id: &StepId) -> Result<bool, WizardError> {
        self.ensure_alive()?;
        let snapshot = self.state.snapshot();
        Ok(snapshot
            .active_steps
            .iter()
            .position(|s| &s.id == id)
            .map(|pos| pos < snapshot.current_index)
            .unwrap_or(false))
    }

    /// Whether a step is disabled
    pub fn is_step_disabled(&self, id: &StepId) -> Result<bool, WizardError> {
        self.ensure_alive()?;
        Ok(self
            .state
            .steps()
            .find_by_id(id)
            .map(|s| s.is_disabled)
            .unwrap_or(false))
    }

    // ----- history -----

    /// Ids of departed steps, most recent last
    pub fn get_history(&self) -> Result<Vec<StepId>, WizardError> {
        self.ensure_alive()?;
        Ok(self.state.internal().history.clone())
    }

    /// Whether there is a step to return to
    pub fn can_undo(&self) -> Result<bool, WizardError> {
        self.ensure_alive()?;
        Ok(!self.state.internal().history.is_empty())
    }

    /// Return to the most recently departed step
    pub async fn undo(&mut self) -> Result<bool, WizardError> {
        self.ensure_alive()?;
        let Some(target) = self.state.internal().history.last().cloned() else {
            return Ok(false);
        };
        self.go_to(&target).await
    }

    // ----- persistence -----

    /// Write the configured fields immediately, bypassing the debounce
    ///
    /// Returns `false` when persistence is not configured.
    pub async fn persist(&mut self) -> Result<bool, WizardError> {
        self.ensure_alive()?;
        let Some(persistence) = &self.persistence else {
            return Ok(false);
        };
        let snapshot = self.state.snapshot();
        persistence.save_immediate(&snapshot).await?;
        self.events.emit(&WizardEvent::Persist {
            data: snapshot.data,
        });
        Ok(true)
    }

    /// Apply the persisted payload, if any
    ///
    /// Data, current step, and history are applied independently; a
    /// persisted step that no longer exists or is inactive leaves the
    /// position unchanged. Returns whether a payload was applied.
    pub async fn restore(&mut self) -> Result<bool, WizardError> {
        self.ensure_alive()?;
        let Some(persistence) = &self.persistence else {
            return Ok(false);
        };
        let Some(persisted) = persistence.restore().await? else {
            return Ok(false);
        };

        if let Some(data) = persisted.data {
            self.state.apply_data(data);
        }
        if let Some(step) = &persisted.current_step {
            let position = self
                .state
                .snapshot()
                .active_steps
                .iter()
                .position(|s| &s.id == step);
            match position {
                Some(index) => self.state.update(|s| s.current_index = index),
                None => {
                    tracing::warn!(step = %step, "persisted step is gone, keeping position")
                }
            }
        }
        if let Some(history) = persisted.history {
            self.state.update(|s| s.history = history);
        }

        let data = self.state.internal().data.clone();
        self.events.emit(&WizardEvent::Restore { data });
        Ok(true)
    }

    /// Delete the persisted payload and drop any pending save
    pub async fn clear_persisted(&mut self) -> Result<bool, WizardError> {
        self.ensure_alive()?;
        let Some(persistence) = &self.persistence else {
            return Ok(false);
        };
        persistence.clear().await?;
        Ok(true)
    }

    // ----- events and subscriptions -----

    /// Register an event handler
    pub fn on(
        &mut self,
        kind: EventKind,
        handler: impl Fn(&WizardEvent) + Send + Sync + 'static,
    ) -> Result<HandlerId, WizardError> {
        self.ensure_alive()?;
        Ok(self.events.on(kind, handler))
    }

    /// Register an event handler removed after its first invocation
    pub fn once(
        &mut self,
        kind: EventKind,
        handler: impl Fn(&WizardEvent) + Send + Sync + 'static,
    ) -> Result<HandlerId, WizardError> {
        self.ensure_alive()?;
        Ok(self.events.once(kind, handler))
    }

    /// Remove an event handler
    pub fn off(&mut self, kind: EventKind, id: HandlerId) -> Result<(), WizardError> {
        self.ensure_alive()?;
        self.events.off(kind, id);
        Ok(())
    }

    /// Register a state subscriber called with `(new, old)` snapshots
    pub fn subscribe(
        &mut self,
        subscriber: impl Fn(&WizardState, &WizardState) + Send + Sync + 'static,
    ) -> Result<SubscriptionId, WizardError> {
        self.ensure_alive()?;
        Ok(self.state.subscribe(subscriber))
    }

    /// Remove a state subscriber
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> Result<(), WizardError> {
        self.ensure_alive()?;
        self.state.unsubscribe(id);
        Ok(())
    }

    // ----- middleware and dispatch -----

    /// Append a middleware to the dispatch chain
    pub fn use_middleware(
        &mut self,
        middleware: impl Middleware + 'static,
    ) -> Result<MiddlewareId, WizardError> {
        self.ensure_alive()?;
        Ok(self.middleware.use_middleware(middleware))
    }

    /// Remove a middleware from the dispatch chain
    pub fn remove_middleware(&mut self, id: MiddlewareId) -> Result<(), WizardError> {
        self.ensure_alive()?;
        self.middleware.remove(id);
        Ok(())
    }

    /// Run an action through the middleware chain and apply the survivor
    ///
    /// Returns `false` when a middleware swallows the action or the
    /// surviving action is rejected.
    pub async fn dispatch(&mut self, action: WizardAction) -> Result<bool, WizardError> {
        self.ensure_alive()?;
        let chain = self.middleware.stack();
        let snapshot = self.state.snapshot();
        let Some(action) = run_chain(&chain, &snapshot, action).await else {
            return Ok(false);
        };
        self.apply_action(action).await
    }

    async fn apply_action(&mut self, action: WizardAction) -> Result<bool, WizardError> {
        match action {
            WizardAction::Next => self.next().await,
            WizardAction::Prev => self.prev().await,
            WizardAction::GoTo { step_id } => self.go_to(&step_id).await,
            WizardAction::GoToIndex { index } => self.go_to_index(index).await,
            WizardAction::First => self.first().await,
            WizardAction::Last => self.last().await,
            WizardAction::Skip => self.skip().await,
            WizardAction::Reset => self.reset().map(|_| true),
            WizardAction::Complete => self.complete().await,
            WizardAction::Cancel => self.cancel().map(|_| true),
            WizardAction::Undo => self.undo().await,
            WizardAction::SetData { data, replace } => {
                self.set_data(data, replace).map(|_| true)
            }
            WizardAction::MergeData { data } => self.set_data(data, false).map(|_| true),
            WizardAction::SetField { field, value } => {
                self.set_field(field, value).map(|_| true)
            }
            WizardAction::ClearField { field } => self.clear_field(&field).map(|_| true),
            WizardAction::SetErrors { errors } => self.set_errors(errors).map(|_| true),
            WizardAction::ClearErrors { step_id } => {
                self.clear_errors(step_id.as_ref()).map(|_| true)
            }
        }
    }

    // ----- lifecycle -----

    /// Whether `destroy` has been called
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    /// Tear the wizard down
    ///
    /// Drops all handlers, subscribers, and middleware, and stops the
    /// persistence worker. Further calls on the handle return
    /// [`WizardError::Destroyed`]. Idempotent.
    pub fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        self.events.clear();
        self.middleware.clear();
        if let Some(persistence) = self.persistence.take() {
            persistence.destroy();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::MemoryStorage;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn data(value: serde_json::Value) -> FormData {
        FormData::from_value(value).unwrap()
    }

    fn steps(ids: &[&str]) -> Vec<StepDefinition> {
        ids.iter().map(|id| StepDefinition::new(*id)).collect()
    }

    #[test]
    fn test_construction_rejects_empty_and_duplicate_steps() {
        let err = WizardConfig::new(Vec::new()).build().unwrap_err();
        assert!(matches!(err, WizardError::Configuration(_)));

        let err = WizardConfig::new(steps(&["a", "a"])).build().unwrap_err();
        match err {
            WizardError::Configuration(msg) => assert!(msg.contains("duplicate")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_initial_step_resolution() {
        let wizard = WizardConfig::new(steps(&["a", "b", "c"]))
            .initial_step("b")
            .build()
            .unwrap();
        assert_eq!(wizard.current_step().unwrap().id.as_str(), "b");

        let wizard = WizardConfig::new(steps(&["a", "b", "c"]))
            .initial_step(9usize)
            .build()
            .unwrap();
        assert_eq!(wizard.current_step().unwrap().id.as_str(), "c");

        let wizard = WizardConfig::new(steps(&["a", "b"]))
            .initial_step("missing")
            .build()
            .unwrap();
        assert_eq!(wizard.current_step().unwrap().id.as_str(), "a");
    }

    #[tokio::test]
    async fn test_set_field_emits_data_change() {
        let mut wizard = WizardConfig::new(steps(&["a"])).build().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        wizard
            .on(EventKind::DataChange, move |event| {
                if let WizardEvent::DataChange { changed_fields, .. } = event {
                    sink.lock().unwrap().extend(changed_fields.iter().cloned());
                }
            })
            .unwrap();

        wizard.set_field("name", json!("Ada")).unwrap();
        assert_eq!(wizard.get_field("name").unwrap(), Some(json!("Ada")));
        assert_eq!(*seen.lock().unwrap(), ["name"]);
    }

    #[tokio::test]
    async fn test_clear_field_actually_removes() {
        let mut wizard = WizardConfig::new(steps(&["a"]))
            .initial_data(data(json!({"keep": 1, "drop": 2})))
            .build()
            .unwrap();

        wizard.clear_field("drop").unwrap();
        let current = wizard.get_data().unwrap();
        assert!(current.contains("keep"));
        assert!(!current.contains("drop"));

        // Clearing an absent field is a no-op
        wizard.clear_field("drop").unwrap();
    }

    #[tokio::test]
    async fn test_reset_restores_initial_state() {
        let mut wizard = WizardConfig::new(steps(&["a", "b"]))
            .initial_data(data(json!({"seed": true})))
            .build()
            .unwrap();

        wizard.set_field("extra", json!(1)).unwrap();
        assert!(wizard.next().await.unwrap());

        let reset_seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&reset_seen);
        wizard
            .on(EventKind::Reset, move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        wizard.reset().unwrap();
        let state = wizard.state().unwrap();
        assert_eq!(state.current_step.id.as_str(), "a");
        assert!(state.history.is_empty());
        assert!(!state.is_complete);
        assert_eq!(state.data, data(json!({"seed": true})));
        assert_eq!(reset_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_config_callbacks_fire() {
        let changes = Arc::new(Mutex::new(Vec::new()));
        let completions = Arc::new(AtomicUsize::new(0));

        let change_sink = Arc::clone(&changes);
        let complete_sink = Arc::clone(&completions);
        let mut wizard = WizardConfig::new(steps(&["a", "b"]))
            .on_step_change(move |step, _, prev| {
                change_sink
                    .lock()
                    .unwrap()
                    .push((prev.as_str().to_string(), step.as_str().to_string()));
            })
            .on_complete(move |_| {
                complete_sink.fetch_add(1, Ordering::SeqCst);
            })
            .build()
            .unwrap();

        wizard.next().await.unwrap();
        wizard.next().await.unwrap();

        assert_eq!(
            *changes.lock().unwrap(),
            [("a".to_string(), "b".to_string())]
        );
        assert_eq!(completions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_destroyed_wizard_rejects_calls() {
        let mut wizard = WizardConfig::new(steps(&["a", "b"])).build().unwrap();
        wizard.destroy();
        assert!(wizard.is_destroyed());

        assert_eq!(wizard.next().await.unwrap_err(), WizardError::Destroyed);
        assert_eq!(wizard.state().unwrap_err(), WizardError::Destroyed);
        assert_eq!(
            wizard.set_field("x", json!(1)).unwrap_err(),
            WizardError::Destroyed
        );

        // Idempotent
        wizard.destroy();
    }

    #[tokio::test]
    async fn test_dispatch_applies_surviving_action() {
        let mut wizard = WizardConfig::new(steps(&["a", "b"])).build().unwrap();
        assert!(wizard.dispatch(WizardAction::Next).await.unwrap());
        assert_eq!(wizard.current_step().unwrap().id.as_str(), "b");

        assert!(wizard
            .dispatch(WizardAction::SetField {
                field: "name".to_string(),
                value: json!("Ada"),
            })
            .await
            .unwrap());
        assert_eq!(wizard.get_field("name").unwrap(), Some(json!("Ada")));
    }

    struct DropNavigation;

    #[async_trait::async_trait]
    impl Middleware for DropNavigation {
        async fn handle(
            &self,
            action: WizardAction,
            _state: &WizardState,
            next: crate::application::middleware::Next<'_>,
        ) {
            if !matches!(action, WizardAction::Next | WizardAction::Prev) {
                next.run(action).await;
            }
        }
    }

    #[tokio::test]
    async fn test_middleware_can_swallow_dispatched_actions() {
        let mut wizard = WizardConfig::new(steps(&["a", "b"])).build().unwrap();
        let id = wizard.use_middleware(DropNavigation).unwrap();

        assert!(!wizard.dispatch(WizardAction::Next).await.unwrap());
        assert_eq!(wizard.current_step().unwrap().id.as_str(), "a");

        wizard.remove_middleware(id).unwrap();
        assert!(wizard.dispatch(WizardAction::Next).await.unwrap());
        assert_eq!(wizard.current_step().unwrap().id.as_str(), "b");
    }

    #[tokio::test]
    async fn test_undo_returns_to_departed_step() {
        let mut wizard = WizardConfig::new(steps(&["a", "b"])).build().unwrap();
        assert!(!wizard.can_undo().unwrap());
        assert!(!wizard.undo().await.unwrap());

        wizard.next().await.unwrap();
        assert!(wizard.can_undo().unwrap());
        assert!(wizard.undo().await.unwrap());
        assert_eq!(wizard.current_step().unwrap().id.as_str(), "a");
    }

    #[tokio::test]
    async fn test_persist_restore_round_trip() {
        let backend = Arc::new(MemoryStorage::new());
        let config = PersistenceConfig::new("wizard", backend.clone())
            .with_debounce(Duration::from_millis(10));

        let mut wizard = WizardConfig::new(steps(&["a", "b"]))
            .persistence(config.clone())
            .build()
            .unwrap();
        wizard.set_field("name", json!("Ada")).unwrap();
        wizard.next().await.unwrap();
        assert!(wizard.persist().await.unwrap());
        wizard.destroy();

        let mut fresh = WizardConfig::new(steps(&["a", "b"]))
            .persistence(config)
            .build()
            .unwrap();
        assert!(fresh.restore().await.unwrap());
        let state = fresh.state().unwrap();
        assert_eq!(state.current_step.id.as_str(), "b");
        assert_eq!(state.data.get_str("name"), Some("Ada"));
        assert_eq!(state.history, vec![StepId::from("a")]);
        fresh.destroy();
    }

    #[tokio::test]
    async fn test_restore_without_payload_is_noop() {
        let backend = Arc::new(MemoryStorage::new());
        let mut wizard = WizardConfig::new(steps(&["a", "b"]))
            .persistence(PersistenceConfig::new("wizard", backend))
            .build()
            .unwrap();
        assert!(!wizard.restore().await.unwrap());
        wizard.destroy();
    }

    #[tokio::test]
    async fn test_wizard_without_persistence_reports_false() {
        let mut wizard = WizardConfig::new(steps(&["a"])).build().unwrap();
        assert!(!wizard.persist().await.unwrap());
        assert!(!wizard.restore().await.unwrap());
        assert!(!wizard.clear_persisted().await.unwrap());
    }
}
