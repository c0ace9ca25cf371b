//! Step definitions, derived step snapshots, and the step registry
//!
//! A [`StepDefinition`] is the author-provided description of a step:
//! activation predicates, validators, branch rules, and lifecycle
//! hooks. A [`Step`] is the derived, data-dependent snapshot exposed to
//! consumers. [`StepManager`] owns the definitions and keeps the
//! derived list in sync with the working data.

use crate::types::{FormData, NavigationDirection, StepId};
use crate::validation::rules::{ValidationErrors, ValidationSchema};
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Data-dependent predicate used for activation, disabling, and skipping
pub type Predicate = Arc<dyn Fn(&FormData) -> bool + Send + Sync>;

/// Synchronous step validator returning field errors, or `None` when valid
pub type ValidateFn = Arc<dyn Fn(&FormData) -> Option<ValidationErrors> + Send + Sync>;

/// Asynchronous step validator
///
/// Takes the data by value so the returned future is `'static`.
pub type AsyncValidateFn =
    Arc<dyn Fn(FormData) -> BoxFuture<'static, Option<ValidationErrors>> + Send + Sync>;

/// A boolean step attribute that is either fixed or computed from data
#[derive(Clone)]
pub enum Flag {
    /// A constant value
    Literal(bool),
    /// Recomputed against the current data
    Computed(Predicate),
}

impl Flag {
    /// Evaluate the flag against the current data
    pub fn evaluate(&self, data: &FormData) -> bool {
        match self {
            Flag::Literal(value) => *value,
            Flag::Computed(predicate) => predicate(data),
        }
    }
}

impl From<bool> for Flag {
    fn from(value: bool) -> Self {
        Flag::Literal(value)
    }
}

impl fmt::Debug for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Flag::Literal(value) => write!(f, "Literal({value})"),
            Flag::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// Explicit successor or predecessor of a step
#[derive(Clone)]
pub enum StepTarget {
    /// A fixed step id
    Fixed(StepId),
    /// Resolved from the current data
    Computed(Arc<dyn Fn(&FormData) -> StepId + Send + Sync>),
}

impl StepTarget {
    /// Resolve the target against the current data
    pub fn resolve(&self, data: &FormData) -> StepId {
        match self {
            StepTarget::Fixed(id) => id.clone(),
            StepTarget::Computed(resolver) => resolver(data),
        }
    }
}

impl fmt::Debug for StepTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepTarget::Fixed(id) => write!(f, "Fixed({id})"),
            StepTarget::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

impl From<StepId> for StepTarget {
    fn from(id: StepId) -> Self {
        StepTarget::Fixed(id)
    }
}

impl From<&str> for StepTarget {
    fn from(id: &str) -> Self {
        StepTarget::Fixed(StepId::from(id))
    }
}

/// A conditional branch evaluated during forward navigation
///
/// Branches are checked in definition order; the first whose condition
/// holds and whose target step is active wins.
#[derive(Clone)]
pub struct Branch {
    /// Diagnostic name for the branch
    pub name: String,
    /// Condition under which the branch is taken
    pub condition: Predicate,
    /// Target step when the branch is taken
    pub next_step: StepId,
}

impl fmt::Debug for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Branch")
            .field("name", &self.name)
            .field("next_step", &self.next_step)
            .finish()
    }
}

impl Branch {
    /// Create a branch
    pub fn new(
        name: impl Into<String>,
        condition: impl Fn(&FormData) -> bool + Send + Sync + 'static,
        next_step: impl Into<StepId>,
    ) -> Self {
        Self {
            name: name.into(),
            condition: Arc::new(condition),
            next_step: next_step.into(),
        }
    }
}

/// Outcome of a `before_leave` hook
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaveDecision {
    /// Whether the transition is blocked
    pub block: bool,
    /// Optional diagnostic message when blocked
    pub message: Option<String>,
}

impl LeaveDecision {
    /// Allow the transition
    pub fn allow() -> Self {
        Self {
            block: false,
            message: None,
        }
    }

    /// Block the transition
    pub fn block() -> Self {
        Self {
            block: true,
            message: None,
        }
    }

    /// Block the transition with a diagnostic message
    pub fn block_with(message: impl Into<String>) -> Self {
        Self {
            block: true,
            message: Some(message.into()),
        }
    }
}

/// Lifecycle hooks attached to a step definition
///
/// `before_leave` and `before_enter` run before the state mutates and
/// can veto the transition. `on_leave` and `on_enter` run after the
/// change events have fired and cannot.
#[async_trait]
pub trait StepHooks: Send + Sync {
    /// Runs before entering the step; return `false` to abort
    async fn before_enter(&self, _ctx: &mut HookContext<'_>) -> bool {
        true
    }

    /// Runs before leaving the step; return a blocking decision to abort
    async fn before_leave(
        &self,
        _ctx: &mut HookContext<'_>,
        _direction: NavigationDirection,
    ) -> LeaveDecision {
        LeaveDecision::allow()
    }

    /// Runs after the step has been entered
    async fn on_enter(&self, _ctx: &mut HookContext<'_>, _direction: NavigationDirection) {}

    /// Runs after the step has been left
    async fn on_leave(&self, _ctx: &mut HookContext<'_>, _direction: NavigationDirection) {}
}

pub use crate::domain::state::HookContext;

/// Author-provided description of a single step
#[derive(Clone)]
pub struct StepDefinition {
    /// Unique step id
    pub id: StepId,
    /// Display title
    pub title: Option<String>,
    /// Display description
    pub description: Option<String>,
    /// Display icon name
    pub icon: Option<String>,
    /// Arbitrary consumer metadata
    pub meta: Option<Value>,
    /// Primary activation condition
    pub condition: Option<Predicate>,
    /// Additional activation conditions, all of which must hold
    pub conditions: Vec<Predicate>,
    /// Whether the step is visible but not navigable
    pub disabled: Option<Flag>,
    /// Whether the step may be skipped without validation
    pub can_skip: Option<Flag>,
    /// Synchronous validator
    pub validate: Option<ValidateFn>,
    /// Asynchronous validator
    pub validate_async: Option<AsyncValidateFn>,
    /// Declarative field rules
    pub schema: Option<ValidationSchema>,
    /// Conditional branches checked during forward navigation
    pub branches: Vec<Branch>,
    /// Explicit successor override
    pub next_step: Option<StepTarget>,
    /// Explicit predecessor override
    pub prev_step: Option<StepTarget>,
    /// Lifecycle hooks
    pub hooks: Option<Arc<dyn StepHooks>>,
}

impl fmt::Debug for StepDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepDefinition")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("conditions", &(self.condition.is_some() as usize + self.conditions.len()))
            .field("disabled", &self.disabled)
            .field("can_skip", &self.can_skip)
            .field("branches", &self.branches)
            .field("next_step", &self.next_step)
            .field("prev_step", &self.prev_step)
            .field("has_hooks", &self.hooks.is_some())
            .finish()
    }
}

impl StepDefinition {
    /// Create a definition with the given id and no other attributes
    pub fn new(id: impl Into<StepId>) -> Self {
        Self {
            id: id.into(),
            title: None,
            description: None,
            icon: None,
            meta: None,
            condition: None,
            conditions: Vec::new(),
            disabled: None,
            can_skip: None,
            validate: None,
            validate_async: None,
            schema: None,
            branches: Vec::new(),
            next_step: None,
            prev_step: None,
            hooks: None,
        }
    }

    /// Set the display title
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set the display description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the display icon
    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = Some(icon.into());
        self
    }

    /// Attach arbitrary metadata
    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Set the primary activation condition
    pub fn with_condition(
        mut self,
        condition: impl Fn(&FormData) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.condition = Some(Arc::new(condition));
        self
    }

    /// Append an additional activation condition
    pub fn with_extra_condition(
        mut self,
        condition: impl Fn(&FormData) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.conditions.push(Arc::new(condition));
        self
    }

    /// Set the disabled flag
    pub fn with_disabled(mut self, disabled: impl Into<Flag>) -> Self {
        self.disabled = Some(disabled.into());
        self
    }

    /// Set the skippable flag
    pub fn with_can_skip(mut self, can_skip: impl Into<Flag>) -> Self {
        self.can_skip = Some(can_skip.into());
        self
    }

    /// Set the synchronous validator
    pub fn with_validate(
        mut self,
        validate: impl Fn(&FormData) -> Option<ValidationErrors> + Send + Sync + 'static,
    ) -> Self {
        self.validate = Some(Arc::new(validate));
        self
    }

    /// Set the asynchronous validator
    pub fn with_validate_async(
        mut self,
        validate: impl Fn(FormData) -> BoxFuture<'static, Option<ValidationErrors>>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.validate_async = Some(Arc::new(validate));
        self
    }

    /// Set the declarative field rules
    pub fn with_schema(mut self, schema: ValidationSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Append a conditional branch
    pub fn with_branch(mut self, branch: Branch) -> Self {
        self.branches.push(branch);
        self
    }

    /// Set the explicit successor
    pub fn with_next_step(mut self, target: impl Into<StepTarget>) -> Self {
        self.next_step = Some(target.into());
        self
    }

    /// Set the explicit predecessor
    pub fn with_prev_step(mut self, target: impl Into<StepTarget>) -> Self {
        self.prev_step = Some(target.into());
        self
    }

    /// Attach lifecycle hooks
    pub fn with_hooks(mut self, hooks: impl StepHooks + 'static) -> Self {
        self.hooks = Some(Arc::new(hooks));
        self
    }

    /// Evaluate whether this step is active for the given data
    ///
    /// A step with no conditions is active. When both the primary and
    /// extra conditions are present, all must hold.
    pub fn is_active(&self, data: &FormData) -> bool {
        if let Some(condition) = &self.condition {
            if !condition(data) {
                return false;
            }
        }
        self.conditions.iter().all(|condition| condition(data))
    }
}

/// Derived, data-dependent view of a step
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    /// Step id
    pub id: StepId,
    /// Index within the full definition list
    pub index: usize,
    /// Display title
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Display description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Display icon name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Arbitrary consumer metadata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
    /// Whether the step's activation conditions hold
    pub is_active: bool,
    /// Whether the step precedes the current step in the active sequence
    pub is_completed: bool,
    /// Whether the step is the current step
    pub is_current: bool,
    /// Whether the step has not yet been reached
    pub is_upcoming: bool,
    /// Whether the step is visible but not navigable
    pub is_disabled: bool,
    /// Whether the step may be skipped without validation
    pub can_skip: bool,
    /// Whether validation errors are recorded for the step
    pub has_error: bool,
    /// Recorded validation errors
    pub errors: ValidationErrors,
}

/// Registry of step definitions plus the derived step list
///
/// The derived list is rebuilt eagerly whenever the data or error map
/// changes, so read accessors never mutate.
pub struct StepManager {
    definitions: Vec<StepDefinition>,
    data: FormData,
    errors: HashMap<StepId, ValidationErrors>,
    derived: Vec<Step>,
}

impl fmt::Debug for StepManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepManager")
            .field("definitions", &self.definitions.len())
            .field("data", &self.data)
            .field("errors", &self.errors)
            .finish()
    }
}

impl StepManager {
    /// Create a manager over the given definitions and initial data
    pub fn new(definitions: Vec<StepDefinition>, data: FormData) -> Self {
        let mut manager = Self {
            definitions,
            data,
            errors: HashMap::new(),
            derived: Vec::new(),
        };
        manager.rebuild();
        manager
    }

    fn rebuild(&mut self) {
        self.derived = self
            .definitions
            .iter()
            .enumerate()
            .map(|(index, def)| {
                let is_active = def.is_active(&self.data);
                let errors = self.errors.get(&def.id).cloned().unwrap_or_default();
                Step {
                    id: def.id.clone(),
                    index,
                    title: def.title.clone(),
                    description: def.description.clone(),
                    icon: def.icon.clone(),
                    meta: def.meta.clone(),
                    is_active,
                    is_completed: false,
                    is_current: false,
                    is_upcoming: !is_active,
                    is_disabled: def
                        .disabled
                        .as_ref()
                        .map(|flag| flag.evaluate(&self.data))
                        .unwrap_or(false),
                    can_skip: def
                        .can_skip
                        .as_ref()
                        .map(|flag| flag.evaluate(&self.data))
                        .unwrap_or(false),
                    has_error: !errors.is_empty(),
                    errors,
                }
            })
            .collect();
    }

    /// All derived steps, in definition order
    pub fn steps(&self) -> &[Step] {
        &self.derived
    }

    /// Steps whose activation conditions hold, in definition order
    pub fn active_steps(&self) -> Vec<Step> {
        self.derived
            .iter()
            .filter(|step| step.is_active)
            .cloned()
            .collect()
    }

    /// Look up a derived step by id
    pub fn find_by_id(&self, id: &StepId) -> Option<&Step> {
        self.derived.iter().find(|step| &step.id == id)
    }

    /// Look up a derived step by definition index
    pub fn find_by_index(&self, index: usize) -> Option<&Step> {
        self.derived.get(index)
    }

    /// Look up a derived step by its index within the active sequence
    pub fn find_active_by_index(&self, index: usize) -> Option<Step> {
        self.derived
            .iter()
            .filter(|step| step.is_active)
            .nth(index)
            .cloned()
    }

    /// Look up a definition by id
    pub fn definition(&self, id: &StepId) -> Option<&StepDefinition> {
        self.definitions.iter().find(|def| &def.id == id)
    }

    /// All definitions, in order
    pub fn definitions(&self) -> &[StepDefinition] {
        &self.definitions
    }

    /// The working data the derived list was built against
    pub fn data(&self) -> &FormData {
        &self.data
    }

    /// Replace the working data and rebuild the derived list
    pub fn update_data(&mut self, data: FormData) {
        self.data = data;
        self.rebuild();
    }

    /// Record validation errors for a step; an empty map clears them
    pub fn set_errors(&mut self, id: StepId, errors: ValidationErrors) {
        if errors.is_empty() {
            self.errors.remove(&id);
        } else {
            self.errors.insert(id, errors);
        }
        self.rebuild();
    }

    /// Clear errors for one step, or for all steps when `id` is `None`
    pub fn clear_errors(&mut self, id: Option<&StepId>) {
        match id {
            Some(id) => {
                self.errors.remove(id);
            }
            None => self.errors.clear(),
        }
        self.rebuild();
    }

    /// Recorded errors for a step
    pub fn errors_for(&self, id: &StepId) -> Option<&ValidationErrors> {
        self.errors.get(id)
    }
}
