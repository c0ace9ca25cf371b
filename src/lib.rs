//! Framework-agnostic state engine for multi-step wizard flows.
//!
//! `wizard-core` models a wizard as a list of step definitions over a
//! shared JSON data object. It derives the active step sequence from
//! data-dependent conditions, drives navigation (sequential moves,
//! conditional branches, explicit overrides, jumps with linear
//! reachability), orchestrates per-step validation, emits typed
//! lifecycle events, routes dispatched actions through middleware, and
//! persists state through pluggable storage backends with debounced
//! writes. Rendering, routing, and UI bindings are left to the
//! consumer.
//!
//! # Example
//!
//! ```no_run
//! use wizard_core::{FieldRules, StepDefinition, ValidationSchema, WizardConfig};
//!
//! # async fn example() -> Result<(), wizard_core::WizardError> {
//! let mut wizard = WizardConfig::new(vec![
//!     StepDefinition::new("account").with_schema(
//!         ValidationSchema::new()
//!             .field("email", FieldRules::new().required().email()),
//!     ),
//!     StepDefinition::new("profile"),
//!     StepDefinition::new("confirm"),
//! ])
//! .build()?;
//!
//! wizard.set_field("email", serde_json::json!("ada@example.com"))?;
//! wizard.next().await?;
//! assert_eq!(wizard.current_step()?.id.as_str(), "profile");
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod application;
pub mod domain;
pub mod error;
pub mod persistence;
pub mod types;
pub mod validation;

pub use application::middleware::{Middleware, MiddlewareId, Next, WizardAction};
pub use application::navigation::{NavigationController, NavigationOptions};
pub use application::wizard::{InitialStep, Wizard, WizardConfig};
pub use domain::events::{EventEmitter, EventKind, HandlerId, WizardEvent};
pub use domain::state::{HookContext, StateManager, SubscriptionId, WizardState};
pub use domain::step::{
    Branch, Flag, LeaveDecision, Step, StepDefinition, StepHooks, StepManager, StepTarget,
};
pub use error::WizardError;
pub use persistence::{
    FileStorage, MemoryStorage, NullStorage, PersistField, PersistedState, PersistenceConfig,
    PersistenceManager, StorageBackend,
};
pub use types::{FormData, NavigationDirection, StepId};
pub use validation::rules::{FieldRules, RuleKind, ValidationErrors, ValidationSchema};
pub use validation::ValidationEngine;
