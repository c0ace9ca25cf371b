//! Validation rules and the per-step orchestration engine

pub mod rules;

use crate::domain::step::StepDefinition;
use crate::types::FormData;
use rules::{validate_schema, ValidationErrors};

/// Runs a step's validators against the working data
///
/// A step may carry a declarative schema, a synchronous validator, and
/// an asynchronous validator; all three run and their errors merge,
/// later sources overriding earlier ones per field.
#[derive(Debug, Default)]
pub struct ValidationEngine;

impl ValidationEngine {
    /// Create an engine
    pub fn new() -> Self {
        Self
    }

    /// Run the step's declarative schema
    pub fn validate_schema(
        &self,
        data: &FormData,
        def: &StepDefinition,
    ) -> Option<ValidationErrors> {
        def.schema
            .as_ref()
            .and_then(|schema| validate_schema(data, schema))
    }

    /// Run the step's synchronous validator
    pub fn validate_fn(&self, data: &FormData, def: &StepDefinition) -> Option<ValidationErrors> {
        def.validate.as_ref().and_then(|validate| validate(data))
    }

    /// Run the step's asynchronous validator
    pub async fn validate_async_fn(
        &self,
        data: &FormData,
        def: &StepDefinition,
    ) -> Option<ValidationErrors> {
        match &def.validate_async {
            Some(validate) => validate(data.clone()).await,
            None => None,
        }
    }

    /// Run every validator the step carries and merge the results
    pub async fn validate_all(
        &self,
        data: &FormData,
        def: &StepDefinition,
    ) -> Option<ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Some(schema_errors) = self.validate_schema(data, def) {
            errors.extend(schema_errors);
        }
        if let Some(fn_errors) = self.validate_fn(data, def) {
            errors.extend(fn_errors);
        }
        if let Some(async_errors) = self.validate_async_fn(data, def).await {
            errors.extend(async_errors);
        }

        if errors.is_empty() {
            None
        } else {
            Some(errors)
        }
    }

    /// Check whether the step passes all of its validators
    pub async fn is_valid(&self, data: &FormData, def: &StepDefinition) -> bool {
        self.validate_all(data, def).await.is_none()
    }
}
