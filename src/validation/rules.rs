//! Field-level validation rules
//!
//! A [`ValidationSchema`] maps field names to [`FieldRules`]. Rules are
//! evaluated in a fixed order; the first failing rule produces the
//! field's error message.

use crate::types::FormData;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};
use url::Url;

/// Map from field name to error message
pub type ValidationErrors = HashMap<String, String>;

/// Custom predicate rule given the field value and the full data object
pub type CustomRule = Arc<dyn Fn(&Value, &FormData) -> bool + Send + Sync>;

/// The built-in rule kinds, in evaluation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleKind {
    /// Value must be present and non-empty
    Required,
    /// String must have at least N characters
    MinLength,
    /// String must have at most N characters
    MaxLength,
    /// Number must be at least N
    Min,
    /// Number must be at most N
    Max,
    /// String must match a regular expression
    Pattern,
    /// String must be an email address
    Email,
    /// String must parse as an absolute URL
    Url,
    /// Custom predicate
    Custom,
}

fn default_message(kind: RuleKind) -> &'static str {
    match kind {
        RuleKind::Required => "Field is required",
        RuleKind::MinLength => "Must be at least {minLength} characters",
        RuleKind::MaxLength => "Must be at most {maxLength} characters",
        RuleKind::Min => "Must be at least {min}",
        RuleKind::Max => "Must be at most {max}",
        RuleKind::Pattern => "Must match the required pattern",
        RuleKind::Email => "Must be a valid email address",
        RuleKind::Url => "Must be a valid URL",
        RuleKind::Custom => "Invalid value",
    }
}

fn email_pattern() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email pattern"))
}

/// Format a number for message placeholders without a trailing `.0`
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Validation rules for a single field
#[derive(Clone, Default)]
pub struct FieldRules {
    required: bool,
    min_length: Option<usize>,
    max_length: Option<usize>,
    min: Option<f64>,
    max: Option<f64>,
    pattern: Option<Regex>,
    email: bool,
    url: bool,
    custom: Option<CustomRule>,
    message: Option<String>,
    messages: HashMap<RuleKind, String>,
}

impl fmt::Debug for FieldRules {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldRules")
            .field("required", &self.required)
            .field("min_length", &self.min_length)
            .field("max_length", &self.max_length)
            .field("min", &self.min)
            .field("max", &self.max)
            .field("pattern", &self.pattern.as_ref().map(|r| r.as_str()))
            .field("email", &self.email)
            .field("url", &self.url)
            .field("custom", &self.custom.is_some())
            .finish()
    }
}

impl FieldRules {
    /// Create an empty rule set (every value passes)
    pub fn new() -> Self {
        Self::default()
    }

    /// Value must be present and non-empty
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Minimum string length in characters
    pub fn min_length(mut self, min: usize) -> Self {
        self.min_length = Some(min);
        self
    }

    /// Maximum string length in characters
    pub fn max_length(mut self, max: usize) -> Self {
        self.max_length = Some(max);
        self
    }

    /// Minimum numeric value
    pub fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    /// Maximum numeric value
    pub fn max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    /// String must match the given regular expression
    pub fn pattern(mut self, pattern: Regex) -> Self {
        self.pattern = Some(pattern);
        self
    }

    /// String must be an email address
    pub fn email(mut self) -> Self {
        self.email = true;
        self
    }

    /// String must parse as an absolute URL
    pub fn url(mut self) -> Self {
        self.url = true;
        self
    }

    /// Custom predicate given (value, full data); `false` fails the rule
    pub fn custom(mut self, rule: impl Fn(&Value, &FormData) -> bool + Send + Sync + 'static) -> Self {
        self.custom = Some(Arc::new(rule));
        self
    }

    /// General error message used when no per-rule message is set
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Error message for one specific rule
    pub fn message_for(mut self, kind: RuleKind, message: impl Into<String>) -> Self {
        self.messages.insert(kind, message.into());
        self
    }

    /// Resolve the error message for a failed rule
    ///
    /// Resolution order: per-rule message, general message, default
    /// template with `{placeholder}` substitution.
    pub fn error_message(&self, kind: RuleKind) -> String {
        if let Some(message) = self.messages.get(&kind) {
            return message.clone();
        }
        if let Some(message) = &self.message {
            return message.clone();
        }

        let mut message = default_message(kind).to_string();
        match kind {
            RuleKind::MinLength => {
                if let Some(min) = self.min_length {
                    message = message.replace("{minLength}", &min.to_string());
                }
            }
            RuleKind::MaxLength => {
                if let Some(max) = self.max_length {
                    message = message.replace("{maxLength}", &max.to_string());
                }
            }
            RuleKind::Min => {
                if let Some(min) = self.min {
                    message = message.replace("{min}", &format_number(min));
                }
            }
            RuleKind::Max => {
                if let Some(max) = self.max {
                    message = message.replace("{max}", &format_number(max));
                }
            }
            _ => {}
        }
        message
    }
}

/// Per-field validation rules for a step
#[derive(Debug, Clone, Default)]
pub struct ValidationSchema {
    fields: HashMap<String, FieldRules>,
}

impl ValidationSchema {
    /// Create an empty schema
    pub fn new() -> Self {
        Self::default()
    }

    /// Add rules for a field
    pub fn field(mut self, name: impl Into<String>, rules: FieldRules) -> Self {
        self.fields.insert(name.into(), rules);
        self
    }

    /// Iterate over (field, rules) pairs
    pub fn rules(&self) -> impl Iterator<Item = (&String, &FieldRules)> {
        self.fields.iter()
    }

    /// Number of fields with rules
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check whether the schema is empty
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Required passes for any value that is present and non-empty: strings
/// must have non-whitespace content, arrays must be non-empty.
fn satisfies_required(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(_) => true,
    }
}

/// Missing, null, and blank strings count as empty for the skip rule
fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

fn check_min_length(value: &Value, min: usize) -> bool {
    value.as_str().map(|s| s.chars().count() >= min).unwrap_or(false)
}

fn check_max_length(value: &Value, max: usize) -> bool {
    value.as_str().map(|s| s.chars().count() <= max).unwrap_or(false)
}

fn check_min(value: &Value, min: f64) -> bool {
    value.as_f64().map(|n| n >= min).unwrap_or(false)
}

fn check_max(value: &Value, max: f64) -> bool {
    value.as_f64().map(|n| n <= max).unwrap_or(false)
}

fn check_pattern(value: &Value, pattern: &Regex) -> bool {
    value.as_str().map(|s| pattern.is_match(s)).unwrap_or(false)
}

fn check_email(value: &Value) -> bool {
    value.as_str().map(|s| email_pattern().is_match(s)).unwrap_or(false)
}

fn check_url(value: &Value) -> bool {
    value.as_str().map(|s| Url::parse(s).is_ok()).unwrap_or(false)
}

/// Validate a single field, returning the first failing rule's message
///
/// When the field is not required and its value is empty, all other
/// rules are skipped.
pub fn validate_field(value: Option<&Value>, rules: &FieldRules, data: &FormData) -> Option<String> {
    if rules.required && !satisfies_required(value) {
        return Some(rules.error_message(RuleKind::Required));
    }

    if !rules.required && is_blank(value) {
        return None;
    }

    let value = value.unwrap_or(&Value::Null);

    if let Some(min) = rules.min_length {
        if !check_min_length(value, min) {
            return Some(rules.error_message(RuleKind::MinLength));
        }
    }

    if let Some(max) = rules.max_length {
        if !check_max_length(value, max) {
            return Some(rules.error_message(RuleKind::MaxLength));
        }
    }

    if let Some(min) = rules.min {
        if !check_min(value, min) {
            return Some(rules.error_message(RuleKind::Min));
        }
    }

    if let Some(max) = rules.max {
        if !check_max(value, max) {
            return Some(rules.error_message(RuleKind::Max));
        }
    }

    if let Some(pattern) = &rules.pattern {
        if !check_pattern(value, pattern) {
            return Some(rules.error_message(RuleKind::Pattern));
        }
    }

    if rules.email && !check_email(value) {
        return Some(rules.error_message(RuleKind::Email));
    }

    if rules.url && !check_url(value) {
        return Some(rules.error_message(RuleKind::Url));
    }

    if let Some(custom) = &rules.custom {
        if !custom(value, data) {
            return Some(rules.error_message(RuleKind::Custom));
        }
    }

    None
}

/// Validate every field in a schema against the data
pub fn validate_schema(data: &FormData, schema: &ValidationSchema) -> Option<ValidationErrors> {
    let mut errors = ValidationErrors::new();

    for (field, rules) in schema.rules() {
        if let Some(message) = validate_field(data.get(field), rules, data) {
            errors.insert(field.clone(), message);
        }
    }

    if errors.is_empty() {
        None
    } else {
        Some(errors)
    }
}
