use std::fmt::{Debug, Formatter};
use std::time::Duration;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::FormInstance;
use crate::name_path::NamePath;
use crate::validation::{ErrorMessage, Rule, ValidateOptions};
use crate::value::StoreValue;

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    pub touched: bool,
    pub validating: bool,
    pub errors: Vec<ErrorMessage>,
}

/// One field's value and meta. Every `None` member is left untouched by
/// [`FormInstance::set_fields`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldData {
    pub name: NamePath,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<StoreValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub touched: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validating: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<ErrorMessage>>,
}

impl FieldData {
    pub fn new(name: impl Into<NamePath>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub(crate) fn from_meta(name: NamePath, value: Option<StoreValue>, meta: Meta) -> Self {
        Self {
            name,
            value,
            touched: Some(meta.touched),
            validating: Some(meta.validating),
            errors: Some(meta.errors),
        }
    }

    pub fn with_value(mut self, value: impl Into<StoreValue>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn with_touched(mut self, touched: bool) -> Self {
        self.touched = Some(touched);
        self
    }

    pub fn with_validating(mut self, validating: bool) -> Self {
        self.validating = Some(validating);
        self
    }

    pub fn with_errors<I, S>(mut self, errors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ErrorMessage>,
    {
        self.errors = Some(errors.into_iter().map(Into::into).collect());
        self
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    pub name: NamePath,
    pub errors: Vec<ErrorMessage>,
}

/// Rejection of a validation cycle.
///
/// `out_of_date` is set when a newer cycle was issued before this one
/// settled; `error_fields` then still lists what this cycle found.
#[derive(Clone, Debug, PartialEq, Error)]
#[error(
    "{} field(s) failed validation (out of date: {out_of_date})",
    .error_fields.len()
)]
pub struct ValidateErrorEntity {
    pub values: StoreValue,
    pub error_fields: Vec<FieldError>,
    pub out_of_date: bool,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum UpdateSource {
    Internal,
    External,
}

#[derive(Clone, Debug, PartialEq)]
pub enum NotifyInfo {
    ValueUpdate { source: UpdateSource },
    ErrorUpdate,
    Reset,
    SetField { data: FieldData },
    DependenciesUpdate { related_fields: Vec<NamePath> },
}

#[derive(Clone)]
pub struct FieldProps {
    pub name: Option<NamePath>,
    pub rules: Vec<Rule>,
    pub dependencies: Vec<NamePath>,
    pub validate_trigger: Vec<String>,
    pub validate_debounce: Option<Duration>,
}

impl Default for FieldProps {
    fn default() -> Self {
        Self {
            name: None,
            rules: Vec::new(),
            dependencies: Vec::new(),
            validate_trigger: vec!["onChange".to_string()],
            validate_debounce: None,
        }
    }
}

impl Debug for FieldProps {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldProps")
            .field("name", &self.name)
            .field("rules", &self.rules.len())
            .field("dependencies", &self.dependencies)
            .field("validate_trigger", &self.validate_trigger)
            .field("validate_debounce", &self.validate_debounce)
            .finish()
    }
}

impl FieldProps {
    pub fn new(name: impl Into<NamePath>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn rule(mut self, rule: impl Into<Rule>) -> Self {
        self.rules.push(rule.into());
        self
    }

    pub fn depends_on(mut self, dependency: impl Into<NamePath>) -> Self {
        self.dependencies.push(dependency.into());
        self
    }

    pub fn validate_trigger<I, S>(mut self, triggers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.validate_trigger = triggers.into_iter().map(Into::into).collect();
        self
    }

    pub fn debounce(mut self, debounce: Duration) -> Self {
        self.validate_debounce = Some(debounce);
        self
    }
}

/// A registered consumer of one name path.
///
/// The store never holds its lock while calling into an entity, so
/// implementations may call back into the form.
pub trait FieldEntity: Send + Sync {
    fn name_path(&self) -> NamePath;

    fn meta(&self) -> Meta;

    fn props(&self) -> &FieldProps;

    fn is_field_touched(&self) -> bool {
        self.meta().touched
    }

    fn is_field_validating(&self) -> bool {
        self.meta().validating
    }

    fn validate_rules(
        &self,
        form: &FormInstance,
        options: &ValidateOptions,
    ) -> BoxFuture<'static, Result<(), Vec<ErrorMessage>>>;

    fn on_store_change(
        &self,
        prev_store: &StoreValue,
        name_paths: Option<&[NamePath]>,
        info: &NotifyInfo,
    );
}
