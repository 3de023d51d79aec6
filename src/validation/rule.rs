use std::fmt::{Debug, Display, Formatter};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures::channel::oneshot;
use futures::future::BoxFuture;
use regex::Regex;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::form::FormInstance;
use crate::value::StoreValue;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum RuleType {
    String,
    Number,
    Boolean,
    Method,
    Regexp,
    Integer,
    Float,
    Array,
    Object,
    Enum,
    Date,
    Url,
    Hex,
    Email,
}

impl RuleType {
    pub const fn as_str(self) -> &'static str {
        match self {
            RuleType::String => "string",
            RuleType::Number => "number",
            RuleType::Boolean => "boolean",
            RuleType::Method => "method",
            RuleType::Regexp => "regexp",
            RuleType::Integer => "integer",
            RuleType::Float => "float",
            RuleType::Array => "array",
            RuleType::Object => "object",
            RuleType::Enum => "enum",
            RuleType::Date => "date",
            RuleType::Url => "url",
            RuleType::Hex => "hex",
            RuleType::Email => "email",
        }
    }

    pub(crate) const fn is_numeric(self) -> bool {
        matches!(self, RuleType::Number | RuleType::Integer | RuleType::Float)
    }
}

impl Display for RuleType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum ValidatorError {
    #[error("{0}")]
    Message(String),
    #[error("{}", .0.join(", "))]
    Messages(Vec<String>),
    #[error("validator failed without a message")]
    Unstructured,
}

impl From<&str> for ValidatorError {
    fn from(value: &str) -> Self {
        ValidatorError::Message(value.to_string())
    }
}

impl From<String> for ValidatorError {
    fn from(value: String) -> Self {
        ValidatorError::Message(value)
    }
}

pub type ValidatorResult = Result<(), ValidatorError>;
pub type ValidatorFuture = BoxFuture<'static, ValidatorResult>;
pub type ValidatorFn = Arc<
    dyn Fn(&RuleObject, Option<&StoreValue>, ValidatorCallback) -> Option<ValidatorFuture>
        + Send
        + Sync,
>;
pub type TransformFn = Arc<dyn Fn(Option<&StoreValue>) -> Option<StoreValue> + Send + Sync>;
pub type RuleRenderFn = Arc<dyn Fn(&FormInstance) -> RuleObject + Send + Sync>;

/// Completion handle for callback-style validators.
///
/// Only the first call counts. Once the validator has returned a future the
/// callback is ignored.
#[derive(Clone)]
pub struct ValidatorCallback {
    inner: Arc<CallbackSlot>,
}

struct CallbackSlot {
    sender: Mutex<Option<oneshot::Sender<ValidatorResult>>>,
    called: AtomicBool,
    superseded: AtomicBool,
}

impl ValidatorCallback {
    pub(crate) fn new() -> (Self, oneshot::Receiver<ValidatorResult>) {
        let (sender, receiver) = oneshot::channel();
        let callback = Self {
            inner: Arc::new(CallbackSlot {
                sender: Mutex::new(Some(sender)),
                called: AtomicBool::new(false),
                superseded: AtomicBool::new(false),
            }),
        };
        (callback, receiver)
    }

    pub fn ok(&self) {
        self.call(Ok(()));
    }

    pub fn error(&self, message: impl Into<String>) {
        self.call(Err(ValidatorError::Message(message.into())));
    }

    pub fn call(&self, result: ValidatorResult) {
        self.inner.called.store(true, Ordering::SeqCst);
        if self.inner.superseded.load(Ordering::SeqCst) {
            tracing::warn!(
                "validator already returned a future; the callback result is ignored"
            );
            return;
        }
        let sender = match self.inner.sender.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(sender) = sender {
            let _ = sender.send(result);
        }
    }

    pub(crate) fn was_called(&self) -> bool {
        self.inner.called.load(Ordering::SeqCst)
    }

    pub(crate) fn supersede(&self) {
        self.inner.superseded.store(true, Ordering::SeqCst);
    }
}

/// Declarative checks applied to a single field value.
#[derive(Clone, Default)]
pub struct RuleObject {
    pub rule_type: Option<RuleType>,
    pub required: bool,
    pub min: Option<Decimal>,
    pub max: Option<Decimal>,
    pub len: Option<Decimal>,
    pub pattern: Option<Regex>,
    pub enum_values: Option<Vec<StoreValue>>,
    pub whitespace: bool,
    pub validator: Option<ValidatorFn>,
    pub transform: Option<TransformFn>,
    pub message: Option<String>,
    pub validate_trigger: Option<Vec<String>>,
    pub default_field: Option<Box<RuleObject>>,
}

impl Debug for RuleObject {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleObject")
            .field("rule_type", &self.rule_type)
            .field("required", &self.required)
            .field("min", &self.min)
            .field("max", &self.max)
            .field("len", &self.len)
            .field("pattern", &self.pattern.as_ref().map(Regex::as_str))
            .field("enum_values", &self.enum_values)
            .field("whitespace", &self.whitespace)
            .field("validator", &self.validator.is_some())
            .field("transform", &self.transform.is_some())
            .field("message", &self.message)
            .field("validate_trigger", &self.validate_trigger)
            .field("default_field", &self.default_field)
            .finish()
    }
}

impl RuleObject {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required() -> Self {
        Self {
            required: true,
            ..Self::default()
        }
    }

    pub fn typed(rule_type: RuleType) -> Self {
        Self {
            rule_type: Some(rule_type),
            ..Self::default()
        }
    }

    pub fn of_type(mut self, rule_type: RuleType) -> Self {
        self.rule_type = Some(rule_type);
        self
    }

    pub fn require(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn min(mut self, min: impl Into<Decimal>) -> Self {
        self.min = Some(min.into());
        self
    }

    pub fn max(mut self, max: impl Into<Decimal>) -> Self {
        self.max = Some(max.into());
        self
    }

    pub fn len(mut self, len: impl Into<Decimal>) -> Self {
        self.len = Some(len.into());
        self
    }

    pub fn pattern(mut self, pattern: Regex) -> Self {
        self.pattern = Some(pattern);
        self
    }

    pub fn one_of<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<StoreValue>,
    {
        self.enum_values = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn whitespace(mut self) -> Self {
        self.whitespace = true;
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn trigger(mut self, trigger: impl Into<String>) -> Self {
        self.validate_trigger
            .get_or_insert_with(Vec::new)
            .push(trigger.into());
        self
    }

    pub fn default_field(mut self, rule: RuleObject) -> Self {
        self.default_field = Some(Box::new(rule));
        self
    }

    pub fn transform<F>(mut self, transform: F) -> Self
    where
        F: Fn(Option<&StoreValue>) -> Option<StoreValue> + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(transform));
        self
    }

    /// Custom validator in either style: return `Some(future)`, or return
    /// `None` and report through the callback.
    pub fn validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&RuleObject, Option<&StoreValue>, ValidatorCallback) -> Option<ValidatorFuture>
            + Send
            + Sync
            + 'static,
    {
        self.validator = Some(Arc::new(validator));
        self
    }

    pub fn async_validator<F, Fut>(self, validator: F) -> Self
    where
        F: Fn(Option<StoreValue>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ValidatorResult> + Send + 'static,
    {
        self.validator(move |_rule, value, _callback| {
            Some(Box::pin(validator(value.cloned())) as ValidatorFuture)
        })
    }

    pub(crate) fn matches_trigger(&self, trigger_name: Option<&str>) -> bool {
        match (trigger_name, &self.validate_trigger) {
            (Some(trigger), Some(triggers)) => triggers.iter().any(|item| item == trigger),
            _ => true,
        }
    }
}

/// A rule as declared on a field: fixed, or rendered from the live form.
#[derive(Clone)]
pub enum Rule {
    Object(RuleObject),
    Render(RuleRenderFn),
}

impl Debug for Rule {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Rule::Object(rule) => f.debug_tuple("Object").field(rule).finish(),
            Rule::Render(_) => f.write_str("Render(..)"),
        }
    }
}

impl Rule {
    pub fn render<F>(render: F) -> Self
    where
        F: Fn(&FormInstance) -> RuleObject + Send + Sync + 'static,
    {
        Rule::Render(Arc::new(render))
    }

    pub fn resolve(&self, form: &FormInstance) -> RuleObject {
        match self {
            Rule::Object(rule) => rule.clone(),
            Rule::Render(render) => render(form),
        }
    }
}

impl From<RuleObject> for Rule {
    fn from(value: RuleObject) -> Self {
        Rule::Object(value)
    }
}
