mod messages;
mod rule;

use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, LazyLock};

use chrono::{DateTime, NaiveDate, Utc};
use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use regex::{Regex, RegexBuilder};
use rust_decimal::Decimal;

use crate::form::FormInstance;
use crate::name_path::NamePath;
use crate::value::StoreValue;

pub use messages::{MessageFn, MessageTemplate, ValidateMessages, replace_message};
pub use rule::{
    Rule, RuleObject, RuleRenderFn, RuleType, TransformFn, ValidatorCallback, ValidatorError,
    ValidatorFn, ValidatorFuture, ValidatorResult,
};

pub type ErrorMessage = String;

#[derive(Clone, Debug, Default)]
pub struct ValidateOptions {
    /// Only rules without a trigger list, or listing this trigger, run.
    pub trigger_name: Option<String>,
    /// Overrides merged over the built-in catalog.
    pub validate_messages: Option<Arc<ValidateMessages>>,
}

impl ValidateOptions {
    pub fn with_trigger(mut self, trigger: impl Into<String>) -> Self {
        self.trigger_name = Some(trigger.into());
        self
    }

    pub fn with_messages(mut self, messages: Arc<ValidateMessages>) -> Self {
        self.validate_messages = Some(messages);
        self
    }
}

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"^(([^<>()\[\]\\.,;:\s@"]+(\.[^<>()\[\]\\.,;:\s@"]+)*)|(".+"))@((\[[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}\])|(([a-zA-Z\-0-9]+\.)+[a-zA-Z]{2,}))$"#,
    )
    .expect("email pattern is valid")
});

static URL: LazyLock<Regex> = LazyLock::new(|| {
    RegexBuilder::new(
        r"^(?:(?:https?|ftp)://)(?:\S+(?::\S*)?@)?(?:(?:[1-9]\d?|1\d\d|2[01]\d|22[0-3])(?:\.(?:1?\d{1,2}|2[0-4]\d|25[0-5])){2}(?:\.(?:[1-9]\d?|1\d\d|2[0-4]\d|25[0-4]))|(?:(?:[a-z\x{a1}-\x{ffff}0-9]+-*)*[a-z\x{a1}-\x{ffff}0-9]+)(?:\.(?:[a-z\x{a1}-\x{ffff}0-9]+-*)*[a-z\x{a1}-\x{ffff}0-9]+)*(?:\.(?:[a-z\x{a1}-\x{ffff}]{2,})))|localhost)(?::\d{2,5})?(?:/[^\s]*)?$",
    )
    .case_insensitive(true)
    .build()
    .expect("url pattern is valid")
});

static HEX: LazyLock<Regex> = LazyLock::new(|| {
    RegexBuilder::new(r"^#?([a-f0-9]{6}|[a-f0-9]{3})$")
        .case_insensitive(true)
        .build()
        .expect("hex pattern is valid")
});

/// Runs `rules` against `value` and resolves with every error in rule
/// declaration order.
///
/// Render rules are resolved against `form` and the value is captured before
/// this returns, so later store writes do not leak into the run.
pub fn validate_rules(
    name_path: &NamePath,
    value: Option<&StoreValue>,
    rules: &[Rule],
    options: &ValidateOptions,
    form: &FormInstance,
) -> BoxFuture<'static, Result<(), Vec<ErrorMessage>>> {
    let name = name_path.to_string();
    let messages = Arc::new(ValidateMessages::with_defaults(
        options.validate_messages.as_deref(),
    ));
    let pending = rules
        .iter()
        .map(|rule| rule.resolve(form))
        .filter(|rule| rule.matches_trigger(options.trigger_name.as_deref()))
        .map(|rule| validate_rule(name.clone(), value.cloned(), rule, messages.clone()))
        .collect::<Vec<_>>();

    Box::pin(async move {
        let errors = join_all(pending)
            .await
            .into_iter()
            .flatten()
            .collect::<Vec<_>>();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    })
}

fn validate_rule(
    name: String,
    value: Option<StoreValue>,
    rule: RuleObject,
    messages: Arc<ValidateMessages>,
) -> BoxFuture<'static, Vec<ErrorMessage>> {
    Box::pin(async move {
        let value = match &rule.transform {
            Some(transform) => transform(value.as_ref()),
            None => value,
        };
        let context = message_context(&name, &rule);

        let outcome = match rule.validator.clone() {
            Some(validator) => run_validator(validator, &rule, value.clone())
                .await
                .map_err(|error| validator_messages(error, &messages, &context)),
            None => check_builtin(&rule, value.as_ref(), &messages, &context),
        };

        if let Err(errors) = outcome {
            return match &rule.message {
                Some(message) => vec![message.clone()],
                None => errors,
            };
        }

        match (&rule.rule_type, &rule.default_field, &value) {
            (Some(RuleType::Array), Some(element_rule), Some(StoreValue::List(items))) => {
                let children = items.iter().enumerate().map(|(index, item)| {
                    validate_rule(
                        format!("{name}.{index}"),
                        Some(item.clone()),
                        RuleObject::clone(element_rule),
                        messages.clone(),
                    )
                });
                join_all(children).await.into_iter().flatten().collect()
            }
            _ => Vec::new(),
        }
    })
}

async fn run_validator(
    validator: ValidatorFn,
    rule: &RuleObject,
    value: Option<StoreValue>,
) -> ValidatorResult {
    let (callback, receiver) = ValidatorCallback::new();
    let returned = panic::catch_unwind(AssertUnwindSafe(|| {
        validator(rule, value.as_ref(), callback.clone())
    }));

    match returned {
        Err(_) => {
            tracing::warn!("validator panicked; falling back to the default message");
            Err(ValidatorError::Unstructured)
        }
        Ok(Some(future)) => {
            callback.supersede();
            if callback.was_called() {
                tracing::warn!(
                    "validator already returned a future; the callback result is ignored"
                );
            }
            match AssertUnwindSafe(future).catch_unwind().await {
                Ok(result) => result,
                Err(_) => {
                    tracing::warn!("validator future panicked; falling back to the default message");
                    Err(ValidatorError::Unstructured)
                }
            }
        }
        Ok(None) => {
            tracing::warn!("validator callbacks are deprecated; return a future instead");
            drop(callback);
            receiver.await.unwrap_or(Err(ValidatorError::Unstructured))
        }
    }
}

fn validator_messages(
    error: ValidatorError,
    messages: &ValidateMessages,
    context: &BTreeMap<&'static str, String>,
) -> Vec<ErrorMessage> {
    match error {
        ValidatorError::Message(message) => vec![message],
        ValidatorError::Messages(list) if !list.is_empty() => list,
        _ => vec![render(messages, "default", context)],
    }
}

fn message_context(name: &str, rule: &RuleObject) -> BTreeMap<&'static str, String> {
    let mut context = BTreeMap::new();
    context.insert("name", name.to_string());
    context.insert(
        "enum",
        rule.enum_values
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", "),
    );
    if let Some(rule_type) = rule.rule_type {
        context.insert("type", rule_type.to_string());
    }
    if let Some(min) = rule.min {
        context.insert("min", min.normalize().to_string());
    }
    if let Some(max) = rule.max {
        context.insert("max", max.normalize().to_string());
    }
    if let Some(len) = rule.len {
        context.insert("len", len.normalize().to_string());
    }
    if let Some(pattern) = &rule.pattern {
        context.insert("pattern", format!("/{}/", pattern.as_str()));
    }
    if let Some(message) = &rule.message {
        context.insert("message", message.clone());
    }
    context.insert("required", rule.required.to_string());
    context.insert("whitespace", rule.whitespace.to_string());
    context
}

fn render(
    messages: &ValidateMessages,
    key: &str,
    context: &BTreeMap<&'static str, String>,
) -> ErrorMessage {
    messages
        .render(key, context)
        .or_else(|| messages.render("default", context))
        .unwrap_or_else(|| format!("Validation error on field {}", context["name"]))
}

fn check_builtin(
    rule: &RuleObject,
    value: Option<&StoreValue>,
    messages: &ValidateMessages,
    context: &BTreeMap<&'static str, String>,
) -> Result<(), Vec<ErrorMessage>> {
    let value = match value {
        Some(value) if !is_empty_value(value, rule.rule_type) => value,
        _ if rule.required => return Err(vec![render(messages, "required", context)]),
        _ => return Ok(()),
    };

    if let Some(rule_type) = rule.rule_type.filter(|rule_type| !matches_type(*rule_type, value)) {
        let key = format!("types.{rule_type}");
        return Err(vec![render(messages, &key, context)]);
    }

    let mut errors = Vec::new();
    if let Some(key) = range_violation(rule, value) {
        errors.push(render(messages, key, context));
    }
    if let Some(pattern) = &rule.pattern {
        let subject = match value {
            StoreValue::String(text) => Some(text.clone()),
            StoreValue::Number(number) => Some(number.to_string()),
            _ => None,
        };
        if subject.is_some_and(|subject| !pattern.is_match(&subject)) {
            errors.push(render(messages, "pattern.mismatch", context));
        }
    }
    if rule.whitespace
        && value
            .as_str()
            .is_some_and(|text| text.chars().all(char::is_whitespace))
    {
        errors.push(render(messages, "whitespace", context));
    }
    if rule
        .enum_values
        .as_ref()
        .is_some_and(|allowed| !allowed.contains(value))
    {
        errors.push(render(messages, "enum", context));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn is_empty_value(value: &StoreValue, rule_type: Option<RuleType>) -> bool {
    match value {
        StoreValue::Null => true,
        StoreValue::String(text) => {
            text.is_empty()
                && !matches!(
                    rule_type,
                    Some(RuleType::Boolean | RuleType::Object | RuleType::Array)
                )
        }
        StoreValue::List(items) => {
            items.is_empty() && matches!(rule_type, None | Some(RuleType::Array))
        }
        _ => false,
    }
}

fn numeric_value(value: &StoreValue) -> Option<Decimal> {
    let text = match value {
        StoreValue::Number(number) => number.to_string(),
        StoreValue::String(text) => text.trim().to_string(),
        _ => return None,
    };
    text.parse::<Decimal>()
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

fn matches_type(rule_type: RuleType, value: &StoreValue) -> bool {
    match rule_type {
        RuleType::String => matches!(value, StoreValue::String(_)),
        RuleType::Number | RuleType::Float => numeric_value(value).is_some(),
        RuleType::Integer => numeric_value(value).is_some_and(|number| number.fract().is_zero()),
        RuleType::Boolean => matches!(value, StoreValue::Bool(_)),
        RuleType::Method => false,
        RuleType::Regexp => value.as_str().is_some_and(|text| Regex::new(text).is_ok()),
        RuleType::Array => matches!(value, StoreValue::List(_)),
        RuleType::Object => matches!(value, StoreValue::Map(_)),
        RuleType::Enum => true,
        RuleType::Date => match value {
            StoreValue::String(text) => {
                DateTime::parse_from_rfc3339(text).is_ok()
                    || NaiveDate::parse_from_str(text, "%Y-%m-%d").is_ok()
            }
            StoreValue::Number(number) => number
                .as_i64()
                .is_some_and(|millis| DateTime::<Utc>::from_timestamp_millis(millis).is_some()),
            _ => false,
        },
        RuleType::Url => value.as_str().is_some_and(|text| URL.is_match(text)),
        RuleType::Hex => value.as_str().is_some_and(|text| HEX.is_match(text)),
        RuleType::Email => value.as_str().is_some_and(|text| EMAIL.is_match(text)),
    }
}

/// Catalog key of the violated length or size bound, if any.
fn range_violation(rule: &RuleObject, value: &StoreValue) -> Option<&'static str> {
    if rule.len.is_none() && rule.min.is_none() && rule.max.is_none() {
        return None;
    }

    let numeric_rule = rule.rule_type.is_some_and(RuleType::is_numeric);
    let (group, measured) = match value {
        StoreValue::Number(_) => ("number", numeric_value(value)?),
        StoreValue::String(_) if numeric_rule => ("number", numeric_value(value)?),
        StoreValue::String(text) => ("string", Decimal::from(text.chars().count())),
        StoreValue::List(items) => ("array", Decimal::from(items.len())),
        _ => return None,
    };

    let bound = match (rule.len, rule.min, rule.max) {
        (Some(len), _, _) => (measured != len).then_some("len"),
        (None, Some(min), None) => (measured < min).then_some("min"),
        (None, None, Some(max)) => (measured > max).then_some("max"),
        (None, Some(min), Some(max)) => (measured < min || measured > max).then_some("range"),
        (None, None, None) => None,
    }?;

    Some(match (group, bound) {
        ("number", "len") => "number.len",
        ("number", "min") => "number.min",
        ("number", "max") => "number.max",
        ("number", _) => "number.range",
        ("string", "len") => "string.len",
        ("string", "min") => "string.min",
        ("string", "max") => "string.max",
        ("string", _) => "string.range",
        (_, "len") => "array.len",
        (_, "min") => "array.min",
        (_, "max") => "array.max",
        _ => "array.range",
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::executor::block_on;
    use serde_json::json;

    use super::*;

    fn run(
        name: impl Into<NamePath>,
        value: Option<StoreValue>,
        rules: Vec<Rule>,
        options: ValidateOptions,
    ) -> Result<(), Vec<ErrorMessage>> {
        block_on(validate_rules(
            &name.into(),
            value.as_ref(),
            &rules,
            &options,
            &FormInstance::detached(),
        ))
    }

    fn errors(result: Result<(), Vec<ErrorMessage>>) -> Vec<ErrorMessage> {
        result.err().unwrap_or_default()
    }

    #[test]
    fn required_rejects_missing_and_empty_values() {
        let rules = vec![Rule::from(RuleObject::required())];
        assert_eq!(
            errors(run("password", Some("".into()), rules.clone(), ValidateOptions::default())),
            vec!["password is required"]
        );
        assert_eq!(
            errors(run("password", None, rules.clone(), ValidateOptions::default())),
            vec!["password is required"]
        );
        assert!(run("password", Some("x".into()), rules, ValidateOptions::default()).is_ok());
    }

    #[test]
    fn empty_optional_values_skip_every_check() {
        let rules = vec![Rule::from(
            RuleObject::typed(RuleType::Email).min(5).whitespace(),
        )];
        assert!(run("email", Some("".into()), rules, ValidateOptions::default()).is_ok());
    }

    #[test]
    fn array_default_field_reports_element_paths() {
        let rules = vec![Rule::from(
            RuleObject::typed(RuleType::Array).default_field(RuleObject::typed(RuleType::Number)),
        )];
        let value = StoreValue::from(json!(["1", "x"]));
        assert_eq!(
            errors(run("list", Some(value), rules, ValidateOptions::default())),
            vec!["list.1 is not a valid number"]
        );
    }

    #[test]
    fn default_field_is_skipped_when_the_array_itself_fails() {
        let rules = vec![Rule::from(
            RuleObject::typed(RuleType::Array)
                .max(1)
                .default_field(RuleObject::typed(RuleType::Number)),
        )];
        let value = StoreValue::from(json!(["x", "y"]));
        assert_eq!(
            errors(run("list", Some(value), rules, ValidateOptions::default())),
            vec!["list cannot be greater than 1 in length"]
        );
    }

    #[test]
    fn range_group_follows_the_value_kind() {
        let string_rule = vec![Rule::from(RuleObject::new().min(3).max(5))];
        assert_eq!(
            errors(run("nick", Some("ab".into()), string_rule, ValidateOptions::default())),
            vec!["nick must be between 3 and 5 characters"]
        );

        let number_rule = vec![Rule::from(RuleObject::typed(RuleType::Number).min(0))];
        assert_eq!(
            errors(run("age", Some("-1".into()), number_rule.clone(), ValidateOptions::default())),
            vec!["age cannot be less than 0"]
        );
        assert!(run("age", Some(0i64.into()), number_rule, ValidateOptions::default()).is_ok());

        let len_rule = vec![Rule::from(RuleObject::typed(RuleType::Array).len(2))];
        assert_eq!(
            errors(run(
                "pair",
                Some(StoreValue::from(json!([1]))),
                len_rule,
                ValidateOptions::default()
            )),
            vec!["pair must be exactly 2 in length"]
        );
    }

    #[test]
    fn pattern_whitespace_and_enum_use_their_templates() {
        let digits = Regex::new(r"^\d+$").expect("digits pattern");
        let rules = vec![
            Rule::from(RuleObject::new().pattern(digits)),
            Rule::from(RuleObject::new().whitespace()),
            Rule::from(RuleObject::new().one_of(["a", "b"])),
        ];
        assert_eq!(
            errors(run("code", Some("  ".into()), rules, ValidateOptions::default())),
            vec![
                "code does not match pattern /^\\d+$/",
                "code cannot be empty",
                "code must be one of [a, b]",
            ]
        );
    }

    #[test]
    fn typed_checks_cover_string_formats() {
        let check = |rule_type, value: &str| {
            run(
                "field",
                Some(value.into()),
                vec![Rule::from(RuleObject::typed(rule_type))],
                ValidateOptions::default(),
            )
            .is_ok()
        };
        assert!(check(RuleType::Email, "dev@example.com"));
        assert!(!check(RuleType::Email, "dev@"));
        assert!(check(RuleType::Url, "https://example.com/path"));
        assert!(!check(RuleType::Url, "example"));
        assert!(check(RuleType::Hex, "#a1B2c3"));
        assert!(!check(RuleType::Hex, "#zz"));
        assert!(check(RuleType::Date, "2024-02-29"));
        assert!(!check(RuleType::Date, "yesterday"));
        assert!(check(RuleType::Integer, "42"));
        assert!(!check(RuleType::Integer, "4.2"));
        assert!(check(RuleType::Regexp, "^a+$"));
        assert!(!check(RuleType::Regexp, "(["));
    }

    #[test]
    fn rule_message_replaces_all_errors_verbatim() {
        let rules = vec![Rule::from(
            RuleObject::new().min(3).whitespace().message("nickname looks wrong"),
        )];
        assert_eq!(
            errors(run("nick", Some(" ".into()), rules, ValidateOptions::default())),
            vec!["nickname looks wrong"]
        );

        let literal = vec![Rule::from(RuleObject::required().message("${name} is needed"))];
        assert_eq!(
            errors(run("nick", None, literal, ValidateOptions::default())),
            vec!["${name} is needed"]
        );
    }

    #[test]
    fn catalog_overrides_apply_per_leaf() {
        let messages = ValidateMessages::new().with("required", "fill ${name} in");
        let options = ValidateOptions::default().with_messages(Arc::new(messages));
        let rules = vec![
            Rule::from(RuleObject::required()),
            Rule::from(RuleObject::typed(RuleType::Number).require()),
        ];
        assert_eq!(
            errors(run("age", None, rules, options)),
            vec!["fill age in", "fill age in"]
        );
    }

    #[test]
    fn returned_future_wins_over_callback() {
        let rules = vec![Rule::from(RuleObject::new().validator(|_, _, callback| {
            callback.ok();
            Some(Box::pin(async { ValidatorResult::Err("server says no".into()) }) as ValidatorFuture)
        }))];
        assert_eq!(
            errors(run("name", Some("x".into()), rules, ValidateOptions::default())),
            vec!["server says no"]
        );
    }

    #[test]
    fn callback_style_validators_still_report() {
        let rules = vec![Rule::from(RuleObject::new().validator(|_, value, callback| {
            match value.and_then(StoreValue::as_str) {
                Some("taken") => callback.error("name is taken"),
                _ => callback.ok(),
            }
            None
        }))];
        assert_eq!(
            errors(run("name", Some("taken".into()), rules.clone(), ValidateOptions::default())),
            vec!["name is taken"]
        );
        assert!(run("name", Some("free".into()), rules, ValidateOptions::default()).is_ok());
    }

    #[test]
    fn malformed_validators_fall_back_to_default_message() {
        let rules = vec![
            Rule::from(RuleObject::new().validator(|_, _, _| panic!("validator exploded"))),
            Rule::from(RuleObject::new().validator(|_, _, _| None)),
            Rule::from(
                RuleObject::new().async_validator(|_| async { ValidatorResult::Err(ValidatorError::Unstructured) }),
            ),
        ];
        assert_eq!(
            errors(run("name", Some("x".into()), rules, ValidateOptions::default())),
            vec![
                "Validation error on field name",
                "Validation error on field name",
                "Validation error on field name",
            ]
        );
    }

    #[test]
    fn validator_replaces_builtin_checks() {
        let rules = vec![Rule::from(
            RuleObject::required().async_validator(|_| async { ValidatorResult::Ok(()) }),
        )];
        assert!(run("name", None, rules, ValidateOptions::default()).is_ok());
    }

    #[test]
    fn trigger_filters_rules_that_declare_triggers() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let rules = vec![
            Rule::from(RuleObject::required().trigger("onBlur")),
            Rule::from(RuleObject::new().async_validator(move |_| {
                counted.fetch_add(1, Ordering::SeqCst);
                async { ValidatorResult::Ok(()) }
            })),
        ];

        assert!(
            run(
                "name",
                None,
                rules.clone(),
                ValidateOptions::default().with_trigger("onChange")
            )
            .is_ok()
        );
        assert_eq!(
            errors(run("name", None, rules, ValidateOptions::default().with_trigger("onBlur"))),
            vec!["name is required"]
        );
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn transform_runs_before_checks() {
        let rules = vec![Rule::from(
            RuleObject::required()
                .transform(|value| {
                    value
                        .and_then(StoreValue::as_str)
                        .map(|text| StoreValue::from(text.trim()))
                }),
        )];
        assert_eq!(
            errors(run("title", Some("   ".into()), rules, ValidateOptions::default())),
            vec!["title is required"]
        );
    }

    #[test]
    fn repeated_runs_are_idempotent() {
        let rules = vec![Rule::from(RuleObject::typed(RuleType::Number).max(10))];
        let first = run("n", Some(11i64.into()), rules.clone(), ValidateOptions::default());
        let second = run("n", Some(11i64.into()), rules, ValidateOptions::default());
        assert_eq!(first, second);
        assert_eq!(errors(first), vec!["n cannot be greater than 10"]);
    }
}
