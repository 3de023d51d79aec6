use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::sync::{Arc, LazyLock};

use regex::{Captures, Regex};
use serde::{Deserialize, Deserializer};
use serde_json::json;

pub type MessageFn = Arc<dyn Fn() -> String + Send + Sync>;

#[derive(Clone)]
pub enum MessageTemplate {
    Text(String),
    Func(MessageFn),
    Group(ValidateMessages),
}

impl Debug for MessageTemplate {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageTemplate::Text(text) => f.debug_tuple("Text").field(text).finish(),
            MessageTemplate::Func(_) => f.write_str("Func(..)"),
            MessageTemplate::Group(group) => f.debug_tuple("Group").field(group).finish(),
        }
    }
}

/// Message catalog keyed by dotted rule kinds such as `types.number`.
#[derive(Clone, Debug, Default)]
pub struct ValidateMessages {
    entries: BTreeMap<String, MessageTemplate>,
}

static DEFAULT_MESSAGES: LazyLock<ValidateMessages> = LazyLock::new(|| {
    let type_template = "${name} is not a valid ${type}";
    ValidateMessages::from(&json!({
        "default": "Validation error on field ${name}",
        "required": "${name} is required",
        "enum": "${name} must be one of [${enum}]",
        "whitespace": "${name} cannot be empty",
        "date": {
            "format": "${name} is invalid for format date",
            "parse": "${name} could not be parsed as date",
            "invalid": "${name} is invalid date",
        },
        "types": {
            "string": type_template,
            "method": type_template,
            "array": type_template,
            "object": type_template,
            "number": type_template,
            "date": type_template,
            "boolean": type_template,
            "integer": type_template,
            "float": type_template,
            "regexp": type_template,
            "email": type_template,
            "url": type_template,
            "hex": type_template,
        },
        "string": {
            "len": "${name} must be exactly ${len} characters",
            "min": "${name} must be at least ${min} characters",
            "max": "${name} cannot be longer than ${max} characters",
            "range": "${name} must be between ${min} and ${max} characters",
        },
        "number": {
            "len": "${name} must equal ${len}",
            "min": "${name} cannot be less than ${min}",
            "max": "${name} cannot be greater than ${max}",
            "range": "${name} must be between ${min} and ${max}",
        },
        "array": {
            "len": "${name} must be exactly ${len} in length",
            "min": "${name} cannot be less than ${min} in length",
            "max": "${name} cannot be greater than ${max} in length",
            "range": "${name} must be between ${min} and ${max} in length",
        },
        "pattern": {
            "mismatch": "${name} does not match pattern ${pattern}",
        },
    }))
});

static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{(\w+)\}").expect("token pattern is valid"));

impl ValidateMessages {
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in catalog every form starts from.
    pub fn defaults() -> Self {
        DEFAULT_MESSAGES.clone()
    }

    /// `defaults()` with `overrides` merged on top, leaf by leaf.
    pub fn with_defaults(overrides: Option<&ValidateMessages>) -> Self {
        let mut merged = Self::defaults();
        if let Some(overrides) = overrides {
            merged.merge_from(overrides);
        }
        merged
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn with(mut self, key: &str, template: impl Into<String>) -> Self {
        self.insert(key, MessageTemplate::Text(template.into()));
        self
    }

    pub fn with_fn(mut self, key: &str, message: impl Fn() -> String + Send + Sync + 'static) -> Self {
        self.insert(key, MessageTemplate::Func(Arc::new(message)));
        self
    }

    /// Inserts at a dotted key, creating groups along the way.
    pub fn insert(&mut self, key: &str, template: MessageTemplate) {
        match key.split_once('.') {
            None => {
                self.entries.insert(key.to_string(), template);
            }
            Some((head, rest)) => {
                let slot = self
                    .entries
                    .entry(head.to_string())
                    .or_insert_with(|| MessageTemplate::Group(ValidateMessages::new()));
                if !matches!(slot, MessageTemplate::Group(_)) {
                    *slot = MessageTemplate::Group(ValidateMessages::new());
                }
                if let MessageTemplate::Group(group) = slot {
                    group.insert(rest, template);
                }
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&MessageTemplate> {
        match key.split_once('.') {
            None => self.entries.get(key),
            Some((head, rest)) => match self.entries.get(head)? {
                MessageTemplate::Group(group) => group.get(rest),
                _ => None,
            },
        }
    }

    pub fn merge_from(&mut self, other: &ValidateMessages) {
        for (key, template) in &other.entries {
            match (self.entries.get_mut(key), template) {
                (Some(MessageTemplate::Group(existing)), MessageTemplate::Group(group)) => {
                    existing.merge_from(group);
                }
                _ => {
                    self.entries.insert(key.clone(), template.clone());
                }
            }
        }
    }

    /// Renders the message stored at `key` against `context`.
    pub fn render(&self, key: &str, context: &BTreeMap<&'static str, String>) -> Option<String> {
        match self.get(key)? {
            MessageTemplate::Text(template) => Some(replace_message(template, context)),
            MessageTemplate::Func(message) => Some(message()),
            MessageTemplate::Group(_) => None,
        }
    }
}

impl From<&serde_json::Value> for ValidateMessages {
    fn from(value: &serde_json::Value) -> Self {
        let mut messages = ValidateMessages::new();
        if let serde_json::Value::Object(entries) = value {
            for (key, value) in entries {
                let template = match value {
                    serde_json::Value::String(text) => MessageTemplate::Text(text.clone()),
                    serde_json::Value::Object(_) => {
                        MessageTemplate::Group(ValidateMessages::from(value))
                    }
                    _ => continue,
                };
                messages.entries.insert(key.clone(), template);
            }
        }
        messages
    }
}

impl<'de> Deserialize<'de> for ValidateMessages {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(ValidateMessages::from(&value))
    }
}

/// Substitutes `${token}` placeholders. Unknown tokens are left verbatim.
pub fn replace_message(template: &str, context: &BTreeMap<&'static str, String>) -> String {
    TOKEN
        .replace_all(template, |captures: &Captures<'_>| {
            context
                .get(&captures[1])
                .cloned()
                .unwrap_or_else(|| captures[0].to_string())
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(pairs: &[(&'static str, &str)]) -> BTreeMap<&'static str, String> {
        pairs
            .iter()
            .map(|(key, value)| (*key, value.to_string()))
            .collect()
    }

    #[test]
    fn replace_message_fills_known_tokens_only() {
        let rendered = replace_message(
            "${name} must be between ${min} and ${max}",
            &context(&[("name", "age"), ("min", "1")]),
        );
        assert_eq!(rendered, "age must be between 1 and ${max}");
    }

    #[test]
    fn overrides_merge_per_leaf() {
        let overrides = ValidateMessages::new()
            .with("types.number", "${name} wants a ${type}")
            .with("required", "need ${name}");
        let merged = ValidateMessages::with_defaults(Some(&overrides));
        let ctx = context(&[("name", "age"), ("type", "number")]);

        assert_eq!(
            merged.render("types.number", &ctx).as_deref(),
            Some("age wants a number")
        );
        assert_eq!(
            merged.render("types.string", &ctx).as_deref(),
            Some("age is not a valid number")
        );
        assert_eq!(merged.render("required", &ctx).as_deref(), Some("need age"));
    }

    #[test]
    fn function_messages_bypass_templating() {
        let merged = ValidateMessages::with_defaults(Some(
            &ValidateMessages::new().with_fn("default", || "custom".to_string()),
        ));
        assert_eq!(
            merged.render("default", &BTreeMap::new()).as_deref(),
            Some("custom")
        );
    }

    #[test]
    fn catalog_deserializes_from_json() {
        let messages: ValidateMessages =
            serde_json::from_value(json!({ "pattern": { "mismatch": "bad ${name}" } }))
                .expect("catalog json");
        assert_eq!(
            messages
                .render("pattern.mismatch", &context(&[("name", "code")]))
                .as_deref(),
            Some("bad code")
        );
        assert!(messages.render("pattern", &BTreeMap::new()).is_none());
    }
}
