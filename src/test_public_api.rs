use crate::form::FormModel as _;
use futures::executor::block_on;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Clone, Serialize, Deserialize, crate::form::FormModel)]
struct ApiSmokeForm {
    title: String,
    enabled: bool,
    tags: Vec<String>,
}

#[test]
fn prelude_smoke_builds_a_form() {
    use crate::prelude::*;

    let form = FormInstance::with_options(
        FormOptions::default()
            .with_initial_values(json!({ "title": "draft", "enabled": false, "tags": [] }))
            .with_validate_messages(ValidateMessages::new().with("required", "${name} is missing"))
            .with_callbacks(Callbacks::default().on_values_change(|_, _| {})),
    );
    let context = FieldContext::new(form.clone());
    let title = Field::new(
        &context,
        FieldProps::new("title")
            .rule(RuleObject::required().whitespace())
            .rule(RuleObject::typed(RuleType::String).max(20))
            .validate_trigger(["onChange", "onBlur"]),
    );
    let _registration = title.mount().expect("mount title");

    title.change(" ").expect("change title");
    title.blur().expect("blur title");
    let error = block_on(form.validate_fields(None).expect("validate"))
        .expect_err("blank title must fail");
    assert_eq!(error.error_fields[0].name, NamePath::from("title"));
    assert!(!error.to_string().is_empty());

    let fields = ApiSmokeForm::fields();
    form.set_value_of::<ApiSmokeForm, _>(fields.title(), "final".to_string())
        .expect("typed write");
    form.set_value_of::<ApiSmokeForm, _>(fields.tags(), vec!["a".to_string()])
        .expect("typed write");
    let values = block_on(form.validate_fields(None).expect("validate")).expect("valid form");
    let model = ApiSmokeForm::from_store(&values).expect("model converts");
    assert_eq!(model.title, "final");
    assert_eq!(model.tags, vec!["a"]);
    assert!(!model.enabled);
}

#[test]
fn validation_facade_runs_without_a_form() {
    use crate::validation::{Rule, RuleObject, RuleType, ValidateOptions, validate_rules};

    let rules = vec![Rule::from(RuleObject::typed(RuleType::Email))];
    let result = block_on(validate_rules(
        &"email".into(),
        Some(&crate::StoreValue::from("not-an-email")),
        &rules,
        &ValidateOptions::default(),
        &crate::FormInstance::detached(),
    ));
    assert_eq!(result, Err(vec!["email is not a valid email".to_string()]));
}
