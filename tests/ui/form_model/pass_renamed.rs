use calmform::form::{FieldLens, FormInstance, FormModel};
use calmform::name_path::NamePath;
use serde::{Deserialize, Serialize};

#[derive(Clone, Serialize, Deserialize, calmform::form::FormModel)]
struct AccountForm {
    #[serde(rename = "userName")]
    #[form(name = "userName")]
    user_name: String,
    age: u32,
}

fn main() {
    let fields = AccountForm::fields();
    assert_eq!(fields.user_name().name_path(), NamePath::from("userName"));

    let form = FormInstance::new();
    form.set_value_of::<AccountForm, _>(fields.user_name(), "ann".to_string())
        .expect("write must succeed");
    form.set_value_of::<AccountForm, _>(fields.age(), 7)
        .expect("write must succeed");

    let model = AccountForm::from_store(&form.get_fields_value(None).expect("values"))
        .expect("model must convert");
    assert_eq!(model.user_name, "ann");
    assert_eq!(model.age, 7);
}
