use calmform::form::{FieldLens, FormModel};
use calmform::name_path::NamePath;

#[derive(Clone, calmform::form::FormModel)]
struct SignupForm {
    email: String,
}

fn main() {
    let fields = SignupForm::fields();
    let lens = fields.email();
    let mut model = SignupForm {
        email: "a@calm.form".to_string(),
    };
    lens.set(&mut model, "b@calm.form".to_string());
    assert_eq!(lens.name_path(), NamePath::from("email"));
    assert_eq!(lens.get(&model), "b@calm.form");
}
