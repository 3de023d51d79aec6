pub use crate::form::{
    Callbacks, Field, FieldContext, FieldData, FieldEntity, FieldError, FieldLens, FieldProps,
    FieldRegistration, FormError, FormInstance, FormModel, FormOptions, FormResult, FormStore,
    Meta, ValidateErrorEntity,
};
pub use crate::name_path::{NamePath, PathSegment};
pub use crate::validation::{
    Rule, RuleObject, RuleType, ValidateMessages, ValidateOptions, ValidatorCallback,
    ValidatorError, ValidatorResult,
};
pub use crate::value::StoreValue;
