mod context;
mod entity;
mod error_cache;
mod field;
mod instance;
mod lens;
mod store;
mod validate;


pub use calmform_derive::FormModel;
pub use context::FieldContext;
pub use entity::{
    FieldData, FieldEntity, FieldError, FieldProps, Meta, NotifyInfo, UpdateSource,
    ValidateErrorEntity,
};
pub use field::{Field, FieldRegistration, MetaListener};
pub use instance::{FormInstance, HOOK_MARK, InternalHooks, WeakFormInstance};
pub use lens::{FieldLens, FormModel};
pub use store::{
    Callbacks, FieldsChangeFn, FormError, FormOptions, FormResult, FormStore, ReducerAction,
    Unregister, ValidationSpawner, ValidationTicket, ValuesChangeFn,
};
pub use validate::ValidateFieldsFuture;
