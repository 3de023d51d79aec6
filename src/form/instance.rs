use std::sync::Arc;

use futures::future;

use super::entity::{FieldData, FieldEntity, FieldError, ValidateErrorEntity};
use super::lens::FieldLens;
use super::store::{
    Callbacks, FormError, FormOptions, FormResult, FormStore, ReducerAction, Unregister,
    WeakFormStore,
};
use super::validate::ValidateFieldsFuture;
use crate::name_path::NamePath;
use crate::validation::{ErrorMessage, ValidateMessages, ValidateOptions};
use crate::value::StoreValue;

#[doc(hidden)]
pub const HOOK_MARK: &str = "CALMFORM_INTERNAL_HOOKS";

/// Handle to a form store.
///
/// A detached instance (the `Default`) stands in where no form was supplied:
/// it logs a warning on every call and answers with empty values.
#[derive(Clone, Default)]
pub struct FormInstance {
    store: Option<FormStore>,
}

#[derive(Clone, Default)]
pub struct WeakFormInstance {
    store: Option<WeakFormStore>,
}

impl WeakFormInstance {
    /// `None` once the form is gone. A weak detached handle upgrades to the
    /// detached instance.
    pub fn upgrade(&self) -> Option<FormInstance> {
        match &self.store {
            Some(store) => store.upgrade().map(FormInstance::from_store),
            None => Some(FormInstance::detached()),
        }
    }
}

impl FormInstance {
    pub fn new() -> Self {
        FormStore::new().form()
    }

    pub fn with_options(options: FormOptions) -> Self {
        FormStore::with_options(options).form()
    }

    pub fn detached() -> Self {
        Self { store: None }
    }

    pub(crate) fn from_store(store: FormStore) -> Self {
        Self { store: Some(store) }
    }

    pub fn is_detached(&self) -> bool {
        self.store.is_none()
    }

    pub fn downgrade(&self) -> WeakFormInstance {
        WeakFormInstance {
            store: self.store.as_ref().map(FormStore::downgrade),
        }
    }

    fn with_store<T: Default>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&FormStore) -> FormResult<T>,
    ) -> FormResult<T> {
        match &self.store {
            Some(store) => f(store),
            None => {
                warn_detached(operation);
                Ok(T::default())
            }
        }
    }

    pub fn get_field_value(&self, name: impl Into<NamePath>) -> FormResult<Option<StoreValue>> {
        let name_path = name.into();
        self.with_store("get_field_value", |store| store.get_field_value(&name_path))
    }

    pub fn get_fields_value(&self, name_list: Option<&[NamePath]>) -> FormResult<StoreValue> {
        self.with_store("get_fields_value", |store| store.get_fields_value(name_list))
    }

    pub fn get_field_error(&self, name: impl Into<NamePath>) -> FormResult<Vec<ErrorMessage>> {
        let name_path = name.into();
        self.with_store("get_field_error", |store| store.get_field_error(&name_path))
    }

    pub fn get_fields_error(&self, name_list: Option<&[NamePath]>) -> FormResult<Vec<FieldError>> {
        self.with_store("get_fields_error", |store| store.get_fields_error(name_list))
    }

    pub fn is_field_touched(&self, name: impl Into<NamePath>) -> FormResult<bool> {
        let name_path = name.into();
        self.with_store("is_field_touched", |store| {
            store.is_fields_touched(Some(std::slice::from_ref(&name_path)))
        })
    }

    pub fn is_fields_touched(&self, name_list: Option<&[NamePath]>) -> FormResult<bool> {
        self.with_store("is_fields_touched", |store| store.is_fields_touched(name_list))
    }

    pub fn is_field_validating(&self, name: impl Into<NamePath>) -> FormResult<bool> {
        let name_path = name.into();
        self.with_store("is_field_validating", |store| {
            store.is_fields_validating(Some(std::slice::from_ref(&name_path)))
        })
    }

    pub fn is_fields_validating(&self, name_list: Option<&[NamePath]>) -> FormResult<bool> {
        self.with_store("is_fields_validating", |store| {
            store.is_fields_validating(name_list)
        })
    }

    pub fn reset_fields(&self, name_list: Option<&[NamePath]>) -> FormResult<()> {
        self.with_store("reset_fields", |store| store.reset_fields(name_list))
    }

    pub fn set_fields(&self, fields: Vec<FieldData>) -> FormResult<()> {
        self.with_store("set_fields", |store| store.set_fields(fields))
    }

    pub fn set_fields_value(&self, values: impl Into<StoreValue>) -> FormResult<()> {
        let values = values.into();
        self.with_store("set_fields_value", |store| store.set_fields_value(&values))
    }

    pub fn validate_fields(&self, name_list: Option<&[NamePath]>) -> FormResult<ValidateFieldsFuture> {
        self.validate_fields_with(name_list, ValidateOptions::default())
    }

    pub fn validate_fields_with(
        &self,
        name_list: Option<&[NamePath]>,
        options: ValidateOptions,
    ) -> FormResult<ValidateFieldsFuture> {
        match &self.store {
            Some(store) => store.validate_fields(name_list, options),
            None => {
                warn_detached("validate_fields");
                let values: Result<StoreValue, ValidateErrorEntity> = Ok(StoreValue::empty());
                Ok(Box::pin(future::ready(values)))
            }
        }
    }

    /// Privileged capabilities for field bindings. Anything but [`HOOK_MARK`]
    /// is refused.
    pub fn internal_hooks(&self, mark: &str) -> Option<InternalHooks> {
        if mark != HOOK_MARK {
            tracing::warn!("`internal_hooks` is reserved for field bindings and must not be called directly");
            return None;
        }
        if self.is_detached() {
            warn_detached("internal_hooks");
        }
        Some(InternalHooks { form: self.clone() })
    }

    pub fn value_of<M, L>(&self, lens: L) -> FormResult<Option<L::Value>>
    where
        L: FieldLens<M>,
    {
        let name_path = lens.name_path();
        let Some(value) = self.get_field_value(name_path.clone())? else {
            return Ok(None);
        };
        serde_json::from_value(value.to_json())
            .map(Some)
            .map_err(|error| FormError::ValueConversion {
                name_path,
                message: error.to_string(),
            })
    }

    pub fn set_value_of<M, L>(&self, lens: L, value: L::Value) -> FormResult<()>
    where
        L: FieldLens<M>,
    {
        let name_path = lens.name_path();
        let value = serde_json::to_value(&value).map_err(|error| FormError::ValueConversion {
            name_path: name_path.clone(),
            message: error.to_string(),
        })?;
        self.with_store("set_value_of", |store| {
            store.dispatch(ReducerAction::UpdateValue {
                name_path,
                value: Some(value.into()),
            })
        })
    }
}

/// Capabilities reserved for field bindings, see [`FormInstance::internal_hooks`].
#[derive(Clone)]
pub struct InternalHooks {
    form: FormInstance,
}

impl InternalHooks {
    pub fn dispatch(&self, action: ReducerAction) -> FormResult<()> {
        self.form
            .with_store("dispatch", |store| store.dispatch(action))
    }

    pub fn register_field(&self, entity: Arc<dyn FieldEntity>) -> FormResult<Unregister> {
        self.form
            .with_store("register_field", |store| store.register_field(entity))
    }

    pub fn set_initial_values(&self, values: StoreValue, init: bool) -> FormResult<()> {
        self.form.with_store("set_initial_values", |store| {
            store.set_initial_values(values, init)
        })
    }

    pub fn set_callbacks(&self, callbacks: Callbacks) -> FormResult<()> {
        self.form
            .with_store("set_callbacks", |store| store.set_callbacks(callbacks))
    }

    pub fn set_validate_messages(&self, messages: ValidateMessages) -> FormResult<()> {
        self.form.with_store("set_validate_messages", |store| {
            store.set_validate_messages(messages)
        })
    }

    pub fn get_fields(&self, name_list: Option<&[NamePath]>) -> FormResult<Vec<FieldData>> {
        self.form
            .with_store("get_fields", |store| store.get_fields(name_list))
    }
}

fn warn_detached(operation: &'static str) {
    tracing::warn!(
        operation,
        "can not find FormContext, make sure the field is bound to a form"
    );
}
